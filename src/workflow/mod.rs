//! Plan execution: step chaining, data hand-off and result formatting.

mod extract;
mod formatter;
mod plan;
mod runner;
mod summary;

pub use extract::{DataExtractor, HeuristicExtractor, IdentityExtractor};
pub use formatter::{ChunkedFormatter, FormatError, PlainFormatter, ResultFormatter};
pub use plan::{Plan, WorkflowStep};
pub use runner::{ChainRunner, RunRequest};
pub use summary::{InMemorySummarySink, SummarySink};

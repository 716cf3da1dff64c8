//! stepchain: sequential execution of tool plans.
//!
//! A plan is an ordered list of steps, each naming a tool service and a
//! free-form action. The [`workflow::ChainRunner`] maps every action to a
//! concrete tool, resolves the user's credentials for the service, invokes
//! the tool over HTTP and threads the result into the next step's input.
//! Progress is pushed to an [`events::EventSink`] as it happens and
//! failures are classified into actionable [`classifier::ClassifiedError`]s.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod secrets;
pub mod testing;
pub mod tools;
pub mod util;
pub mod workflow;

pub use error::{Error, Result};

//! `stepchain classify`: show how a failure message is classified.

use crate::classifier::ErrorClassifier;

pub fn run_classify_command(message: &str, tool: Option<&str>) -> anyhow::Result<()> {
    let classified = ErrorClassifier::new().classify(message, None, tool);
    println!("{}", serde_json::to_string_pretty(&classified)?);
    Ok(())
}

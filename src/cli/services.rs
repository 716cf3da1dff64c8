//! `stepchain services`: inspect configured tool services.

use std::sync::Arc;

use clap::Subcommand;

use crate::config::Config;
use crate::tools::mcp::{McpAdapter, ServiceRegistry};

#[derive(Subcommand, Debug, Clone)]
pub enum ServicesCommand {
    /// List configured tool services
    List,

    /// Discover the tools a service offers
    Tools {
        /// Service name
        name: String,

        /// Print the raw tool definitions as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run a services command.
pub async fn run_services_command(cmd: ServicesCommand, config: &Config) -> anyhow::Result<()> {
    match cmd {
        ServicesCommand::List => cmd_list(config),
        ServicesCommand::Tools { name, json } => cmd_tools(config, &name, json).await,
    }
}

fn cmd_list(config: &Config) -> anyhow::Result<()> {
    if config.services.services.is_empty() {
        match &config.services.path {
            Some(path) => println!("No services declared in {}", path.display()),
            None => println!("No services configured."),
        }
        return Ok(());
    }

    for service in &config.services.services {
        let auth = if service.requires_auth { "auth" } else { "open" };
        println!("{:<20} {:<5} {}", service.name, auth, service.base_url);
        if let Some(description) = &service.description {
            println!("    {description}");
        }
    }
    Ok(())
}

async fn cmd_tools(config: &Config, name: &str, json: bool) -> anyhow::Result<()> {
    let registry = Arc::new(ServiceRegistry::from_endpoints(
        config.services.services.iter().cloned(),
    ));
    let adapter = McpAdapter::new(registry, config.adapter.clone())?;
    let tools = adapter.list_tools(name).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(tools.as_ref())?);
        return Ok(());
    }

    println!("{} tool(s) on {}:", tools.len(), name);
    for tool in tools.iter() {
        if tool.description.is_empty() {
            println!("  {}", tool.name);
        } else {
            println!("  {:<28} {}", tool.name, tool.description);
        }
    }
    Ok(())
}

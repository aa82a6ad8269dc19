//! List command - Show the registered modules

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use serde_json::json;

/// Arguments for the list command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Print the list as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn execute(&self, ctx: &CommandContext) -> Result<i32> {
        let modules: Vec<_> = ctx
            .registry
            .names()
            .into_iter()
            .filter_map(|name| ctx.registry.get(name))
            .collect();

        if self.json {
            let listing: Vec<_> = modules
                .iter()
                .map(|module| {
                    json!({
                        "name": module.name(),
                        "classification": module.classification().to_string(),
                        "description": module.description(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        } else {
            for module in &modules {
                println!(
                    "{:<24} {:<14} {}",
                    module.name(),
                    module.classification().to_string(),
                    module.description()
                );
            }
        }

        Ok(0)
    }
}

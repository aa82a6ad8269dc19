//! Subcommands for the ovd-modules CLI

pub mod list;
pub mod resolve;
pub mod run;

use ovd_modules::config::Config;
use ovd_modules::modules::{ModuleContext, ModuleRegistry};
use std::sync::Arc;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Arc<Config>,
    /// Registered modules
    pub registry: ModuleRegistry,
    /// Verbosity level
    pub verbosity: u8,
    /// Check mode requested on the command line
    pub check_mode: bool,
    /// Diff mode requested on the command line
    pub diff_mode: bool,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: ModuleRegistry::with_builtins(),
            verbosity: cli.verbosity(),
            check_mode: cli.check_mode,
            diff_mode: cli.diff_mode,
        }
    }

    /// Module context carrying the configuration and command-line flags
    pub fn module_context(&self) -> ModuleContext {
        ModuleContext::new()
            .with_config(Arc::clone(&self.config))
            .with_check_mode(self.check_mode)
            .with_diff_mode(self.diff_mode)
            .with_verbosity(self.verbosity)
    }
}

//! CLI module for ovd-modules
//!
//! Argument parsing for the `ovd-modules` binary. The binary is also a
//! multicall executable: installed (or linked) under a module name such as
//! `ovd_sm`, it behaves like `ovd-modules run ovd_sm <args-file>`, which is
//! how Ansible invokes binary modules.

pub mod commands;

use clap::{Parser, Subcommand};
use ovd_modules::modules::ModuleRegistry;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use commands::list::ListArgs;
use commands::resolve::ResolveArgs;
use commands::run::RunArgs;

/// Program name used when rewriting multicall invocations
pub const BINARY_NAME: &str = "ovd-modules";

/// ovd-modules - Ansible modules for OVD farms
#[derive(Parser, Debug, Clone)]
#[command(name = "ovd-modules")]
#[command(author = "ovd-modules contributors")]
#[command(version)]
#[command(about = "Ansible modules for administering OVD farms", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv, -vvvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file
    #[arg(short = 'c', long, global = true, env = "OVD_MODULES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run in check mode (report changes without making them)
    #[arg(long = "check", global = true)]
    pub check_mode: bool,

    /// Include before/after state in module results
    #[arg(long = "diff", global = true)]
    pub diff_mode: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a module with an Ansible arguments file
    Run(RunArgs),

    /// List the available modules
    List(ListArgs),

    /// Resolve a file in a web directory listing
    Resolve(ResolveArgs),
}

impl Cli {
    /// Parse the process arguments, expanding multicall invocations
    pub fn parse_args() -> Self {
        Self::parse_from(expand_multicall(
            std::env::args_os(),
            &ModuleRegistry::with_builtins(),
        ))
    }

    /// Effective verbosity level (0-4)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(4)
    }
}

/// Rewrite `<module-name> ARGS...` into `ovd-modules run <module-name> ARGS...`
/// when the program was invoked under the name of a registered module.
pub fn expand_multicall<I>(args: I, registry: &ModuleRegistry) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().collect();

    let module = args
        .first()
        .and_then(|program| Path::new(program).file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| registry.contains(stem))
        .map(str::to_string);

    if let Some(module) = module {
        args.splice(
            0..1,
            [
                OsString::from(BINARY_NAME),
                OsString::from("run"),
                OsString::from(module),
            ],
        );
    }

    args
}

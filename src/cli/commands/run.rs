//! Run command - Execute one module
//!
//! Reads an Ansible arguments file, runs the module and writes the JSON
//! result on standard output. The exit status is 0 on success and 1 when the
//! module failed.

use super::CommandContext;
use clap::Parser;
use ovd_modules::protocol::{execute_module, AnsibleResult, ModuleArgs};
use std::path::PathBuf;

/// Arguments for the run command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Module name
    #[arg(required = true)]
    pub module: String,

    /// Path to the arguments file written by Ansible
    #[arg(required = true)]
    pub args_file: PathBuf,
}

impl RunArgs {
    /// Read the arguments file
    pub fn load(&self) -> ovd_modules::Result<ModuleArgs> {
        ModuleArgs::load(&self.args_file)
    }

    /// Execute the run command with the already loaded arguments
    pub async fn execute(
        &self,
        ctx: &CommandContext,
        args: ovd_modules::Result<ModuleArgs>,
    ) -> i32 {
        let result = match args {
            Ok(mut args) => {
                args.check_mode |= ctx.check_mode;
                args.diff_mode |= ctx.diff_mode;
                args.verbosity = args.verbosity.max(ctx.verbosity);
                execute_module(&ctx.registry, &self.module, &args, ctx.module_context()).await
            }
            Err(err) => AnsibleResult::from_error(err.kind(), &err),
        };
        emit(&result)
    }
}

/// Print a result on standard output and return its exit status
pub fn emit(result: &AnsibleResult) -> i32 {
    println!("{}", result.to_json());
    result.exit_code()
}

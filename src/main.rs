//! ovd-modules - Ansible modules for OVD farms
//!
//! Main entry point for the ovd-modules CLI and multicall module binary.

mod cli;

use anyhow::Result;
use cli::commands::run::emit;
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use ovd_modules::config::{Config, LoggingConfig};
use ovd_modules::protocol::AnsibleResult;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding a tracing filter for this program
const LOG_ENV: &str = "OVD_MODULES_LOG";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let config = Config::load(cli.config.as_ref());

    let exit_code = match &cli.command {
        Commands::Run(args) => {
            // Ansible passes its own verbosity through the arguments file
            let module_args = args.load();
            let verbosity = module_args
                .as_ref()
                .map(|a| a.verbosity)
                .unwrap_or(0)
                .max(cli.verbosity());

            match config {
                Ok(config) => {
                    init_logging(verbosity, &config.logging);
                    let ctx = CommandContext::new(&cli, config);
                    args.execute(&ctx, module_args).await
                }
                Err(err) => {
                    init_logging(verbosity, &LoggingConfig::default());
                    emit(&AnsibleResult::from_error(err.kind(), &err))
                }
            }
        }
        Commands::List(args) => {
            let config = load_or_exit(config);
            init_logging(cli.verbosity(), &config.logging);
            args.execute(&CommandContext::new(&cli, config))?
        }
        Commands::Resolve(args) => {
            let config = load_or_exit(config);
            init_logging(cli.verbosity(), &config.logging);
            args.execute(&CommandContext::new(&cli, config)).await
        }
    };

    std::process::exit(exit_code);
}

fn load_or_exit(config: ovd_modules::Result<Config>) -> Config {
    config.unwrap_or_else(|err| {
        eprintln!("{}: {}", err.kind(), err);
        std::process::exit(err.exit_code());
    })
}

/// Initialize logging on standard error; standard output carries results
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(filter));

    let (text, json) = if logging.json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(json)
        .init();
}

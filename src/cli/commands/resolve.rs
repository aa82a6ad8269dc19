//! Resolve command - Look up a file name in a web directory listing

use super::CommandContext;
use clap::Parser;
use ovd_modules::listing::DirectoryListingResolver;
use ovd_modules::modules::windows_aps_url::DEFAULT_SUFFIX;

/// Arguments for the resolve command
#[derive(Parser, Debug, Clone)]
pub struct ResolveArgs {
    /// URL of the directory listing
    #[arg(required = true)]
    pub url: String,

    /// File name suffix to look for
    #[arg(long, default_value = DEFAULT_SUFFIX)]
    pub suffix: String,
}

impl ResolveArgs {
    /// Print the first matching file name; errors map to their exit status
    pub async fn execute(&self, ctx: &CommandContext) -> i32 {
        let resolved = match DirectoryListingResolver::new(&ctx.config.http) {
            Ok(resolver) => resolver.resolve(&self.url, &self.suffix).await,
            Err(err) => Err(err),
        };

        match resolved {
            Ok(file) => {
                println!("{}", file);
                0
            }
            Err(err) => {
                eprintln!("{}: {}", err.kind(), err);
                err.exit_code()
            }
        }
    }
}

//! # ovd-modules
//!
//! Ansible modules for administering an OVD (Open Virtual Desktop) farm,
//! shipped as one multicall binary.
//!
//! ## Modules
//!
//! | Name                   | Kind          | Purpose                                         |
//! |------------------------|---------------|-------------------------------------------------|
//! | `ovd_windows_aps_url`  | HTTP lookup   | Find the Windows application server installer   |
//! | `ovd_sm`               | Remote API    | Drive the session manager administration API    |
//! | `ovd_slaveserver_role` | Local command | Add or remove a slave server role               |
//!
//! ## Layout
//!
//! - [`listing`]: directory index parsing and filename resolution
//! - [`soap`]: SOAP encoding, value normalization and the admin client
//! - [`connection`]: local command execution
//! - [`modules`]: the [`Module`](modules::Module) trait, registry and modules
//! - [`protocol`]: Ansible argument files and JSON results
//! - [`config`]: configuration file and environment overrides
//!
//! ## Running a module
//!
//! ```rust,no_run
//! use ovd_modules::modules::{ModuleContext, ModuleRegistry};
//! use ovd_modules::protocol::run_module;
//! use std::path::Path;
//!
//! # async fn demo() {
//! let registry = ModuleRegistry::with_builtins();
//! let (result, code) = run_module(
//!     &registry,
//!     "ovd_slaveserver_role",
//!     Path::new("/tmp/args.json"),
//!     ModuleContext::new(),
//! )
//! .await;
//! println!("{}", result.to_json());
//! std::process::exit(code);
//! # }
//! ```

pub mod prelude {
    //! Commonly used types.
    pub use crate::config::Config;
    pub use crate::connection::{CommandResult, Connection, ExecuteOptions, LocalConnection};
    pub use crate::error::{Error, Result};
    pub use crate::listing::{DirectoryListing, DirectoryListingResolver, LinkEntry};
    pub use crate::modules::{
        Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleRegistry,
        ModuleResult,
    };
    pub use crate::protocol::{AnsibleResult, ModuleArgs};
    pub use crate::soap::{AdminApi, AdminConnector, NormalizedValue, SoapAdminClient, SoapValue};
}

pub mod config;
pub mod connection;
pub mod error;
pub mod listing;
pub mod modules;
pub mod protocol;
pub mod soap;

pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

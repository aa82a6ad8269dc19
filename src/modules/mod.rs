//! Module system for ovd-modules
//!
//! This module provides the core traits, types, and registry for the module
//! system. Each module is one Ansible task type: it receives the task
//! arguments as [`ModuleParams`], does its work and reports a [`ModuleOutput`].

pub mod slaveserver_role;
pub mod sm;
pub mod windows_aps_url;

use crate::config::Config;
use crate::connection::{Connection, ConnectionError, LocalConnection};
use crate::error::Error;
use crate::soap::{AdminConnector, SoapConnector, SoapError};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during module execution
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed with exit code {code}: {message}")]
    CommandFailed { code: i32, message: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Lookup(#[from] Error),
}

impl From<SoapError> for ModuleError {
    fn from(err: SoapError) -> Self {
        ModuleError::Lookup(Error::Soap(err))
    }
}

impl ModuleError {
    /// Short error type name reported in failed module results
    pub fn kind(&self) -> &'static str {
        match self {
            ModuleError::NotFound(_) => "ModuleNotFound",
            ModuleError::InvalidParameter(_)
            | ModuleError::MissingParameter(_)
            | ModuleError::UnsupportedParameter(_) => "ArgumentError",
            ModuleError::ExecutionFailed(_) | ModuleError::Connection(_) => "ExecutionError",
            ModuleError::Io(_) => "IOError",
            ModuleError::CommandFailed { .. } => "CommandError",
            ModuleError::Lookup(e) => e.kind(),
        }
    }
}

/// Result type for module operations
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Status of a module execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Module executed successfully and made changes
    Changed,
    /// Module executed successfully but no changes were needed
    Ok,
    /// Module execution failed
    Failed,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStatus::Changed => write!(f, "changed"),
            ModuleStatus::Ok => write!(f, "ok"),
            ModuleStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What a module talks to while it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleClassification {
    /// Reads a remote web page
    HttpLookup,
    /// Calls the session manager administration service
    RemoteApi,
    /// Runs a local command line tool
    LocalCommand,
}

impl fmt::Display for ModuleClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleClassification::HttpLookup => write!(f, "http_lookup"),
            ModuleClassification::RemoteApi => write!(f, "remote_api"),
            ModuleClassification::LocalCommand => write!(f, "local_command"),
        }
    }
}

/// Represents a difference between current and desired state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    /// State before the change
    pub before: serde_json::Value,
    /// State after the change
    pub after: serde_json::Value,
}

impl Diff {
    pub fn new(before: impl Into<serde_json::Value>, after: impl Into<serde_json::Value>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
        }
    }
}

/// Result of a module execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleOutput {
    /// Whether the module changed anything
    pub changed: bool,
    /// Human-readable message about what happened
    pub msg: String,
    /// Status of the execution
    pub status: ModuleStatus,
    /// Optional diff showing what changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    /// Additional data returned by the module
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data: IndexMap<String, serde_json::Value>,
    /// Standard output (for command modules)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Standard error (for command modules)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Return code (for command modules)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
}

impl ModuleOutput {
    fn with_status(changed: bool, status: ModuleStatus, msg: String) -> Self {
        Self {
            changed,
            msg,
            status,
            diff: None,
            data: IndexMap::new(),
            stdout: None,
            stderr: None,
            rc: None,
        }
    }

    /// Create a new successful output with no changes
    pub fn ok(msg: impl Into<String>) -> Self {
        Self::with_status(false, ModuleStatus::Ok, msg.into())
    }

    /// Create a new successful output with changes
    pub fn changed(msg: impl Into<String>) -> Self {
        Self::with_status(true, ModuleStatus::Changed, msg.into())
    }

    /// Create a failed output
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::with_status(false, ModuleStatus::Failed, msg.into())
    }

    /// Create a failed output from a module error, as `<Kind>: <message>`
    pub fn from_error(err: &ModuleError) -> Self {
        Self::failed(format!("{}: {}", err.kind(), err))
    }

    /// Add a diff to the output
    pub fn with_diff(mut self, diff: Diff) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Add data to the output
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Add stdout/stderr/rc for command outputs
    pub fn with_command_output(
        mut self,
        stdout: Option<String>,
        stderr: Option<String>,
        rc: Option<i32>,
    ) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self.rc = rc;
        self
    }
}

/// Parameters passed to a module
pub type ModuleParams = HashMap<String, serde_json::Value>;

/// Context for module execution
#[derive(Clone)]
pub struct ModuleContext {
    /// Whether to run in check mode (dry run)
    pub check_mode: bool,
    /// Whether to show diffs
    pub diff_mode: bool,
    /// Whether the task output must hide values
    pub no_log: bool,
    /// Ansible verbosity level
    pub verbosity: u8,
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Connection used by command modules; local when unset
    pub connection: Option<Arc<dyn Connection>>,
    /// Admin service connector; SOAP when unset
    pub admin: Option<Arc<dyn AdminConnector>>,
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("check_mode", &self.check_mode)
            .field("diff_mode", &self.diff_mode)
            .field("no_log", &self.no_log)
            .field("verbosity", &self.verbosity)
            .field(
                "connection",
                &self.connection.as_ref().map(|c| c.identifier()),
            )
            .field("admin", &self.admin.is_some())
            .finish()
    }
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self {
            check_mode: false,
            diff_mode: false,
            no_log: false,
            verbosity: 0,
            config: Arc::new(Config::default()),
            connection: None,
            admin: None,
        }
    }
}

impl ModuleContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    pub fn with_diff_mode(mut self, diff_mode: bool) -> Self {
        self.diff_mode = diff_mode;
        self
    }

    pub fn with_no_log(mut self, no_log: bool) -> Self {
        self.no_log = no_log;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_config(mut self, config: Arc<Config>) -> Self {
        self.config = config;
        self
    }

    pub fn with_connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_admin(mut self, admin: Arc<dyn AdminConnector>) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Connection for command modules
    pub fn connection(&self) -> Arc<dyn Connection> {
        self.connection
            .clone()
            .unwrap_or_else(|| Arc::new(LocalConnection::new()))
    }

    /// Connector for the administration service
    pub fn admin_connector(&self) -> Arc<dyn AdminConnector> {
        self.admin
            .clone()
            .unwrap_or_else(|| Arc::new(SoapConnector::new(self.config.admin.clone())))
    }

    /// Whether a diff should be attached to the result
    pub fn wants_diff(&self) -> bool {
        self.diff_mode && !self.no_log
    }
}

/// Trait that all modules must implement
#[async_trait]
pub trait Module: Send + Sync {
    /// Returns the name of the module
    fn name(&self) -> &'static str;

    /// Returns a description of what the module does
    fn description(&self) -> &'static str;

    /// Returns what the module talks to
    fn classification(&self) -> ModuleClassification;

    /// Execute the module with the given parameters
    async fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput>;

    /// Check what would change without making changes (for check mode)
    async fn check(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let check_context = ModuleContext {
            check_mode: true,
            ..context.clone()
        };
        self.execute(params, &check_context).await
    }

    /// Validate the parameters before execution
    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        let _ = params;
        Ok(())
    }

    /// Returns the list of required parameters
    fn required_params(&self) -> &[&'static str] {
        &[]
    }

    /// Returns the list of optional parameters with their default values
    fn optional_params(&self) -> HashMap<&'static str, serde_json::Value> {
        HashMap::new()
    }

    /// Alternative parameter names, as `(alias, name)` pairs
    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[]
    }
}

/// Helper trait for extracting parameters
pub trait ParamExt {
    fn get_string(&self, key: &str) -> ModuleResult<Option<String>>;
    fn get_string_required(&self, key: &str) -> ModuleResult<String>;
    fn get_bool(&self, key: &str) -> ModuleResult<Option<bool>>;
    fn get_bool_or(&self, key: &str, default: bool) -> bool;
    fn get_map(&self, key: &str)
        -> ModuleResult<Option<serde_json::Map<String, serde_json::Value>>>;
}

impl ParamExt for ModuleParams {
    fn get_string(&self, key: &str) -> ModuleResult<Option<String>> {
        match self.get(key) {
            Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(v) => Ok(Some(v.to_string().trim_matches('"').to_string())),
        }
    }

    fn get_string_required(&self, key: &str) -> ModuleResult<String> {
        self.get_string(key)?
            .ok_or_else(|| ModuleError::MissingParameter(key.to_string()))
    }

    fn get_bool(&self, key: &str) -> ModuleResult<Option<bool>> {
        match self.get(key) {
            Some(serde_json::Value::Bool(b)) => Ok(Some(*b)),
            Some(serde_json::Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(Some(true)),
                "false" | "no" | "0" | "off" => Ok(Some(false)),
                _ => Err(ModuleError::InvalidParameter(format!(
                    "{} must be a boolean",
                    key
                ))),
            },
            Some(serde_json::Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(Some(false)),
                Some(1) => Ok(Some(true)),
                _ => Err(ModuleError::InvalidParameter(format!(
                    "{} must be a boolean",
                    key
                ))),
            },
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(_) => Err(ModuleError::InvalidParameter(format!(
                "{} must be a boolean",
                key
            ))),
        }
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).ok().flatten().unwrap_or(default)
    }

    fn get_map(
        &self,
        key: &str,
    ) -> ModuleResult<Option<serde_json::Map<String, serde_json::Value>>> {
        match self.get(key) {
            Some(serde_json::Value::Object(map)) => Ok(Some(map.clone())),
            // Legacy key=value arguments carry dicts as JSON text
            Some(serde_json::Value::String(s)) => match serde_json::from_str(s) {
                Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
                _ => Err(ModuleError::InvalidParameter(format!(
                    "{} must be a dictionary",
                    key
                ))),
            },
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(_) => Err(ModuleError::InvalidParameter(format!(
                "{} must be a dictionary",
                key
            ))),
        }
    }
}

/// Registry for looking up modules by name
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Create a registry with all built-in modules
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(windows_aps_url::WindowsApsUrlModule));
        registry.register(Arc::new(sm::SmModule));
        registry.register(Arc::new(slaveserver_role::SlaveServerRoleModule));
        registry
    }

    /// Register a module
    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Get a module by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    /// Check if a module exists
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Get all module names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Execute a module by name
    pub async fn execute(
        &self,
        name: &str,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let module = self
            .get(name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;

        let params = resolve_params(module.as_ref(), params)?;

        // Validate parameters first
        module.validate_params(&params)?;

        // Check required parameters
        for param in module.required_params() {
            if !params.contains_key(*param) {
                return Err(ModuleError::MissingParameter((*param).to_string()));
            }
        }

        // Execute based on mode
        if context.check_mode {
            module.check(&params, context).await
        } else {
            module.execute(&params, context).await
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Rename aliases to their parameter names and reject unknown parameters.
fn resolve_params(module: &dyn Module, params: &ModuleParams) -> ModuleResult<ModuleParams> {
    let optional = module.optional_params();
    let mut resolved = ModuleParams::with_capacity(params.len());

    for (key, value) in params {
        let name = module
            .aliases()
            .iter()
            .find(|(alias, _)| alias == key)
            .map(|(_, name)| *name)
            .unwrap_or(key.as_str());

        if !module.required_params().contains(&name) && !optional.contains_key(name) {
            return Err(ModuleError::UnsupportedParameter(key.clone()));
        }

        if resolved.insert(name.to_string(), value.clone()).is_some() {
            return Err(ModuleError::InvalidParameter(format!(
                "{} given more than once (through an alias)",
                name
            )));
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct TestModule;

    #[async_trait]
    impl Module for TestModule {
        fn name(&self) -> &'static str {
            "test"
        }

        fn description(&self) -> &'static str {
            "A test module"
        }

        fn classification(&self) -> ModuleClassification {
            ModuleClassification::LocalCommand
        }

        async fn execute(
            &self,
            params: &ModuleParams,
            context: &ModuleContext,
        ) -> ModuleResult<ModuleOutput> {
            if context.check_mode {
                return Ok(ModuleOutput::ok("Would do something")
                    .with_diff(Diff::new("absent", "present")));
            }

            let msg = params
                .get_string("msg")?
                .unwrap_or_else(|| "Hello".to_string());
            Ok(ModuleOutput::changed(msg))
        }

        fn required_params(&self) -> &[&'static str] {
            &["name"]
        }

        fn optional_params(&self) -> HashMap<&'static str, serde_json::Value> {
            HashMap::from([("msg", json!(null))])
        }

        fn aliases(&self) -> &[(&'static str, &'static str)] {
            &[("message", "msg")]
        }
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(TestModule));
        registry
    }

    fn params(value: serde_json::Value) -> ModuleParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ModuleRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["ovd_slaveserver_role", "ovd_sm", "ovd_windows_aps_url"]
        );
        assert!(!registry.contains("nonexistent"));
    }

    #[tokio::test]
    async fn test_registry_execute_with_alias() {
        let output = registry()
            .execute(
                "test",
                &params(json!({"name": "x", "message": "hi"})),
                &ModuleContext::new(),
            )
            .await
            .unwrap();
        assert!(output.changed);
        assert_eq!(output.msg, "hi");
    }

    #[tokio::test]
    async fn test_registry_rejects_bad_params() {
        let registry = registry();
        let ctx = ModuleContext::new();

        let missing = registry.execute("test", &params(json!({})), &ctx).await;
        assert!(matches!(missing, Err(ModuleError::MissingParameter(p)) if p == "name"));

        let unknown = registry
            .execute("test", &params(json!({"name": "x", "color": "red"})), &ctx)
            .await;
        assert!(matches!(unknown, Err(ModuleError::UnsupportedParameter(p)) if p == "color"));

        let twice = registry
            .execute(
                "test",
                &params(json!({"name": "x", "msg": "a", "message": "b"})),
                &ctx,
            )
            .await;
        assert!(matches!(twice, Err(ModuleError::InvalidParameter(_))));

        let nothing = registry.execute("nope", &params(json!({})), &ctx).await;
        assert_eq!(nothing.unwrap_err().kind(), "ModuleNotFound");
    }

    #[tokio::test]
    async fn test_check_mode_reports_diff() {
        let ctx = ModuleContext::new().with_check_mode(true);
        let output = registry()
            .execute("test", &params(json!({"name": "x"})), &ctx)
            .await
            .unwrap();
        assert!(!output.changed);

        let checked = TestModule
            .check(&params(json!({"name": "x"})), &ModuleContext::new())
            .await
            .unwrap();
        assert_eq!(checked.diff, Some(Diff::new("absent", "present")));
    }

    #[test]
    fn test_module_output() {
        let output = ModuleOutput::changed("Something changed")
            .with_data("key", json!("value"))
            .with_diff(Diff::new("old", "new"));

        assert!(output.changed);
        assert_eq!(output.status, ModuleStatus::Changed);
        assert!(output.diff.is_some());
        assert!(output.data.contains_key("key"));

        let failed = ModuleOutput::from_error(&ModuleError::MissingParameter("dest".into()));
        assert_eq!(failed.status, ModuleStatus::Failed);
        assert_eq!(failed.msg, "ArgumentError: Missing required parameter: dest");
    }

    #[test]
    fn test_param_ext() {
        let params = params(json!({
            "string": "hello",
            "bool_true": true,
            "bool_str": "yes",
            "bool_off": "off",
            "bool_int": 0,
            "number": 42,
            "map": {"a": 1},
            "map_str": "{\"b\": 2}",
            "nothing": null
        }));

        assert_eq!(params.get_string("string").unwrap(), Some("hello".to_string()));
        assert_eq!(params.get_string("number").unwrap(), Some("42".to_string()));
        assert_eq!(params.get_string("nothing").unwrap(), None);
        assert_eq!(params.get_bool("bool_true").unwrap(), Some(true));
        assert_eq!(params.get_bool("bool_str").unwrap(), Some(true));
        assert_eq!(params.get_bool("bool_off").unwrap(), Some(false));
        assert_eq!(params.get_bool("bool_int").unwrap(), Some(false));
        assert!(params.get_bool("string").is_err());
        assert!(params.get_bool_or("missing", true));
        assert_eq!(params.get_map("map").unwrap().unwrap()["a"], json!(1));
        assert_eq!(params.get_map("map_str").unwrap().unwrap()["b"], json!(2));
        assert!(params.get_map("string").is_err());
        assert!(params.get_string_required("missing").is_err());
    }
}

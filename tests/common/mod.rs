//! Shared test utilities for the ovd-modules test suite.
//!
//! - [`MockAdminApi`] / [`MockConnector`]: scripted session manager
//! - [`MockConnection`]: scripted command runner
//! - helpers to build parameters, contexts and argument files

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use ovd_modules::config::Config;
use ovd_modules::connection::{CommandResult, Connection, ConnectionResult, ExecuteOptions};
use ovd_modules::modules::{ModuleContext, ModuleParams};
use ovd_modules::soap::{AdminApi, AdminConnector, NormalizedValue, Session, SoapError};

type SoapResult<T> = Result<T, SoapError>;

// ============================================================================
// Helper Functions
// ============================================================================

/// Build module parameters from a JSON object literal
pub fn params(value: Value) -> ModuleParams {
    serde_json::from_value(value).expect("params must be a JSON object")
}

/// Normalized value from a JSON literal
pub fn normalized(value: Value) -> NormalizedValue {
    NormalizedValue::from(&value)
}

/// Configuration with no waiting between session polls
pub fn fast_config() -> Arc<Config> {
    let mut config = Config::default();
    config.sessions.poll_interval_ms = 0;
    Arc::new(config)
}

/// Write an arguments file into a fresh temporary directory
pub fn write_args_file(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("args");
    std::fs::write(&path, content).expect("write args file");
    (dir, path)
}

/// Settings tree as `settings_get` reports it: every leaf has a `value`
pub fn settings_tree(entries: &[(&str, Value)]) -> NormalizedValue {
    let mut tree = NormalizedValue::mapping();
    for (key, value) in entries {
        tree.set_path(key, normalized(json!({ "value": value })));
    }
    tree
}

// ============================================================================
// Mock Session Manager
// ============================================================================

/// Scripted [`AdminApi`] recording every call.
///
/// `sessions_list` answers pop from a queue; once it is drained every call
/// returns an empty list.
#[derive(Debug)]
pub struct MockAdminApi {
    initial_configuration: Mutex<NormalizedValue>,
    settings: Mutex<NormalizedValue>,
    settings_set_result: Mutex<bool>,
    certificate_result: Mutex<bool>,
    sessions: Mutex<VecDeque<Vec<Session>>>,
    calls: Mutex<Vec<String>>,
    saved_settings: Mutex<Vec<NormalizedValue>>,
    killed: Mutex<Vec<String>>,
    certificates: Mutex<Vec<String>>,
}

impl Default for MockAdminApi {
    fn default() -> Self {
        Self {
            initial_configuration: Mutex::new(normalized(json!({"system_in_maintenance": 0}))),
            settings: Mutex::new(NormalizedValue::mapping()),
            settings_set_result: Mutex::new(true),
            certificate_result: Mutex::new(true),
            sessions: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            saved_settings: Mutex::new(Vec::new()),
            killed: Mutex::new(Vec::new()),
            certificates: Mutex::new(Vec::new()),
        }
    }
}

impl MockAdminApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_maintenance(self, value: Value) -> Self {
        *self.initial_configuration.lock().unwrap() =
            normalized(json!({ "system_in_maintenance": value }));
        self
    }

    pub fn with_settings(self, settings: NormalizedValue) -> Self {
        *self.settings.lock().unwrap() = settings;
        self
    }

    pub fn with_settings_set_result(self, result: bool) -> Self {
        *self.settings_set_result.lock().unwrap() = result;
        self
    }

    pub fn with_certificate_result(self, result: bool) -> Self {
        *self.certificate_result.lock().unwrap() = result;
        self
    }

    /// Queue one `sessions_list` answer
    pub fn with_sessions(self, ids: &[&str]) -> Self {
        let sessions = ids
            .iter()
            .map(|id| Session {
                id: id.to_string(),
                data: normalized(json!({ "id": id })),
            })
            .collect();
        self.sessions.lock().unwrap().push_back(sessions);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == method).count()
    }

    pub fn saved_settings(&self) -> Vec<NormalizedValue> {
        self.saved_settings.lock().unwrap().clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }

    pub fn certificates(&self) -> Vec<String> {
        self.certificates.lock().unwrap().clone()
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }
}

#[async_trait]
impl AdminApi for MockAdminApi {
    async fn get_initial_configuration(&self) -> SoapResult<NormalizedValue> {
        self.record("getInitialConfiguration");
        Ok(self.initial_configuration.lock().unwrap().clone())
    }

    async fn settings_get(&self) -> SoapResult<NormalizedValue> {
        self.record("settings_get");
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn settings_set(&self, settings: &NormalizedValue) -> SoapResult<bool> {
        self.record("settings_set");
        self.saved_settings.lock().unwrap().push(settings.clone());
        Ok(*self.settings_set_result.lock().unwrap())
    }

    async fn sessions_list(&self) -> SoapResult<Vec<Session>> {
        self.record("sessions_list");
        Ok(self.sessions.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn session_kill(&self, id: &str) -> SoapResult<bool> {
        self.record("session_kill");
        self.killed.lock().unwrap().push(id.to_string());
        Ok(true)
    }

    async fn certificate_add(&self, certificate: &str) -> SoapResult<bool> {
        self.record("certificate_add");
        self.certificates.lock().unwrap().push(certificate.to_string());
        Ok(*self.certificate_result.lock().unwrap())
    }
}

/// [`AdminConnector`] handing out one shared [`MockAdminApi`]
#[derive(Debug)]
pub struct MockConnector {
    pub api: Arc<MockAdminApi>,
    connections: Mutex<Vec<(String, String, String)>>,
}

impl MockConnector {
    pub fn new(api: MockAdminApi) -> Self {
        Self {
            api: Arc::new(api),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// `(host, user, password)` of every connect call
    pub fn connections(&self) -> Vec<(String, String, String)> {
        self.connections.lock().unwrap().clone()
    }
}

impl AdminConnector for MockConnector {
    fn connect(&self, host: &str, user: &str, password: &str) -> SoapResult<Arc<dyn AdminApi>> {
        self.connections
            .lock()
            .unwrap()
            .push((host.to_string(), user.to_string(), password.to_string()));
        Ok(self.api.clone())
    }
}

/// Context wired to a mock session manager
pub fn sm_context(connector: Arc<MockConnector>) -> ModuleContext {
    ModuleContext::new()
        .with_config(fast_config())
        .with_admin(connector)
}

// ============================================================================
// Mock Connection
// ============================================================================

/// Scripted [`Connection`] recording executed command lines.
#[derive(Debug)]
pub struct MockConnection {
    identifier: String,
    command_results: Mutex<HashMap<String, CommandResult>>,
    default_result: Mutex<CommandResult>,
    commands_executed: Mutex<Vec<String>>,
}

impl MockConnection {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            command_results: Mutex::new(HashMap::new()),
            default_result: Mutex::new(CommandResult::success(String::new(), String::new())),
            commands_executed: Mutex::new(Vec::new()),
        }
    }

    /// Set the result for a specific command line.
    pub fn set_command_result(&self, command: impl Into<String>, result: CommandResult) {
        self.command_results
            .lock()
            .unwrap()
            .insert(command.into(), result);
    }

    /// Set the result for command lines not explicitly configured.
    pub fn set_default_result(&self, result: CommandResult) {
        *self.default_result.lock().unwrap() = result;
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands_executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn execute(
        &self,
        command: &str,
        _options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        self.commands_executed
            .lock()
            .unwrap()
            .push(command.to_string());

        if let Some(result) = self.command_results.lock().unwrap().get(command) {
            return Ok(result.clone());
        }
        Ok(self.default_result.lock().unwrap().clone())
    }
}

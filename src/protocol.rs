//! Ansible binary module protocol.
//!
//! Ansible runs a binary module with the path of an arguments file as its
//! only argument and reads one JSON object from its standard output. The
//! arguments file is either JSON (`{"ANSIBLE_MODULE_ARGS": {...}}` or a bare
//! object) or the legacy `key=value key2="quoted value"` form.
//!
//! Internal `_ansible_*` keys are consumed here: check mode, diff mode,
//! no_log and verbosity feed the [`ModuleContext`], the rest are dropped.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::modules::{
    Diff, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleRegistry, ModuleStatus,
};

const ARGS_WRAPPER: &str = "ANSIBLE_MODULE_ARGS";
const INTERNAL_PREFIX: &str = "_ansible_";

/// Parsed contents of a module arguments file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleArgs {
    /// Task parameters, internal keys removed
    pub params: ModuleParams,
    /// `_ansible_check_mode`
    pub check_mode: bool,
    /// `_ansible_diff`
    pub diff_mode: bool,
    /// `_ansible_no_log`
    pub no_log: bool,
    /// `_ansible_verbosity`
    pub verbosity: u8,
}

impl ModuleArgs {
    /// Parse the text of an arguments file
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let trimmed = text.trim();

        let raw = if trimmed.starts_with('{') {
            parse_json(trimmed)?
        } else {
            parse_legacy(trimmed)?
        };

        let mut args = ModuleArgs::default();
        for (key, value) in raw {
            match key.strip_prefix(INTERNAL_PREFIX) {
                Some("check_mode") => args.check_mode = flag(&value),
                Some("diff") => args.diff_mode = flag(&value),
                Some("no_log") => args.no_log = flag(&value),
                Some("verbosity") => args.verbosity = verbosity(&value),
                Some(other) => debug!(key = %other, "Ignoring internal argument"),
                None => {
                    args.params.insert(key, value);
                }
            }
        }

        Ok(args)
    }

    /// Read and parse an arguments file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::module_args(path, format!("cannot read file: {}", e)))?;
        Self::parse(&text).map_err(|message| Error::module_args(path, message))
    }

    /// Module context carrying these flags on top of `base`
    pub fn context(&self, base: ModuleContext) -> ModuleContext {
        base.with_check_mode(self.check_mode)
            .with_diff_mode(self.diff_mode)
            .with_no_log(self.no_log)
            .with_verbosity(self.verbosity)
    }
}

fn parse_json(text: &str) -> std::result::Result<serde_json::Map<String, Value>, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {}", e))?;

    let Value::Object(mut object) = value else {
        return Err("arguments must be a JSON object".to_string());
    };

    match object.remove(ARGS_WRAPPER) {
        Some(Value::Object(inner)) => Ok(inner),
        Some(_) => Err(format!("{} must be a JSON object", ARGS_WRAPPER)),
        None => Ok(object),
    }
}

fn parse_legacy(text: &str) -> std::result::Result<serde_json::Map<String, Value>, String> {
    let words = shell_words::split(text).map_err(|e| format!("invalid arguments: {}", e))?;

    words
        .into_iter()
        .map(|word| match word.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                Ok((key.to_string(), Value::String(value.to_string())))
            }
            _ => Err(format!("expected key=value, got '{}'", word)),
        })
        .collect()
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1" | "on"),
        _ => false,
    }
}

fn verbosity(value: &Value) -> u8 {
    let level = match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };
    u8::try_from(level).unwrap_or(u8::MAX)
}

/// JSON object written on standard output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnsibleResult {
    pub changed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
    #[serde(flatten)]
    pub data: IndexMap<String, Value>,
}

impl AnsibleResult {
    /// Result for a finished module run
    pub fn from_output(output: ModuleOutput, no_log: bool) -> Self {
        Self {
            changed: output.changed,
            failed: output.status == ModuleStatus::Failed,
            msg: output.msg,
            diff: if no_log { None } else { output.diff },
            stdout: output.stdout,
            stderr: output.stderr,
            rc: output.rc,
            data: output.data,
        }
    }

    /// Failed result, with `<Kind>: <message>` as the message
    pub fn from_error(kind: &str, err: &dyn std::fmt::Display) -> Self {
        Self {
            changed: false,
            failed: true,
            msg: format!("{}: {}", kind, err),
            diff: None,
            stdout: None,
            stderr: None,
            rc: None,
            data: IndexMap::new(),
        }
    }

    /// Process exit status for this result
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed)
    }

    /// Serialized form, one line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"failed": true, "changed": false, "msg": "SerializationError: {}"}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

/// Run a module with already parsed arguments
pub async fn execute_module(
    registry: &ModuleRegistry,
    name: &str,
    args: &ModuleArgs,
    base: ModuleContext,
) -> AnsibleResult {
    let context = args.context(base);
    debug!(module = %name, check_mode = context.check_mode, "Running module");

    match registry.execute(name, &args.params, &context).await {
        Ok(output) => AnsibleResult::from_output(output, context.no_log),
        Err(err) => {
            error!(module = %name, error = %err, "Module failed");
            failure(&err)
        }
    }
}

fn failure(err: &ModuleError) -> AnsibleResult {
    AnsibleResult::from_error(err.kind(), err)
}

/// Run a module from an arguments file; returns the result and exit status
pub async fn run_module(
    registry: &ModuleRegistry,
    name: &str,
    args_path: &Path,
    base: ModuleContext,
) -> (AnsibleResult, i32) {
    let result = match ModuleArgs::load(args_path) {
        Ok(args) => execute_module(registry, name, &args, base).await,
        Err(err) => AnsibleResult::from_error(err.kind(), &err),
    };
    let code = result.exit_code();
    (result, code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_wrapped_json() {
        let args = ModuleArgs::parse(
            r#"{"ANSIBLE_MODULE_ARGS": {"dest": "/srv", "_ansible_check_mode": true,
                "_ansible_diff": "yes", "_ansible_verbosity": 3, "_ansible_module_name": "x"}}"#,
        )
        .unwrap();
        assert!(args.check_mode);
        assert!(args.diff_mode);
        assert!(!args.no_log);
        assert_eq!(args.verbosity, 3);
        assert_eq!(args.params.len(), 1);
        assert_eq!(args.params["dest"], json!("/srv"));
    }

    #[test]
    fn test_parse_bare_json() {
        let args = ModuleArgs::parse(r#"{"name": "WebApps", "_ansible_no_log": 1}"#).unwrap();
        assert!(args.no_log);
        assert_eq!(args.params["name"], json!("WebApps"));
    }

    #[test]
    fn test_parse_legacy_key_value() {
        let args = ModuleArgs::parse(
            "dest=/srv/ovd name=\"Web Apps\" state=absent _ansible_check_mode=True",
        )
        .unwrap();
        assert!(args.check_mode);
        assert_eq!(args.params["name"], json!("Web Apps"));
        assert_eq!(args.params["state"], json!("absent"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(ModuleArgs::parse("[1, 2]").is_err());
        assert!(ModuleArgs::parse("{not json").is_err());
        assert!(ModuleArgs::parse(r#"{"ANSIBLE_MODULE_ARGS": 3}"#).is_err());
        assert!(ModuleArgs::parse("dest=/srv lonely").is_err());
        assert!(ModuleArgs::parse("name='unterminated").is_err());
    }

    #[test]
    fn test_empty_args() {
        assert_eq!(ModuleArgs::parse("   ").unwrap(), ModuleArgs::default());
    }

    #[test]
    fn test_result_serialization() {
        let output = ModuleOutput::changed("done")
            .with_data("result", json!("OVD-ApplicationServer.exe"))
            .with_diff(Diff::new("a", "b"));

        let value: Value =
            serde_json::from_str(&AnsibleResult::from_output(output.clone(), false).to_json())
                .unwrap();
        assert_eq!(
            value,
            json!({
                "changed": true,
                "msg": "done",
                "diff": {"before": "a", "after": "b"},
                "result": "OVD-ApplicationServer.exe"
            })
        );

        let hidden = AnsibleResult::from_output(output, true);
        assert!(hidden.diff.is_none());
        assert_eq!(hidden.exit_code(), 0);
    }

    #[test]
    fn test_failure_result() {
        let result = failure(&ModuleError::MissingParameter("dest".into()));
        assert_eq!(result.exit_code(), 1);
        let value: Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(
            value,
            json!({
                "changed": false,
                "failed": true,
                "msg": "ArgumentError: Missing required parameter: dest"
            })
        );
    }

    #[tokio::test]
    async fn test_run_module_missing_args_file() {
        let (result, code) = run_module(
            &ModuleRegistry::with_builtins(),
            "ovd_slaveserver_role",
            Path::new("/nonexistent/args"),
            ModuleContext::new(),
        )
        .await;
        assert_eq!(code, 1);
        assert!(result.msg.starts_with("ArgumentError: "));
    }
}

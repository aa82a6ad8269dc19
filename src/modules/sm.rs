//! Session manager administration module.
//!
//! Drives the OVD session manager through its administration service:
//!
//! - toggles maintenance mode
//! - enforces slave server registration flags and arbitrary dotted settings
//! - purges every running session
//! - installs a subscription key
//!
//! Setting changes are gathered first and sent as one nested `settings_set`
//! call. In check mode nothing is sent; the result still reports what would
//! change.

use super::{
    Diff, Module, ModuleClassification, ModuleContext, ModuleError, ModuleOutput, ModuleParams,
    ModuleResult, ParamExt,
};
use crate::soap::{AdminApi, NormalizedValue, Scalar};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

const MAINTENANCE_SETTING: &str = "general.system_in_maintenance";
const AUTOREGISTER_SETTING: &str = "general.slave_server_settings.auto_register_new_servers";
const AUTOPROD_SETTING: &str =
    "general.slave_server_settings.auto_switch_new_servers_to_production";

pub struct SmModule;

/// Settings changes collected during one run
struct SettingsPlan<'a> {
    api: &'a dyn AdminApi,
    current: Option<NormalizedValue>,
    modified: NormalizedValue,
    queued: usize,
    before: Map<String, Value>,
    after: Map<String, Value>,
}

impl<'a> SettingsPlan<'a> {
    fn new(api: &'a dyn AdminApi) -> Self {
        Self {
            api,
            current: None,
            modified: NormalizedValue::mapping(),
            queued: 0,
            before: Map::new(),
            after: Map::new(),
        }
    }

    /// Current value of a dotted setting, fetching the settings tree once
    async fn current_value(&mut self, key: &str) -> ModuleResult<NormalizedValue> {
        if self.current.is_none() {
            self.current = Some(self.api.settings_get().await?);
        }

        let value = self
            .current
            .as_ref()
            .and_then(|tree| tree.get_path(key))
            .and_then(|setting| setting.get("value"));

        match value {
            Some(value) => Ok(value.clone()),
            None => {
                warn!(setting = %key, "Setting not reported by the session manager");
                Ok(NormalizedValue::Scalar(Scalar::Null))
            }
        }
    }

    /// Queue `key = desired` when it differs from `current`
    fn enforce(&mut self, key: &str, current: NormalizedValue, desired: NormalizedValue) -> bool {
        let differs = !current.loose_eq(&desired);

        self.before.insert(key.to_string(), current.into());
        self.after.insert(key.to_string(), desired.clone().into());

        if differs {
            debug!(setting = %key, "Setting will change");
            self.modified.set_path(key, desired);
            self.queued += 1;
        }
        differs
    }

    /// Compare a setting from the settings tree and queue it if needed
    async fn enforce_setting(&mut self, key: &str, desired: NormalizedValue) -> ModuleResult<bool> {
        let current = self.current_value(key).await?;
        Ok(self.enforce(key, current, desired))
    }
}

#[async_trait]
impl Module for SmModule {
    fn name(&self) -> &'static str {
        "ovd_sm"
    }

    fn description(&self) -> &'static str {
        "Manage maintenance mode, settings, sessions and subscription of an OVD session manager"
    }

    fn classification(&self) -> ModuleClassification {
        ModuleClassification::RemoteApi
    }

    fn optional_params(&self) -> HashMap<&'static str, Value> {
        // null means "taken from the configuration" or "leave untouched"
        HashMap::from([
            ("host", Value::Null),
            ("user", Value::Null),
            ("password", Value::Null),
            ("maintenance", Value::Null),
            ("killall", json!(false)),
            ("autoregister", Value::Null),
            ("autoprod", Value::Null),
            ("settings", json!({})),
            ("subscription_key", Value::Null),
        ])
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[("purge_all_sessions", "killall")]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        for name in ["maintenance", "killall", "autoregister", "autoprod"] {
            params.get_bool(name)?;
        }

        if let Some(settings) = params.get_map("settings")? {
            if let Some(bad) = settings
                .keys()
                .find(|k| k.is_empty() || k.split('.').any(str::is_empty))
            {
                return Err(ModuleError::InvalidParameter(format!(
                    "settings key '{}' is not a dotted setting name",
                    bad
                )));
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let admin = &context.config.admin;
        let host = params
            .get_string("host")?
            .unwrap_or_else(|| admin.default_host.clone());
        let user = params
            .get_string("user")?
            .unwrap_or_else(|| admin.default_user.clone());
        let password = params
            .get_string("password")?
            .unwrap_or_else(|| admin.default_password.clone());

        let api = context.admin_connector().connect(&host, &user, &password)?;
        let mut notes: Vec<String> = Vec::new();
        let mut changed = false;

        // Settings
        let mut plan = SettingsPlan::new(api.as_ref());

        if let Some(maintenance) = params.get_bool("maintenance")? {
            let config = api.get_initial_configuration().await?;
            let current = config
                .get("system_in_maintenance")
                .is_some_and(NormalizedValue::truthy);

            if plan.enforce(MAINTENANCE_SETTING, flag(current), flag(maintenance)) {
                notes.push(format!("Set system_in_maintenance to {}", maintenance));
            }
        }

        for (param, key) in [
            ("autoregister", AUTOREGISTER_SETTING),
            ("autoprod", AUTOPROD_SETTING),
        ] {
            if let Some(desired) = params.get_bool(param)? {
                if plan.enforce_setting(key, flag(desired)).await? {
                    notes.push(format!("Set {} to {}", key, desired));
                }
            }
        }

        for (key, desired) in params.get_map("settings")?.unwrap_or_default() {
            if plan
                .enforce_setting(&key, NormalizedValue::from(&desired))
                .await?
            {
                notes.push(format!("Set {} to {}", key, desired));
            }
        }

        if plan.queued > 0 {
            changed = true;
            if !context.check_mode {
                info!(count = plan.queued, "Saving session manager settings");
                if !api.settings_set(&plan.modified).await? {
                    return Err(ModuleError::ExecutionFailed(
                        "settings_set returned unexpected value false".to_string(),
                    ));
                }
            }
        }

        let SettingsPlan {
            mut before,
            mut after,
            ..
        } = plan;

        // Sessions
        if params.get_bool_or("killall", false) {
            let mut sessions = api.sessions_list().await?;
            if !sessions.is_empty() {
                changed = true;
                before.insert(
                    "purge_all_sessions".to_string(),
                    sessions.iter().map(|s| Value::String(s.id.clone())).collect(),
                );
                after.insert("purge_all_sessions".to_string(), json!([]));
            }

            if !context.check_mode {
                let interval = context.config.sessions.poll_interval();
                while !sessions.is_empty() {
                    info!(remaining = sessions.len(), "Killing sessions");
                    notes.push(format!("{} sessions left", sessions.len()));

                    for session in &sessions {
                        if !api.session_kill(&session.id).await? {
                            debug!(session = %session.id, "session_kill was not acknowledged");
                        }
                    }

                    tokio::time::sleep(interval).await;
                    sessions = api.sessions_list().await?;
                }
            }
        }

        // Subscription
        if let Some(path) = params.get_string("subscription_key")? {
            changed = true;
            if !context.check_mode {
                let certificate = read_subscription_key(Path::new(&path)).await?;
                if !api.certificate_add(&certificate).await? {
                    return Err(ModuleError::ExecutionFailed(
                        "certificate_add returned unexpected value false".to_string(),
                    ));
                }
                notes.push("Install subscription key".to_string());
            }
        }

        let mut output = if changed {
            ModuleOutput::changed("Session manager updated")
        } else {
            ModuleOutput::ok("Session manager already in the requested state")
        };

        if !notes.is_empty() {
            output = output.with_command_output(Some(notes.join("\n")), None, None);
        }

        if context.wants_diff() {
            output = output.with_diff(Diff::new(Value::Object(before), Value::Object(after)));
        }

        Ok(output)
    }
}

/// Base64 content of the subscription key file
async fn read_subscription_key(path: &Path) -> ModuleResult<String> {
    let data = tokio::fs::read(path).await.map_err(|e| {
        ModuleError::Io(std::io::Error::new(
            e.kind(),
            format!("Cannot read subscription key {}: {}", path.display(), e),
        ))
    })?;
    Ok(BASE64.encode(data))
}

fn flag(value: bool) -> NormalizedValue {
    NormalizedValue::Scalar(Scalar::Bool(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> ModuleParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_params() {
        let module = SmModule;
        assert!(module
            .validate_params(&params(json!({"maintenance": "yes", "killall": false})))
            .is_ok());
        assert!(module
            .validate_params(&params(json!({"maintenance": "maybe"})))
            .is_err());
        assert!(module
            .validate_params(&params(json!({"settings": {"general..x": 1}})))
            .is_err());
        assert!(module
            .validate_params(&params(json!({"settings": "not a dict"})))
            .is_err());
    }

    #[tokio::test]
    async fn test_read_subscription_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.crt");
        std::fs::write(&path, b"subscription").unwrap();

        assert_eq!(
            read_subscription_key(&path).await.unwrap(),
            "c3Vic2NyaXB0aW9u"
        );

        let missing = read_subscription_key(&dir.path().join("nope")).await;
        assert_eq!(missing.unwrap_err().kind(), "IOError");
    }
}

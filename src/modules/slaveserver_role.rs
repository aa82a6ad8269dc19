//! Slave server role membership module.
//!
//! Wraps the `ovd-slaveserver-role` tool: lists the roles installed under a
//! slave server root, then adds or deletes one role to reach the requested
//! state.

use super::{
    Diff, Module, ModuleClassification, ModuleContext, ModuleError, ModuleOutput, ModuleParams,
    ModuleResult, ParamExt,
};
use crate::connection::{CommandResult, Connection, ExecuteOptions};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

/// Desired state of the role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    Present,
    Absent,
}

impl RoleState {
    pub fn from_str(s: &str) -> ModuleResult<Self> {
        match s.to_lowercase().as_str() {
            "present" => Ok(RoleState::Present),
            "absent" => Ok(RoleState::Absent),
            _ => Err(ModuleError::InvalidParameter(format!(
                "Invalid state '{}'. Valid states: present, absent",
                s
            ))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            RoleState::Present => "present",
            RoleState::Absent => "absent",
        }
    }
}

pub struct SlaveServerRoleModule;

impl SlaveServerRoleModule {
    fn command_line(tool: &str, dest: &str, action: &str) -> String {
        format!("{} -m {} {}", tool, shell_words::quote(dest), action)
    }

    async fn run(
        connection: &dyn Connection,
        command: &str,
        options: &ExecuteOptions,
    ) -> ModuleResult<CommandResult> {
        let result = connection.execute(command, Some(options.clone())).await?;
        if !result.success {
            return Err(ModuleError::CommandFailed {
                code: result.exit_code,
                message: format!("'{}': {}", command, result.combined_output().trim()),
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl Module for SlaveServerRoleModule {
    fn name(&self) -> &'static str {
        "ovd_slaveserver_role"
    }

    fn description(&self) -> &'static str {
        "Add or remove a role on an OVD slave server"
    }

    fn classification(&self) -> ModuleClassification {
        ModuleClassification::LocalCommand
    }

    fn required_params(&self) -> &[&'static str] {
        &["dest", "name"]
    }

    fn optional_params(&self) -> HashMap<&'static str, Value> {
        HashMap::from([("state", json!("present"))])
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        if let Some(state) = params.get_string("state")? {
            RoleState::from_str(&state)?;
        }
        if let Some(name) = params.get_string("name")? {
            if name.trim().is_empty() {
                return Err(ModuleError::InvalidParameter(
                    "name must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let dest = params.get_string_required("dest")?;
        let name = params.get_string_required("name")?;
        let state = match params.get_string("state")? {
            Some(s) => RoleState::from_str(&s)?,
            None => RoleState::Present,
        };

        let tool = context.config.role.command.as_str();
        let connection = context.connection();
        let mut options = ExecuteOptions::new();
        if let Some(timeout) = context.config.role.timeout {
            options = options.with_timeout(timeout);
        }

        let ls = Self::run(
            connection.as_ref(),
            &Self::command_line(tool, &dest, "ls"),
            &options,
        )
        .await?
        .stdout
        .trim()
        .to_string();

        // Same textual containment the role tool users rely on
        let installed = ls.contains(name.as_str());
        debug!(role = %name, installed, host = %connection.identifier(), "Role listing read");

        let action = match (state, installed) {
            (RoleState::Present, false) => Some("add"),
            (RoleState::Absent, true) => Some("del"),
            _ => None,
        };

        let mut output = match action {
            Some(action) => {
                if !context.check_mode {
                    let quoted = shell_words::quote(&name);
                    let command = Self::command_line(tool, &dest, &format!("{} {}", action, quoted));
                    info!(role = %name, action, "Updating slave server roles");
                    Self::run(connection.as_ref(), &command, &options).await?;
                }
                ModuleOutput::changed(format!("Role '{}' is now {}", name, state.as_str()))
            }
            None => ModuleOutput::ok(format!("Role '{}' is already {}", name, state.as_str())),
        };

        if context.wants_diff() {
            let before = if installed { "present" } else { "absent" };
            output = output.with_diff(Diff::new(before, state.as_str()));
        }

        Ok(output
            .with_data("repo", Value::String(name))
            .with_data("state", json!(state.as_str()))
            .with_data("ls", Value::String(ls)))
    }
}

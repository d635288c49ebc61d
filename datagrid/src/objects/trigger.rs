use db_driver::{CommentTarget, Ddl, Oid, TriggerInfo, TriggerMode};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// PUT body for a trigger. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerUpdate {
    pub name: Option<String>,
    /// Empty string clears the comment
    pub description: Option<String>,
    pub is_enable_trigger: Option<TriggerMode>,
}

impl TriggerUpdate {
    /// Statements that bring `trigger` in line with this update.
    ///
    /// A rename comes first, so later statements use the new name.
    pub fn to_ddl(&self, trigger: &TriggerInfo) -> Result<Vec<Ddl>> {
        let mut statements = Vec::new();
        let mut name = trigger.name.clone();

        if let Some(new_name) = &self.name {
            if new_name.trim().is_empty() {
                return Err(ApiError::BadRequest(
                    "trigger name must not be empty".to_string(),
                ));
            }
            if *new_name != trigger.name {
                statements.push(Ddl::RenameTrigger {
                    trigger_oid: trigger.oid,
                    table: trigger.table.clone(),
                    from: trigger.name.clone(),
                    to: new_name.clone(),
                });
                name = new_name.clone();
            }
        }

        if let Some(description) = &self.description {
            statements.push(Ddl::Comment {
                target: CommentTarget::Trigger {
                    oid: trigger.oid,
                    name: name.clone(),
                    table: trigger.table.clone(),
                },
                comment: Some(description.clone()).filter(|d| !d.is_empty()),
            });
        }

        if let Some(mode) = self.is_enable_trigger {
            if mode != trigger.mode {
                statements.push(Ddl::SetTriggerMode {
                    trigger_oid: trigger.oid,
                    trigger: name,
                    table: trigger.table.clone(),
                    mode,
                });
            }
        }

        Ok(statements)
    }
}

/// Properties shown for a trigger.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerProperties {
    pub oid: Oid,
    pub name: String,
    pub table: String,
    pub function: String,
    pub is_enable_trigger: TriggerMode,
    pub description: Option<String>,
}

impl From<&TriggerInfo> for TriggerProperties {
    fn from(trigger: &TriggerInfo) -> Self {
        Self {
            oid: trigger.oid,
            name: trigger.name.clone(),
            table: trigger.table.to_string(),
            function: trigger.function.clone(),
            is_enable_trigger: trigger.mode,
            description: trigger.description.clone(),
        }
    }
}

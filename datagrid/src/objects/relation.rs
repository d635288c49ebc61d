//! Tables and materialized views: comment and autovacuum settings.

use db_driver::{Column, CommentTarget, Ddl, Oid, RelationInfo, RelationKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};

const TOAST_PREFIX: &str = "toast.";

/// Per-table autovacuum parameters accepted in `vacuum_table`.
pub const TABLE_VACUUM_PARAMETERS: &[&str] = &[
    "autovacuum_analyze_scale_factor",
    "autovacuum_analyze_threshold",
    "autovacuum_freeze_max_age",
    "autovacuum_vacuum_cost_delay",
    "autovacuum_vacuum_cost_limit",
    "autovacuum_vacuum_scale_factor",
    "autovacuum_vacuum_threshold",
    "autovacuum_freeze_min_age",
    "autovacuum_freeze_table_age",
];

/// Toast autovacuum parameters accepted in `vacuum_toast`, without the
/// `toast.` prefix.
pub const TOAST_VACUUM_PARAMETERS: &[&str] = &[
    "autovacuum_freeze_max_age",
    "autovacuum_vacuum_cost_delay",
    "autovacuum_vacuum_cost_limit",
    "autovacuum_vacuum_scale_factor",
    "autovacuum_vacuum_threshold",
    "autovacuum_freeze_min_age",
    "autovacuum_freeze_table_age",
];

/// One changed row of a vacuum parameter grid. A `null` value resets the
/// parameter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VacuumChange {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VacuumChanges {
    #[serde(default)]
    pub changed: Vec<VacuumChange>,
}

/// PUT body for a table or materialized view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationUpdate {
    pub description: Option<String>,
    /// `false` drops every table-level autovacuum setting
    pub autovacuum_custom: Option<bool>,
    pub autovacuum_enabled: Option<bool>,
    /// `false` drops every toast autovacuum setting
    pub toast_autovacuum: Option<bool>,
    pub toast_autovacuum_enabled: Option<bool>,
    #[serde(default)]
    pub vacuum_table: VacuumChanges,
    #[serde(default)]
    pub vacuum_toast: VacuumChanges,
}

impl RelationUpdate {
    pub fn to_ddl(&self, relation: &RelationInfo) -> Result<Vec<Ddl>> {
        let mut statements = Vec::new();

        if let Some(description) = &self.description {
            statements.push(Ddl::Comment {
                target: CommentTarget::Relation {
                    oid: relation.oid,
                    kind: relation.kind,
                    name: relation.name.clone(),
                },
                comment: Some(description.clone()).filter(|d| !d.is_empty()),
            });
        }

        let mut set: Vec<(String, String)> = Vec::new();
        let mut reset: Vec<String> = Vec::new();

        if self.autovacuum_custom == Some(false) {
            reset.push("autovacuum_enabled".to_string());
            reset.extend(TABLE_VACUUM_PARAMETERS.iter().map(|p| p.to_string()));
        } else {
            if let Some(enabled) = self.autovacuum_enabled {
                set.push(("autovacuum_enabled".to_string(), enabled.to_string()));
            }
            collect_changes(
                &self.vacuum_table.changed,
                TABLE_VACUUM_PARAMETERS,
                "",
                &mut set,
                &mut reset,
            )?;
        }

        if self.toast_autovacuum == Some(false) {
            reset.push(format!("{}autovacuum_enabled", TOAST_PREFIX));
            reset.extend(
                TOAST_VACUUM_PARAMETERS
                    .iter()
                    .map(|p| format!("{}{}", TOAST_PREFIX, p)),
            );
        } else {
            if let Some(enabled) = self.toast_autovacuum_enabled {
                set.push((
                    format!("{}autovacuum_enabled", TOAST_PREFIX),
                    enabled.to_string(),
                ));
            }
            collect_changes(
                &self.vacuum_toast.changed,
                TOAST_VACUUM_PARAMETERS,
                TOAST_PREFIX,
                &mut set,
                &mut reset,
            )?;
        }

        if !set.is_empty() {
            if !relation.kind.has_storage() {
                return Err(ApiError::BadRequest(format!(
                    "{} \"{}\" has no storage parameters",
                    relation.kind, relation.name.name
                )));
            }
            statements.push(Ddl::SetOptions {
                relation_oid: relation.oid,
                kind: relation.kind,
                relation: relation.name.clone(),
                options: set,
            });
        }
        if !reset.is_empty() {
            statements.push(Ddl::ResetOptions {
                relation_oid: relation.oid,
                kind: relation.kind,
                relation: relation.name.clone(),
                options: reset,
            });
        }

        Ok(statements)
    }
}

fn collect_changes(
    changes: &[VacuumChange],
    known: &[&str],
    prefix: &str,
    set: &mut Vec<(String, String)>,
    reset: &mut Vec<String>,
) -> Result<()> {
    for change in changes {
        if !known.contains(&change.name.as_str()) {
            return Err(ApiError::BadRequest(format!(
                "unrecognized parameter \"{}{}\"",
                prefix, change.name
            )));
        }
        let name = format!("{}{}", prefix, change.name);
        match &change.value {
            Value::Null => reset.push(name),
            Value::Number(n) => set.push((name, n.to_string())),
            Value::String(s) if s.trim().parse::<f64>().is_ok() => {
                set.push((name, s.trim().to_string()))
            }
            other => {
                return Err(ApiError::BadRequest(format!(
                    "invalid value for parameter \"{}\": {}",
                    name, other
                )));
            }
        }
    }
    Ok(())
}

/// Properties shown for a table or materialized view.
#[derive(Debug, Clone, Serialize)]
pub struct RelationProperties {
    pub oid: Oid,
    pub name: String,
    pub schema: String,
    pub kind: RelationKind,
    pub description: Option<String>,
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub autovacuum_custom: bool,
    pub autovacuum_enabled: Option<bool>,
    pub toast_autovacuum: bool,
    pub toast_autovacuum_enabled: Option<bool>,
    pub vacuum_table: Vec<VacuumChange>,
    pub vacuum_toast: Vec<VacuumChange>,
}

impl From<&RelationInfo> for RelationProperties {
    fn from(relation: &RelationInfo) -> Self {
        let option = |name: &str| relation.options.get(name);
        let grid = |prefix: &str, names: &[&str]| -> Vec<VacuumChange> {
            names
                .iter()
                .map(|name| VacuumChange {
                    name: name.to_string(),
                    value: option(&format!("{}{}", prefix, name))
                        .map(|v| Value::String(v.clone()))
                        .unwrap_or(Value::Null),
                })
                .collect()
        };
        let table_custom = relation
            .options
            .keys()
            .any(|k| k.starts_with("autovacuum_"));
        let toast_custom = relation
            .options
            .keys()
            .any(|k| k.starts_with(TOAST_PREFIX));

        Self {
            oid: relation.oid,
            name: relation.name.name.clone(),
            schema: relation.name.schema.clone(),
            kind: relation.kind,
            description: relation.description.clone(),
            columns: relation.columns.clone(),
            primary_key: relation.primary_key.clone(),
            autovacuum_custom: table_custom,
            autovacuum_enabled: option("autovacuum_enabled").map(|v| v == "true"),
            toast_autovacuum: toast_custom,
            toast_autovacuum_enabled: option("toast.autovacuum_enabled").map(|v| v == "true"),
            vacuum_table: grid("", TABLE_VACUUM_PARAMETERS),
            vacuum_toast: grid(TOAST_PREFIX, TOAST_VACUUM_PARAMETERS),
        }
    }
}

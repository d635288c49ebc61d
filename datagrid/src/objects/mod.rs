//! Per-object-kind update bodies and property views for the browser routes.

pub mod relation;
pub mod trigger;

use db_driver::Oid;
use serde::Serialize;

pub use relation::{RelationProperties, RelationUpdate, VacuumChange, VacuumChanges};
pub use trigger::{TriggerProperties, TriggerUpdate};

/// Tree node returned after a successful update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    #[serde(rename = "_id")]
    pub id: Oid,
    #[serde(rename = "_type")]
    pub node_type: &'static str,
    pub label: String,
}

impl Node {
    pub fn new(id: Oid, node_type: &'static str, label: impl Into<String>) -> Self {
        Self {
            id,
            node_type,
            label: label.into(),
        }
    }
}

//! Identifiers used to address objects in a cluster.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object identifier, unique within a database.
pub type Oid = u32;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// A server group as configured in the console.
    ServerGroupId(u32)
);
id_type!(
    /// A registered server inside a group.
    ServerId(u32)
);
id_type!(
    /// Database oid on its server.
    DatabaseId(Oid)
);
id_type!(
    /// Schema oid inside a database.
    SchemaId(Oid)
);

/// Full path to a database: the unit a connection is opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseRef {
    pub group: ServerGroupId,
    pub server: ServerId,
    pub database: DatabaseId,
}

impl DatabaseRef {
    pub fn new(group: ServerGroupId, server: ServerId, database: DatabaseId) -> Self {
        Self {
            group,
            server,
            database,
        }
    }
}

impl fmt::Display for DatabaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.server, self.database)
    }
}

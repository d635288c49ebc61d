//! In-memory cluster backend.
//!
//! [`MemoryCluster`] models the part of a database cluster the console needs:
//! server groups, servers, databases with schemas, relations with rows,
//! triggers and storage options. It implements [`Connector`], so sessions and
//! object routes run against it exactly as they would against a real server.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::{Connection, ConnectionId, Connector, RowBatchStream};
use crate::internal::Plan;
use crate::types::{
    Column, CommentTarget, DatabaseId, DatabaseRef, Ddl, Error, Oid, QualifiedName, RelationInfo,
    RelationKind, Result, Row, SchemaId, SelectQuery, ServerGroupId, ServerId, TriggerInfo,
    TriggerMode,
};

/// First oid handed out to user objects.
const FIRST_USER_OID: Oid = 16384;

/// In-memory cluster shared by all connections opened from it.
#[derive(Clone)]
pub struct MemoryCluster {
    inner: Arc<RwLock<ClusterState>>,
    open: Arc<AtomicUsize>,
}

struct ClusterState {
    groups: BTreeMap<ServerGroupId, ServerGroup>,
    next_oid: Oid,
}

struct ServerGroup {
    servers: BTreeMap<ServerId, Server>,
}

struct Server {
    name: String,
    available: bool,
    databases: BTreeMap<DatabaseId, Database>,
}

#[derive(Clone)]
struct Database {
    name: String,
    schemas: BTreeMap<Oid, String>,
    relations: BTreeMap<Oid, Relation>,
    triggers: BTreeMap<Oid, TriggerInfo>,
}

#[derive(Clone)]
struct Relation {
    info: RelationInfo,
    rows: Vec<Row>,
    populated: bool,
}

impl ClusterState {
    fn allocate_oid(&mut self) -> Oid {
        let oid = self.next_oid;
        self.next_oid += 1;
        oid
    }

    fn server(&self, group: ServerGroupId, server: ServerId) -> Result<&Server> {
        self.groups
            .get(&group)
            .ok_or(Error::ServerGroupNotFound(group))?
            .servers
            .get(&server)
            .ok_or(Error::ServerNotFound(server))
    }

    fn server_mut(&mut self, group: ServerGroupId, server: ServerId) -> Result<&mut Server> {
        self.groups
            .get_mut(&group)
            .ok_or(Error::ServerGroupNotFound(group))?
            .servers
            .get_mut(&server)
            .ok_or(Error::ServerNotFound(server))
    }

    fn database(&self, db: DatabaseRef) -> Result<&Database> {
        self.server(db.group, db.server)?
            .databases
            .get(&db.database)
            .ok_or(Error::DatabaseNotFound(db.database))
    }

    fn database_mut(&mut self, db: DatabaseRef) -> Result<&mut Database> {
        self.server_mut(db.group, db.server)?
            .databases
            .get_mut(&db.database)
            .ok_or(Error::DatabaseNotFound(db.database))
    }
}

impl Database {
    fn new(name: String, public_oid: Oid) -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert(public_oid, "public".to_string());
        Self {
            name,
            schemas,
            relations: BTreeMap::new(),
            triggers: BTreeMap::new(),
        }
    }

    fn schema_oid(&self, name: &str) -> Result<Oid> {
        self.schemas
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(oid, _)| *oid)
            .ok_or_else(|| Error::SchemaNotFound(name.to_string()))
    }

    fn relation(&self, oid: Oid) -> Result<&Relation> {
        self.relations.get(&oid).ok_or(Error::ObjectNotFound(oid))
    }

    fn relation_of_kind(&mut self, oid: Oid, kind: RelationKind) -> Result<&mut Relation> {
        let relation = self.relations.get_mut(&oid).ok_or(Error::ObjectNotFound(oid))?;
        if relation.info.kind != kind {
            return Err(Error::Execution(format!(
                "\"{}\" is not a {}",
                relation.info.name.name, kind
            )));
        }
        Ok(relation)
    }

    fn trigger_mut(&mut self, oid: Oid) -> Result<&mut TriggerInfo> {
        self.triggers.get_mut(&oid).ok_or(Error::ObjectNotFound(oid))
    }

    fn apply(&mut self, statement: &Ddl) -> Result<()> {
        match statement {
            Ddl::Comment { target, comment } => {
                let comment = comment.clone().filter(|c| !c.is_empty());
                match target {
                    CommentTarget::Relation { oid, kind, .. } => {
                        self.relation_of_kind(*oid, *kind)?.info.description = comment;
                    }
                    CommentTarget::Trigger { oid, .. } => {
                        self.trigger_mut(*oid)?.description = comment;
                    }
                }
            }
            Ddl::SetTriggerMode {
                trigger_oid, mode, ..
            } => {
                self.trigger_mut(*trigger_oid)?.mode = *mode;
            }
            Ddl::RenameTrigger {
                trigger_oid, to, ..
            } => {
                let table_oid = self.trigger_mut(*trigger_oid)?.table_oid;
                let taken = self
                    .triggers
                    .values()
                    .any(|t| t.table_oid == table_oid && t.oid != *trigger_oid && &t.name == to);
                if taken {
                    let table = self.relation(table_oid)?.info.name.name.clone();
                    return Err(Error::DuplicateObject(format!(
                        "trigger \"{}\" for relation \"{}\"",
                        to, table
                    )));
                }
                self.trigger_mut(*trigger_oid)?.name = to.clone();
            }
            Ddl::SetOptions {
                relation_oid,
                kind,
                options,
                ..
            } => {
                let relation = self.relation_of_kind(*relation_oid, *kind)?;
                if !kind.has_storage() {
                    return Err(Error::Execution(format!(
                        "cannot set storage parameters on {} \"{}\"",
                        kind, relation.info.name.name
                    )));
                }
                for (name, value) in options {
                    relation.info.options.insert(name.clone(), value.clone());
                }
            }
            Ddl::ResetOptions {
                relation_oid,
                kind,
                options,
                ..
            } => {
                let relation = self.relation_of_kind(*relation_oid, *kind)?;
                for name in options {
                    relation.info.options.remove(name);
                }
            }
        }
        Ok(())
    }
}

impl MemoryCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ClusterState {
                groups: BTreeMap::new(),
                next_oid: FIRST_USER_OID,
            })),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a cluster with server group 1, server 1 and its `postgres`
    /// database.
    pub fn seeded() -> Self {
        let cluster = Self::new();
        cluster.add_server_group(ServerGroupId(1), "Servers");
        cluster
            .add_server(ServerGroupId(1), ServerId(1), "PostgreSQL")
            .expect("server group 1 was just created");
        cluster
            .add_database(ServerGroupId(1), ServerId(1), "postgres")
            .expect("server 1 was just created");
        cluster
    }

    fn read(&self) -> RwLockReadGuard<'_, ClusterState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ClusterState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_server_group(&self, id: ServerGroupId, name: &str) {
        self.write().groups.insert(
            id,
            ServerGroup {
                servers: BTreeMap::new(),
            },
        );
        debug!("Added server group {} ({})", id, name);
    }

    pub fn add_server(
        &self,
        group: ServerGroupId,
        id: ServerId,
        name: impl Into<String>,
    ) -> Result<()> {
        let mut state = self.write();
        let group = state
            .groups
            .get_mut(&group)
            .ok_or(Error::ServerGroupNotFound(group))?;
        group.servers.insert(
            id,
            Server {
                name: name.into(),
                available: true,
                databases: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Create a database with its `public` schema.
    pub fn add_database(
        &self,
        group: ServerGroupId,
        server: ServerId,
        name: impl Into<String>,
    ) -> Result<DatabaseId> {
        let mut state = self.write();
        state.server(group, server)?;
        let db_oid = state.allocate_oid();
        let public_oid = state.allocate_oid();
        state
            .server_mut(group, server)?
            .databases
            .insert(DatabaseId(db_oid), Database::new(name.into(), public_oid));
        Ok(DatabaseId(db_oid))
    }

    pub fn add_schema(&self, db: DatabaseRef, name: impl Into<String>) -> Result<SchemaId> {
        let name = name.into();
        let mut state = self.write();
        if state.database(db)?.schema_oid(&name).is_ok() {
            return Err(Error::DuplicateObject(format!("schema \"{}\"", name)));
        }
        let oid = state.allocate_oid();
        state.database_mut(db)?.schemas.insert(oid, name);
        Ok(SchemaId(oid))
    }

    /// Look up a database by name.
    pub fn database_id(&self, group: ServerGroupId, server: ServerId, name: &str) -> Result<DatabaseId> {
        let state = self.read();
        state
            .server(group, server)?
            .databases
            .iter()
            .find(|(_, d)| d.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::Execution(format!("database \"{}\" does not exist", name)))
    }

    /// Look up a schema by name.
    pub fn schema_id(&self, db: DatabaseRef, name: &str) -> Result<SchemaId> {
        self.read().database(db)?.schema_oid(name).map(SchemaId)
    }

    /// Create a relation. Materialized views created here are populated.
    pub fn create_relation(
        &self,
        db: DatabaseRef,
        schema: &str,
        name: &str,
        kind: RelationKind,
        columns: Vec<Column>,
        primary_key: Vec<String>,
    ) -> Result<Oid> {
        let mut state = self.write();
        let database = state.database(db)?;
        let schema_oid = database.schema_oid(schema)?;

        let exists = database
            .relations
            .values()
            .any(|r| r.info.schema_oid == schema_oid && r.info.name.name == name);
        if exists {
            return Err(Error::DuplicateObject(format!("relation \"{}\"", name)));
        }
        if let Some(missing) = primary_key.iter().find(|k| !columns.iter().any(|c| &c.name == *k)) {
            return Err(Error::UndefinedColumn(missing.clone()));
        }

        let oid = state.allocate_oid();
        let columns = columns
            .into_iter()
            .map(|c| {
                let in_key = primary_key.contains(&c.name);
                Column {
                    not_null: c.not_null || in_key,
                    ..c
                }
            })
            .collect();
        let info = RelationInfo {
            oid,
            schema_oid,
            name: QualifiedName::new(schema, name),
            kind,
            columns,
            primary_key,
            description: None,
            options: Default::default(),
        };
        state.database_mut(db)?.relations.insert(
            oid,
            Relation {
                info,
                rows: Vec::new(),
                populated: true,
            },
        );

        debug!("Created {} {}.{} with oid {}", kind, schema, name, oid);
        Ok(oid)
    }

    pub fn create_table(
        &self,
        db: DatabaseRef,
        schema: &str,
        name: &str,
        columns: Vec<Column>,
        primary_key: Vec<String>,
    ) -> Result<Oid> {
        self.create_relation(db, schema, name, RelationKind::Table, columns, primary_key)
    }

    /// Create a materialized view; `with_data == false` leaves it unpopulated
    /// until [`MemoryCluster::refresh_materialized_view`] is called.
    pub fn create_materialized_view(
        &self,
        db: DatabaseRef,
        schema: &str,
        name: &str,
        columns: Vec<Column>,
        with_data: bool,
    ) -> Result<Oid> {
        let oid = self.create_relation(
            db,
            schema,
            name,
            RelationKind::MaterializedView,
            columns,
            Vec::new(),
        )?;
        let mut state = self.write();
        let relation = state
            .database_mut(db)?
            .relations
            .get_mut(&oid)
            .ok_or(Error::ObjectNotFound(oid))?;
        relation.populated = with_data;
        Ok(oid)
    }

    /// Replace the contents of a materialized view and mark it populated.
    pub fn refresh_materialized_view(&self, db: DatabaseRef, oid: Oid, rows: Vec<Row>) -> Result<()> {
        let mut state = self.write();
        let relation = state
            .database_mut(db)?
            .relation_of_kind(oid, RelationKind::MaterializedView)?;
        relation.rows = rows;
        relation.populated = true;
        Ok(())
    }

    /// Append rows, checking arity, NOT NULL and primary key uniqueness.
    pub fn insert_rows(&self, db: DatabaseRef, oid: Oid, rows: Vec<Row>) -> Result<usize> {
        let mut state = self.write();
        let database = state.database_mut(db)?;
        let relation = database.relations.get_mut(&oid).ok_or(Error::ObjectNotFound(oid))?;
        let info = &relation.info;

        let key_idx: Vec<usize> = info
            .primary_key
            .iter()
            .filter_map(|k| info.columns.iter().position(|c| &c.name == k))
            .collect();
        let key_of = |row: &Row| -> Vec<String> {
            key_idx.iter().map(|&i| row[i].to_string()).collect()
        };

        let mut keys: Vec<Vec<String>> = if key_idx.is_empty() {
            Vec::new()
        } else {
            relation.rows.iter().map(key_of).collect()
        };

        for row in &rows {
            if row.len() != info.columns.len() {
                return Err(Error::Execution(format!(
                    "INSERT has {} expressions but \"{}\" has {} columns",
                    row.len(),
                    info.name.name,
                    info.columns.len()
                )));
            }
            if let Some(col) = info
                .columns
                .iter()
                .zip(row)
                .find(|(c, v)| c.not_null && v.is_null())
                .map(|(c, _)| c)
            {
                return Err(Error::Execution(format!(
                    "null value in column \"{}\" violates not-null constraint",
                    col.name
                )));
            }
            if !key_idx.is_empty() {
                let key = key_of(row);
                if keys.contains(&key) {
                    return Err(Error::Execution(format!(
                        "duplicate key value violates unique constraint \"{}_pkey\"",
                        info.name.name
                    )));
                }
                keys.push(key);
            }
        }

        let count = rows.len();
        relation.rows.extend(rows);
        Ok(count)
    }

    /// Create an enabled row trigger on a table.
    pub fn create_trigger(
        &self,
        db: DatabaseRef,
        table_oid: Oid,
        name: &str,
        function: &str,
    ) -> Result<Oid> {
        let mut state = self.write();
        let database = state.database(db)?;
        let table = database.relation(table_oid)?;
        if table.info.kind != RelationKind::Table {
            return Err(Error::Execution(format!(
                "\"{}\" is not a table",
                table.info.name.name
            )));
        }
        let table_name = table.info.name.clone();
        if database
            .triggers
            .values()
            .any(|t| t.table_oid == table_oid && t.name == name)
        {
            return Err(Error::DuplicateObject(format!(
                "trigger \"{}\" for relation \"{}\"",
                name, table_name.name
            )));
        }

        let oid = state.allocate_oid();
        state.database_mut(db)?.triggers.insert(
            oid,
            TriggerInfo {
                oid,
                table_oid,
                name: name.to_string(),
                table: table_name,
                function: function.to_string(),
                mode: TriggerMode::Origin,
                description: None,
            },
        );
        Ok(oid)
    }

    /// Make a server refuse (or accept again) new connections.
    pub fn set_server_available(
        &self,
        group: ServerGroupId,
        server: ServerId,
        available: bool,
    ) -> Result<()> {
        self.write().server_mut(group, server)?.available = available;
        Ok(())
    }

    /// Number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Materialize the result of a query.
    fn snapshot(&self, db: DatabaseRef, query: &SelectQuery) -> Result<Vec<Row>> {
        let (plan, rows) = {
            let state = self.read();
            let relation = state.database(db)?.relation(query.relation_oid)?;
            if relation.info.kind == RelationKind::MaterializedView && !relation.populated {
                return Err(Error::Execution(format!(
                    "materialized view \"{}\" has not been populated",
                    relation.info.name.name
                )));
            }
            (Plan::new(&relation.info.columns, query)?, relation.rows.clone())
        };
        Ok(plan.apply(rows))
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryCluster {
    async fn connect(&self, db: DatabaseRef) -> Result<Box<dyn Connection>> {
        {
            let state = self.read();
            let server = state.server(db.group, db.server)?;
            if !server.available {
                return Err(Error::ConnectionFailed(format!(
                    "server \"{}\" is not accepting connections",
                    server.name
                )));
            }
            server
                .databases
                .get(&db.database)
                .ok_or(Error::DatabaseNotFound(db.database))?;
        }

        let conn = MemoryConnection {
            id: Uuid::new_v4(),
            db,
            cluster: self.clone(),
        };
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Opened connection {} to {} (open: {})", conn.id, db, open);
        Ok(Box::new(conn))
    }
}

/// Connection to one database of a [`MemoryCluster`].
pub struct MemoryConnection {
    id: ConnectionId,
    db: DatabaseRef,
    cluster: MemoryCluster,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn database(&self) -> DatabaseRef {
        self.db
    }

    async fn relation(&self, oid: Oid) -> Result<RelationInfo> {
        let state = self.cluster.read();
        Ok(state.database(self.db)?.relation(oid)?.info.clone())
    }

    async fn trigger(&self, table_oid: Oid, trigger_oid: Oid) -> Result<TriggerInfo> {
        let state = self.cluster.read();
        state
            .database(self.db)?
            .triggers
            .get(&trigger_oid)
            .filter(|t| t.table_oid == table_oid)
            .cloned()
            .ok_or(Error::ObjectNotFound(trigger_oid))
    }

    fn query(&self, query: SelectQuery, batch_size: usize) -> RowBatchStream<'_> {
        let batch_size = batch_size.max(1);
        Box::pin(async_stream::stream! {
            debug!("[{}] {}", self.id, query);
            let rows = match self.cluster.snapshot(self.db, &query) {
                Ok(rows) => rows,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for chunk in rows.chunks(batch_size) {
                // Gives the reader a chance to drop the stream between batches
                tokio::task::yield_now().await;
                yield Ok(chunk.to_vec());
            }
        })
    }

    async fn execute(&self, statements: &[Ddl]) -> Result<()> {
        let mut state = self.cluster.write();
        let database = state.database_mut(self.db)?;

        let mut staged = database.clone();
        for statement in statements {
            info!("[{}] {}", self.id, statement);
            staged.apply(statement)?;
        }
        *database = staged;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        debug!("Closing connection {}", self.id);
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.cluster.open.fetch_sub(1, Ordering::SeqCst);
    }
}

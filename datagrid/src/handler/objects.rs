//! Browser object routes: triggers, tables and materialized views.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use db_driver::{
    Connection, DatabaseId, DatabaseRef, Error as DbError, Oid, RelationInfo, RelationKind,
    ServerGroupId, ServerId,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::info;

use crate::envelope::JsonEnvelope;
use crate::error::{ApiError, Result};
use crate::extract::TargetPath;
use crate::objects::{Node, RelationProperties, RelationUpdate, TriggerProperties, TriggerUpdate};
use crate::server::AppState;

type TriggerPath = (u32, u32, Oid, Oid, Oid, Oid);
type RelationPath = (u32, u32, Oid, Oid, Oid);

fn database(gid: u32, sid: u32, did: Oid) -> DatabaseRef {
    DatabaseRef::new(ServerGroupId(gid), ServerId(sid), DatabaseId(did))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))
}

fn node_response(node: Node) -> Json<Value> {
    Json(json!({ "success": 1, "node": node }))
}

/// Fetch a relation and check that it lives in `schema_oid` and has `kind`.
async fn relation_in_schema(
    conn: &dyn Connection,
    schema_oid: Oid,
    oid: Oid,
    kind: RelationKind,
) -> Result<RelationInfo> {
    let relation = conn.relation(oid).await?;
    if relation.schema_oid != schema_oid || relation.kind != kind {
        return Err(DbError::ObjectNotFound(oid).into());
    }
    Ok(relation)
}

async fn apply_trigger_update(
    conn: &dyn Connection,
    (scid, tid, trid): (Oid, Oid, Oid),
    update: &TriggerUpdate,
) -> Result<Node> {
    relation_in_schema(conn, scid, tid, RelationKind::Table).await?;
    let trigger = conn.trigger(tid, trid).await?;
    let statements = update.to_ddl(&trigger)?;
    if !statements.is_empty() {
        conn.execute(&statements).await?;
    }
    let trigger = conn.trigger(tid, trid).await?;
    Ok(Node::new(trigger.oid, "trigger", trigger.name))
}

/// `PUT /browser/trigger/obj/:gid/:sid/:did/:scid/:tid/:trid`
pub async fn update_trigger(
    State(state): State<AppState>,
    TargetPath((gid, sid, did, scid, tid, trid)): TargetPath<TriggerPath>,
    body: Bytes,
) -> Result<Json<Value>> {
    let update: TriggerUpdate = parse_body(&body)?;
    let conn = state.connector.connect(database(gid, sid, did)).await?;
    let result = apply_trigger_update(conn.as_ref(), (scid, tid, trid), &update).await;
    conn.close().await;

    let node = result?;
    info!("Updated trigger {} ({})", node.label, node.id);
    Ok(node_response(node))
}

/// `GET /browser/trigger/obj/:gid/:sid/:did/:scid/:tid/:trid`
pub async fn trigger_properties(
    State(state): State<AppState>,
    TargetPath((gid, sid, did, scid, tid, trid)): TargetPath<TriggerPath>,
) -> Result<Json<JsonEnvelope>> {
    let conn = state.connector.connect(database(gid, sid, did)).await?;
    let result = async {
        relation_in_schema(conn.as_ref(), scid, tid, RelationKind::Table).await?;
        Ok::<_, ApiError>(conn.trigger(tid, trid).await?)
    }
    .await;
    conn.close().await;

    let properties = TriggerProperties::from(&result?);
    Ok(Json(JsonEnvelope::success(json!(properties))))
}

async fn apply_relation_update(
    conn: &dyn Connection,
    kind: RelationKind,
    (scid, oid): (Oid, Oid),
    update: &RelationUpdate,
) -> Result<Node> {
    let relation = relation_in_schema(conn, scid, oid, kind).await?;
    let statements = update.to_ddl(&relation)?;
    if !statements.is_empty() {
        conn.execute(&statements).await?;
    }
    let node_type = match kind {
        RelationKind::MaterializedView => "mview",
        _ => "table",
    };
    Ok(Node::new(relation.oid, node_type, relation.name.name))
}

async fn update_relation(
    state: AppState,
    kind: RelationKind,
    (gid, sid, did, scid, oid): RelationPath,
    body: Bytes,
) -> Result<Json<Value>> {
    let update: RelationUpdate = parse_body(&body)?;
    let conn = state.connector.connect(database(gid, sid, did)).await?;
    let result = apply_relation_update(conn.as_ref(), kind, (scid, oid), &update).await;
    conn.close().await;

    let node = result?;
    info!("Updated {} {} ({})", kind, node.label, node.id);
    Ok(node_response(node))
}

async fn relation_properties(
    state: AppState,
    kind: RelationKind,
    (gid, sid, did, scid, oid): RelationPath,
) -> Result<Json<JsonEnvelope>> {
    let conn = state.connector.connect(database(gid, sid, did)).await?;
    let result = relation_in_schema(conn.as_ref(), scid, oid, kind).await;
    conn.close().await;

    let properties = RelationProperties::from(&result?);
    Ok(Json(JsonEnvelope::success(json!(properties))))
}

/// `PUT /browser/table/obj/:gid/:sid/:did/:scid/:tid`
pub async fn update_table(
    State(state): State<AppState>,
    TargetPath(path): TargetPath<RelationPath>,
    body: Bytes,
) -> Result<Json<Value>> {
    update_relation(state, RelationKind::Table, path, body).await
}

/// `GET /browser/table/obj/:gid/:sid/:did/:scid/:tid`
pub async fn table_properties(
    State(state): State<AppState>,
    TargetPath(path): TargetPath<RelationPath>,
) -> Result<Json<JsonEnvelope>> {
    relation_properties(state, RelationKind::Table, path).await
}

/// `PUT /browser/mview/obj/:gid/:sid/:did/:scid/:vid`
pub async fn update_mview(
    State(state): State<AppState>,
    TargetPath(path): TargetPath<RelationPath>,
    body: Bytes,
) -> Result<Json<Value>> {
    update_relation(state, RelationKind::MaterializedView, path, body).await
}

/// `GET /browser/mview/obj/:gid/:sid/:did/:scid/:vid`
pub async fn mview_properties(
    State(state): State<AppState>,
    TargetPath(path): TargetPath<RelationPath>,
) -> Result<Json<JsonEnvelope>> {
    relation_properties(state, RelationKind::MaterializedView, path).await
}

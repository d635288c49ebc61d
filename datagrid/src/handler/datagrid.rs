//! Data-view routes: initialize, start, poll, fetch, close.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use db_driver::{DatabaseId, DatabaseRef, Predicate, ServerGroupId, ServerId};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::envelope::JsonEnvelope;
use crate::error::{ApiError, Result};
use crate::extract::TargetPath;
use crate::server::AppState;
use crate::session::{
    ColumnInfo, ObjectKind, PollStatus, QueryState, RowPage, Target, TransactionId, ViewMode,
    ViewRequest,
};

/// Optional body of the initialize request.
#[derive(Debug, Default, Deserialize)]
struct InitializeBody {
    #[serde(default)]
    filter: Vec<Predicate>,
}

/// `POST /datagrid/initialize/datagrid/:trans_id/:view_mode/:obj_type/:sgid/:sid/:did/:obj_id`
pub async fn initialize(
    State(state): State<AppState>,
    TargetPath((trans_id, view_mode, obj_type, sgid, sid, did, obj_id)): TargetPath<(
        String,
        u8,
        String,
        u32,
        u32,
        u32,
        u32,
    )>,
    body: Bytes,
) -> Result<Json<JsonEnvelope>> {
    let mode = ViewMode::from_code(view_mode)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown view mode {}", view_mode)))?;
    let kind: ObjectKind = obj_type.parse()?;

    let body: InitializeBody = if body.iter().all(u8::is_ascii_whitespace) {
        InitializeBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?
    };

    let target = Target {
        database: DatabaseRef::new(ServerGroupId(sgid), ServerId(sid), DatabaseId(did)),
        object_id: obj_id,
        kind,
    };
    let request = ViewRequest::new(target, mode).with_filter(body.filter);

    let id = state
        .sessions
        .initialize_with_id(TransactionId::from(trans_id), request)
        .await?;
    info!("Initialized data view {} on {}", id, target);

    Ok(Json(JsonEnvelope::success(json!({ "gridTransId": id }))))
}

/// `GET /sqleditor/view_data/start/:trans_id`
pub async fn start(
    State(state): State<AppState>,
    Path(trans_id): Path<String>,
) -> Result<Json<JsonEnvelope>> {
    let sql = state.sessions.start(&TransactionId::from(trans_id)).await?;
    Ok(Json(JsonEnvelope::success(json!({
        "status": true,
        "sql": sql,
    }))))
}

/// `GET /sqleditor/poll/:trans_id`
pub async fn poll(
    State(state): State<AppState>,
    Path(trans_id): Path<String>,
) -> Result<Json<JsonEnvelope>> {
    let id = TransactionId::from(trans_id);
    let status = state.sessions.poll(&id).await?;
    debug!("Poll {}: {}", id, status.state.name());
    Ok(Json(JsonEnvelope::success(poll_payload(&status))))
}

/// `GET /sqleditor/fetch/:trans_id`
pub async fn fetch(
    State(state): State<AppState>,
    Path(trans_id): Path<String>,
) -> Result<Json<JsonEnvelope>> {
    let page = state.sessions.fetch(&TransactionId::from(trans_id)).await?;
    let mut data = Map::new();
    insert_page(&mut data, &page);
    Ok(Json(JsonEnvelope::success(Value::Object(data))))
}

/// `DELETE /datagrid/close/:trans_id`
pub async fn close(
    State(state): State<AppState>,
    Path(trans_id): Path<String>,
) -> Json<JsonEnvelope> {
    let closed = state.sessions.close(&TransactionId::from(trans_id)).await;
    Json(JsonEnvelope::success(json!({ "closed": closed })))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<JsonEnvelope> {
    Json(JsonEnvelope::success(json!({
        "status": "ok",
        "sessions": state.sessions.session_count(),
    })))
}

/// Client facing status name.
fn status_name(state: &QueryState) -> &'static str {
    match state {
        QueryState::Initialized => "Initialized",
        QueryState::Running => "Busy",
        QueryState::Completed(_) => "Success",
        QueryState::Failed(_) => "Error",
    }
}

fn poll_payload(status: &PollStatus) -> Value {
    let mut data = Map::new();
    data.insert("status".into(), json!(status_name(&status.state)));

    let summary = status.state.summary();
    data.insert(
        "result".into(),
        summary.map_or(Value::Null, |s| json!(s.status)),
    );
    let rows_affected = match &status.state {
        QueryState::Completed(s) => s.row_count(),
        _ => 0,
    };
    data.insert("rows_affected".into(), json!(rows_affected));

    match &status.page {
        Some(page) => insert_page(&mut data, page),
        None => {
            data.insert("rows_fetched_from".into(), json!(0));
            data.insert("rows_fetched_to".into(), json!(0));
            data.insert("has_more_rows".into(), json!(false));
            data.insert("rows".into(), json!([]));
        }
    }

    let columns: &[ColumnInfo] = summary.map(|s| s.columns.as_slice()).unwrap_or_default();
    data.insert("colinfo".into(), json!(columns));

    // primary key name -> type
    let primary_keys: Map<String, Value> = summary
        .map(|s| {
            s.primary_keys
                .iter()
                .map(|key| {
                    let type_name = s
                        .columns
                        .iter()
                        .find(|c| &c.name == key)
                        .map(|c| c.type_name.clone())
                        .unwrap_or_default();
                    (key.clone(), json!(type_name))
                })
                .collect()
        })
        .unwrap_or_default();
    data.insert("primary_keys".into(), Value::Object(primary_keys));

    if let Some(s) = summary {
        data.insert("elapsed_ms".into(), json!(s.elapsed.as_millis() as u64));
    }

    Value::Object(data)
}

/// Page bounds are reported one-based: rows 1..=10 is `from: 1, to: 10`.
fn insert_page(data: &mut Map<String, Value>, page: &RowPage) {
    let from = if page.rows.is_empty() {
        page.fetched_from
    } else {
        page.fetched_from + 1
    };
    data.insert("rows_fetched_from".into(), json!(from));
    data.insert("rows_fetched_to".into(), json!(page.fetched_to));
    data.insert("has_more_rows".into(), json!(page.has_more_rows));
    data.insert("rows".into(), json!(page.rows));
}

use axum::routing::{delete, get, post};
use axum::Router;
use db_driver::Connector;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler::{datagrid, objects};
use crate::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub connector: Arc<dyn Connector>,
}

impl AppState {
    pub fn new(connector: Arc<dyn Connector>, config: &ServerConfig) -> Self {
        Self {
            sessions: SessionManager::new(Arc::clone(&connector), config.fetch_batch),
            connector,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/datagrid/initialize/datagrid/:trans_id/:view_mode/:obj_type/:sgid/:sid/:did/:obj_id",
            post(datagrid::initialize),
        )
        .route("/sqleditor/view_data/start/:trans_id", get(datagrid::start))
        .route("/sqleditor/poll/:trans_id", get(datagrid::poll))
        .route("/sqleditor/fetch/:trans_id", get(datagrid::fetch))
        .route("/datagrid/close/:trans_id", delete(datagrid::close))
        .route(
            "/browser/trigger/obj/:gid/:sid/:did/:scid/:tid/:trid",
            get(objects::trigger_properties).put(objects::update_trigger),
        )
        .route(
            "/browser/table/obj/:gid/:sid/:did/:scid/:tid",
            get(objects::table_properties).put(objects::update_table),
        )
        .route(
            "/browser/mview/obj/:gid/:sid/:did/:scid/:vid",
            get(objects::mview_properties).put(objects::update_mview),
        )
        .route("/health", get(datagrid::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

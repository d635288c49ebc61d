//! HTTP integration tests driving the router against an in-memory cluster.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use datagrid::{create_app, AppState, ServerConfig};
use db_driver::{Column, DatabaseRef, MemoryCluster, Oid, ServerGroupId, ServerId};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestServer {
    app: Router,
    cluster: MemoryCluster,
    db: DatabaseRef,
}

impl TestServer {
    fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    fn with_config(config: ServerConfig) -> Self {
        let cluster = MemoryCluster::seeded();
        let db_id = cluster
            .database_id(ServerGroupId(1), ServerId(1), "postgres")
            .unwrap();
        let db = DatabaseRef::new(ServerGroupId(1), ServerId(1), db_id);
        let state = AppState::new(Arc::new(cluster.clone()), &config);
        Self {
            app: create_app(state),
            cluster,
            db,
        }
    }

    fn public_schema(&self) -> Oid {
        self.cluster.schema_id(self.db, "public").unwrap().0
    }

    /// `id integer not null, json_val json not null, primary key (id)`
    fn json_table(&self, name: &str) -> Oid {
        self.cluster
            .create_table(
                self.db,
                "public",
                name,
                vec![
                    Column::new("id", "integer").not_null(),
                    Column::new("json_val", "json").not_null(),
                ],
                vec!["id".to_string()],
            )
            .unwrap()
    }

    fn numbers_table(&self, rows: usize) -> Oid {
        let oid = self
            .cluster
            .create_table(
                self.db,
                "public",
                "numbers",
                vec![Column::new("id", "integer"), Column::new("label", "text")],
                vec!["id".to_string()],
            )
            .unwrap();
        let data = (1..=rows)
            .map(|i| vec![json!(i), json!(format!("n{}", i))])
            .collect();
        self.cluster.insert_rows(self.db, oid, data).unwrap();
        oid
    }

    fn initialize_uri(&self, trans_id: &str, mode: u8, obj_type: &str, oid: Oid) -> String {
        format!(
            "/datagrid/initialize/datagrid/{}/{}/{}/1/1/{}/{}",
            trans_id, mode, obj_type, self.db.database.0, oid
        )
    }

    fn object_uri(&self, kind: &str, tail: &str) -> String {
        format!(
            "/browser/{}/obj/1/1/{}/{}/{}",
            kind,
            self.db.database.0,
            self.public_schema(),
            tail
        )
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(body)).await
    }

    async fn open(&self, trans_id: &str, mode: u8, obj_type: &str, oid: Oid) {
        let uri = self.initialize_uri(trans_id, mode, obj_type, oid);
        let (status, body) = self.send(Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    async fn poll_until_done(&self, trans_id: &str) -> Value {
        let uri = format!("/sqleditor/poll/{}", trans_id);
        for _ in 0..200 {
            let (status, body) = self.get(&uri).await;
            assert_eq!(status, StatusCode::OK, "{}", body);
            let state = body["data"]["status"].as_str().unwrap_or_default();
            if state == "Success" || state == "Error" {
                return body["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("transaction {} never finished", trans_id);
    }
}

#[tokio::test]
async fn test_view_data_of_empty_json_table() {
    let server = TestServer::new();
    let oid = server.json_table("test_table_json");

    let uri = server.initialize_uri("4711", 3, "table", oid);
    let (status, body) = server.send(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], 1);
    assert_eq!(body["data"]["gridTransId"], "4711");

    let (status, body) = server.get("/sqleditor/view_data/start/4711").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], true);
    assert_eq!(
        body["data"]["sql"],
        "SELECT * FROM public.test_table_json ORDER BY id ASC"
    );

    let data = server.poll_until_done("4711").await;
    assert_eq!(data["status"], "Success");
    assert_eq!(data["result"], "SELECT 0");
    assert_eq!(data["rows_fetched_to"], 0);
    assert_eq!(data["has_more_rows"], false);
    assert_eq!(data["primary_keys"], json!({"id": "integer"}));
    assert_eq!(data["colinfo"][1]["type_name"], "json");
}

#[tokio::test]
async fn test_json_values_are_returned_verbatim() {
    let server = TestServer::new();
    let oid = server.json_table("docs");
    server
        .cluster
        .insert_rows(
            server.db,
            oid,
            vec![vec![json!(1), json!({"tags": ["a", "b"], "n": null})]],
        )
        .unwrap();

    server.open("10", 3, "table", oid).await;
    server.get("/sqleditor/view_data/start/10").await;
    let data = server.poll_until_done("10").await;
    assert_eq!(data["result"], "SELECT 1");
    assert_eq!(data["rows"], json!([[1, {"tags": ["a", "b"], "n": null}]]));
}

#[tokio::test]
async fn test_poll_before_start() {
    let server = TestServer::new();
    let oid = server.numbers_table(3);
    server.open("1", 3, "table", oid).await;

    let (status, body) = server.get("/sqleditor/poll/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Initialized");
    assert_eq!(body["data"]["result"], Value::Null);
    assert_eq!(body["data"]["rows"], json!([]));
}

#[tokio::test]
async fn test_second_start_conflicts() {
    let server = TestServer::new();
    let oid = server.numbers_table(3);
    server.open("1", 3, "table", oid).await;

    let (status, _) = server.get("/sqleditor/view_data/start/1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = server.get("/sqleditor/view_data/start/1").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], 0);

    let data = server.poll_until_done("1").await;
    assert_eq!(data["result"], "SELECT 3");
}

#[tokio::test]
async fn test_close_then_poll() {
    let server = TestServer::new();
    let oid = server.numbers_table(3);
    server.open("77", 3, "table", oid).await;
    server.get("/sqleditor/view_data/start/77").await;
    server.poll_until_done("77").await;

    let (status, body) = server.send(Method::DELETE, "/datagrid/close/77", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["closed"], true);

    let (status, body) = server.get("/sqleditor/poll/77").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errormsg"], "Transaction ID 77 not found in the session");

    let (status, body) = server.send(Method::DELETE, "/datagrid/close/77", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["closed"], false);
    assert_eq!(server.cluster.open_connections(), 0);
}

#[tokio::test]
async fn test_unknown_transaction() {
    let server = TestServer::new();
    let (status, _) = server.get("/sqleditor/view_data/start/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get("/sqleditor/fetch/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_paging_with_fetch() {
    let server = TestServer::with_config(ServerConfig {
        fetch_batch: 2,
        ..ServerConfig::default()
    });
    let oid = server.numbers_table(5);
    server.open("p", 1, "table", oid).await;

    let (status, _) = server.get("/sqleditor/fetch/p").await;
    assert_eq!(status, StatusCode::CONFLICT);

    server.get("/sqleditor/view_data/start/p").await;
    let data = server.poll_until_done("p").await;
    assert_eq!(data["result"], "SELECT 5");
    assert_eq!(data["rows_affected"], 5);
    assert_eq!(data["rows_fetched_from"], 1);
    assert_eq!(data["rows_fetched_to"], 2);
    assert_eq!(data["has_more_rows"], true);

    let (_, body) = server.get("/sqleditor/fetch/p").await;
    assert_eq!(body["data"]["rows_fetched_from"], 3);
    assert_eq!(body["data"]["rows_fetched_to"], 4);
    assert_eq!(body["data"]["rows"][0][0], 3);

    // polling again covers everything fetched so far
    let (_, body) = server.get("/sqleditor/poll/p").await;
    assert_eq!(body["data"]["rows_fetched_from"], 1);
    assert_eq!(body["data"]["rows_fetched_to"], 4);
    assert_eq!(body["data"]["rows"].as_array().unwrap().len(), 4);

    let (_, body) = server.get("/sqleditor/fetch/p").await;
    assert_eq!(body["data"]["rows"], json!([[5, "n5"]]));
    assert_eq!(body["data"]["has_more_rows"], false);

    let (status, body) = server.get("/sqleditor/fetch/p").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rows"], json!([]));
}

#[tokio::test]
async fn test_last_rows_are_descending() {
    let server = TestServer::new();
    let oid = server.numbers_table(150);
    server.open("last", 2, "table", oid).await;

    let (_, body) = server.get("/sqleditor/view_data/start/last").await;
    assert_eq!(
        body["data"]["sql"],
        "SELECT * FROM public.numbers ORDER BY id DESC LIMIT 100"
    );
    let data = server.poll_until_done("last").await;
    assert_eq!(data["result"], "SELECT 100");
    assert_eq!(data["rows"][0][0], 150);
    assert_eq!(data["rows"][99][0], 51);
}

#[tokio::test]
async fn test_filtered_rows() {
    let server = TestServer::new();
    let oid = server.numbers_table(6);

    let uri = server.initialize_uri("f", 4, "table", oid);
    let (status, _) = server.send(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let filter = json!({"filter": [{"column": "id", "operator": "ge", "value": 5}]});
    let (status, _) = server.send(Method::POST, &uri, Some(filter)).await;
    assert_eq!(status, StatusCode::OK);

    server.get("/sqleditor/view_data/start/f").await;
    let data = server.poll_until_done("f").await;
    assert_eq!(data["rows"], json!([[5, "n5"], [6, "n6"]]));
}

#[tokio::test]
async fn test_initialize_rejections() {
    let server = TestServer::new();
    let oid = server.numbers_table(1);

    let (status, _) = server
        .send(Method::POST, &server.initialize_uri("a", 9, "table", oid), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .send(Method::POST, &server.initialize_uri("a", 3, "sequence", oid), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .send(Method::POST, &server.initialize_uri("a", 3, "table", 999_999), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .send(Method::POST, &server.initialize_uri("a", 3, "view", oid), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .send(Method::POST, "/datagrid/initialize/datagrid/a/3/table/1/8/1/1", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.open("a", 3, "table", oid).await;
    let (status, _) = server
        .send(Method::POST, &server.initialize_uri("a", 3, "table", oid), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unparseable_path_segments() {
    let server = TestServer::new();

    let (status, body) = server
        .send(Method::POST, "/datagrid/initialize/datagrid/1/3/table/1/1/abc/5", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], 0);
    assert!(
        body["errormsg"].as_str().unwrap().starts_with("Could not find the object"),
        "{}",
        body
    );

    let (status, body) = server
        .send(Method::POST, "/datagrid/initialize/datagrid/1/300/table/1/1/1/5", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], 0);

    let (status, body) = server.put("/browser/table/obj/1/1/x/2200/1", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], 0);
}

#[tokio::test]
async fn test_unreachable_server() {
    let server = TestServer::new();
    let oid = server.numbers_table(1);
    server
        .cluster
        .set_server_available(ServerGroupId(1), ServerId(1), false)
        .unwrap();

    let (status, _) = server
        .send(Method::POST, &server.initialize_uri("u", 3, "table", oid), None)
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unpopulated_mview_fails() {
    let server = TestServer::new();
    let oid = server
        .cluster
        .create_materialized_view(server.db, "public", "mv", vec![Column::new("x", "text")], false)
        .unwrap();
    server.open("mv", 3, "mview", oid).await;
    server.get("/sqleditor/view_data/start/mv").await;

    let data = server.poll_until_done("mv").await;
    assert_eq!(data["status"], "Error");
    assert_eq!(
        data["result"],
        "materialized view \"mv\" has not been populated"
    );
}

#[tokio::test]
async fn test_mview_vacuum_parameters() {
    let server = TestServer::new();
    let oid = server
        .cluster
        .create_materialized_view(
            server.db,
            "public",
            "test_mview_put",
            vec![Column::new("x", "text")],
            true,
        )
        .unwrap();
    let uri = server.object_uri("mview", &oid.to_string());

    let (status, body) = server
        .put(
            &uri,
            json!({
                "oid": oid,
                "autovacuum_custom": true,
                "autovacuum_enabled": true,
                "vacuum_table": {"changed": [
                    {"name": "autovacuum_vacuum_cost_delay", "value": 20},
                    {"name": "autovacuum_vacuum_threshold", "value": 20}
                ]}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["node"]["_id"], oid);
    assert_eq!(body["node"]["_type"], "mview");
    assert_eq!(body["node"]["label"], "test_mview_put");

    let (status, body) = server
        .put(
            &uri,
            json!({
                "oid": oid,
                "autovacuum_custom": true,
                "vacuum_toast": {"changed": [
                    {"name": "autovacuum_vacuum_cost_delay", "value": 20}
                ]}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = server.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    let props = &body["data"];
    assert_eq!(props["autovacuum_custom"], true);
    assert_eq!(props["autovacuum_enabled"], true);
    assert_eq!(props["toast_autovacuum"], true);
    let delay = props["vacuum_table"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "autovacuum_vacuum_cost_delay")
        .unwrap();
    assert_eq!(delay["value"], "20");

    let (status, _) = server
        .put(
            &uri,
            json!({
                "autovacuum_enabled": false,
                "vacuum_table": {"changed": [
                    {"name": "autovacuum_vacuum_cost_delay", "value": null},
                    {"name": "autovacuum_vacuum_threshold", "value": null}
                ]}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = server.get(&uri).await;
    assert_eq!(body["data"]["autovacuum_enabled"], false);
    assert_eq!(body["data"]["vacuum_table"][3]["value"], Value::Null);
}

#[tokio::test]
async fn test_reset_all_vacuum_parameters_twice() {
    let server = TestServer::new();
    let oid = server
        .cluster
        .create_materialized_view(server.db, "public", "mv_reset", vec![Column::new("x", "text")], true)
        .unwrap();
    let uri = server.object_uri("mview", &oid.to_string());
    server
        .put(
            &uri,
            json!({
                "autovacuum_custom": true,
                "autovacuum_enabled": true,
                "vacuum_table": {"changed": [{"name": "autovacuum_analyze_threshold", "value": 50}]}
            }),
        )
        .await;

    let (status, _) = server.put(&uri, json!({"oid": oid, "autovacuum_custom": false})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, first) = server.get(&uri).await;

    let (status, _) = server.put(&uri, json!({"oid": oid, "autovacuum_custom": false})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = server.get(&uri).await;

    assert_eq!(first, second);
    assert_eq!(second["data"]["autovacuum_custom"], false);
    assert_eq!(second["data"]["autovacuum_enabled"], Value::Null);
}

#[tokio::test]
async fn test_relation_update_rejections() {
    let server = TestServer::new();
    let table = server.numbers_table(0);
    let uri = server.object_uri("table", &table.to_string());

    let (status, _) = server
        .put(
            &uri,
            json!({"vacuum_table": {"changed": [{"name": "fillfactor", "value": 10}]}}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .send(Method::PUT, &uri, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // a table addressed through the mview route
    let (status, _) = server
        .put(&server.object_uri("mview", &table.to_string()), json!({"description": "x"}))
        .await;
    assert_eq!(status, StatusCode::GONE);

    // a relation addressed through a schema it does not belong to
    let archive = server.cluster.add_schema(server.db, "archive").unwrap();
    let archived = server
        .cluster
        .create_table(server.db, "archive", "old_numbers", vec![Column::new("id", "integer")], vec![])
        .unwrap();
    let (status, body) = server
        .put(
            &server.object_uri("table", &archived.to_string()),
            json!({"description": "x"}),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["success"], 0);
    let archive_uri = format!(
        "/browser/table/obj/1/1/{}/{}/{}",
        server.db.database.0, archive.0, archived
    );
    let (status, _) = server.put(&archive_uri, json!({"description": "x"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.put(&uri, json!({"description": "numbers 1..n"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node"]["_type"], "table");
    let (_, body) = server.get(&uri).await;
    assert_eq!(body["data"]["description"], "numbers 1..n");
}

#[tokio::test]
async fn test_trigger_updates() {
    let server = TestServer::new();
    let table = server.numbers_table(0);
    let trigger = server
        .cluster
        .create_trigger(server.db, table, "audit", "public.audit_fn")
        .unwrap();
    let uri = server.object_uri("trigger", &format!("{}/{}", table, trigger));

    let (status, body) = server
        .put(&uri, json!({"id": trigger, "is_enable_trigger": "D"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["node"]["_type"], "trigger");

    let (status, body) = server.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_enable_trigger"], "D");

    for mode in ["A", "R"] {
        let (status, _) = server.put(&uri, json!({"is_enable_trigger": mode})).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = server.get(&uri).await;
        assert_eq!(body["data"]["is_enable_trigger"], mode);
    }

    let (status, body) = server
        .put(
            &uri,
            json!({"name": "audit_v2", "description": "This is test comment."}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node"]["label"], "audit_v2");
    let (_, body) = server.get(&uri).await;
    assert_eq!(body["data"]["name"], "audit_v2");
    assert_eq!(body["data"]["description"], "This is test comment.");

    let (status, _) = server.put(&uri, json!({"is_enable_trigger": "Z"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = server.object_uri("trigger", &format!("{}/{}", table, 999_999));
    let (status, _) = server.put(&missing, json!({"is_enable_trigger": "D"})).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::new();
    let oid = server.numbers_table(0);
    server.open("h", 3, "table", oid).await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["sessions"], 1);
}

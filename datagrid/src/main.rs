use datagrid::{create_app, AppState, ServerConfig};
use db_driver::MemoryCluster;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datagrid=debug,db_driver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    info!("Starting datagrid server on {}", config.addr);

    // 内存数据库集群
    let cluster = MemoryCluster::seeded();
    let state = AppState::new(Arc::new(cluster), &config);

    // 启动空闲会话回收任务
    let shutdown = CancellationToken::new();
    let reaper = state.sessions.spawn_reaper(
        config.reap_interval,
        config.idle_timeout,
        shutdown.clone(),
    );
    let sessions = state.sessions.clone();

    let app = create_app(state);

    // 启动服务器
    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .expect("Failed to bind address");

    info!("Datagrid server listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .expect("Server error");

    // 关闭所有会话
    shutdown.cancel();
    if let Err(e) = reaper.await {
        warn!("Session reaper ended abnormally: {}", e);
    }
    sessions.close_all().await;
    info!("Datagrid server stopped");
}

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use db_driver::{Connection, Connector, RelationInfo, SelectQuery};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::SessionError;
use super::query_session::QuerySession;
use super::state::{PollStatus, RowPage, TransactionId};
use super::target::ViewRequest;

/// Manages data-view sessions, mapping transaction IDs to sessions.
/// Each session owns a dedicated connection.
#[derive(Clone)]
pub struct SessionManager {
    /// Map from transaction id to session
    sessions: Arc<DashMap<TransactionId, Arc<QuerySession>>>,
    connector: Arc<dyn Connector>,
    /// Rows per stream batch and per returned page
    fetch_batch: usize,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, fetch_batch: usize) -> Self {
        info!("Created session manager (fetch batch {})", fetch_batch);
        Self {
            sessions: Arc::new(DashMap::new()),
            connector,
            fetch_batch: fetch_batch.max(1),
        }
    }

    /// Open a session under a freshly generated id.
    pub async fn initialize(&self, request: ViewRequest) -> Result<TransactionId, SessionError> {
        self.initialize_with_id(TransactionId::generate(), request)
            .await
    }

    /// Open a session under a caller supplied id.
    pub async fn initialize_with_id(
        &self,
        id: TransactionId,
        request: ViewRequest,
    ) -> Result<TransactionId, SessionError> {
        if self.sessions.contains_key(&id) {
            return Err(SessionError::DuplicateSession(id));
        }

        let conn = self
            .connector
            .connect(request.target.database)
            .await
            .map_err(SessionError::from_connect)?;
        let (relation, query) = match prepare(conn.as_ref(), &request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                conn.close().await;
                return Err(e);
            }
        };

        let session = Arc::new(QuerySession::new(
            id.clone(),
            request.target,
            relation,
            query,
            conn,
        ));
        let inserted = match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&session));
                true
            }
        };
        if !inserted {
            session.close().await;
            return Err(SessionError::DuplicateSession(id));
        }
        Ok(id)
    }

    /// Get an existing session.
    pub fn get(&self, id: &TransactionId) -> Result<Arc<QuerySession>, SessionError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))
    }

    /// Begin execution; returns the query text.
    pub async fn start(&self, id: &TransactionId) -> Result<String, SessionError> {
        self.get(id)?.start(self.fetch_batch).await
    }

    pub async fn poll(&self, id: &TransactionId) -> Result<PollStatus, SessionError> {
        Ok(self.get(id)?.poll(self.fetch_batch).await)
    }

    pub async fn fetch(&self, id: &TransactionId) -> Result<RowPage, SessionError> {
        self.get(id)?.fetch(self.fetch_batch).await
    }

    /// Remove a session, cancelling its execution. Returns whether it existed.
    pub async fn close(&self, id: &TransactionId) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.close().await;
                true
            }
            None => {
                debug!("Close of unknown session {}", id);
                false
            }
        }
    }

    /// Close every session that has not been polled within `max_idle`.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let idle: Vec<TransactionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() >= max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = 0;
        for id in idle {
            if self.close(&id).await {
                info!("Reaped idle session {}", id);
                reaped += 1;
            }
        }
        reaped
    }

    /// Run [`reap_idle`](Self::reap_idle) every `interval` until `shutdown`
    /// fires.
    pub fn spawn_reaper(
        &self,
        interval: Duration,
        max_idle: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = manager.reap_idle(max_idle).await;
                        if reaped > 0 {
                            debug!("Reaper closed {} sessions, {} remain", reaped, manager.session_count());
                        }
                    }
                }
            }
            debug!("Session reaper stopped");
        })
    }

    /// Close all sessions.
    pub async fn close_all(&self) {
        let ids: Vec<TransactionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.close(&id).await;
        }
    }

    /// Get the number of active sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Check if a session exists.
    pub fn has_session(&self, id: &TransactionId) -> bool {
        self.sessions.contains_key(id)
    }
}

/// Describe the target relation and build its query.
async fn prepare(
    conn: &dyn Connection,
    request: &ViewRequest,
) -> Result<(RelationInfo, SelectQuery), SessionError> {
    let target = &request.target;
    let relation = conn
        .relation(target.object_id)
        .await
        .map_err(SessionError::from_connect)?;

    if relation.kind != target.kind.relation_kind() {
        return Err(SessionError::InvalidTarget(format!(
            "{} is a {}, not a {}",
            relation.name, relation.kind, target.kind
        )));
    }

    let query = request.build_query(&relation)?;
    Ok((relation, query))
}

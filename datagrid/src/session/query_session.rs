use db_driver::{Connection, RelationInfo, SelectQuery};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::SessionError;
use super::state::{ColumnInfo, PollStatus, QueryState, ResultSummary, RowPage, TransactionId};
use super::target::Target;

/// QuerySession 管理一次数据查看的完整生命周期
///
/// 会话持有自己的数据库连接，直到后台执行结束或会话被关闭。
pub struct QuerySession {
    /// 会话 ID
    id: TransactionId,
    target: Target,
    relation: RelationInfo,
    query: SelectQuery,
    state: RwLock<QueryState>,
    /// 尚未交给后台任务的连接
    connection: Mutex<Option<Box<dyn Connection>>>,
    cancel: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Next row handed out by `fetch`
    cursor: AtomicUsize,
    last_polled: std::sync::Mutex<Instant>,
}

impl QuerySession {
    pub(crate) fn new(
        id: TransactionId,
        target: Target,
        relation: RelationInfo,
        query: SelectQuery,
        connection: Box<dyn Connection>,
    ) -> Self {
        info!("Created session {} for {} ({})", id, target, relation.name);
        Self {
            id,
            target,
            relation,
            query,
            state: RwLock::new(QueryState::Initialized),
            connection: Mutex::new(Some(connection)),
            cancel: CancellationToken::new(),
            task: std::sync::Mutex::new(None),
            cursor: AtomicUsize::new(0),
            last_polled: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub async fn state(&self) -> QueryState {
        self.state.read().await.clone()
    }

    /// Launch execution in the background and return the query text.
    ///
    /// Only valid once, from `Initialized`.
    pub async fn start(self: &Arc<Self>, batch_size: usize) -> Result<String, SessionError> {
        let mut state = self.state.write().await;
        if !matches!(*state, QueryState::Initialized) {
            return Err(SessionError::InvalidState {
                id: self.id.clone(),
                actual: state.name(),
                expected: QueryState::Initialized.name(),
            });
        }
        if self.cancel.is_cancelled() {
            return Err(SessionError::UnknownSession(self.id.clone()));
        }
        let Some(conn) = self.connection.lock().await.take() else {
            return Err(SessionError::UnknownSession(self.id.clone()));
        };

        *state = QueryState::Running;
        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            // The connection is dropped with the execution future
            let outcome = AssertUnwindSafe(Arc::clone(&session).execute(conn, batch_size))
                .catch_unwind()
                .await;
            if let Err(panic) = outcome {
                session.fail_after_panic(panic, started.elapsed()).await;
            }
        });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        drop(state);

        self.touch();
        let sql = self.query.to_string();
        info!("Started session {}: {}", self.id, sql);
        Ok(sql)
    }

    async fn execute(self: Arc<Self>, conn: Box<dyn Connection>, batch_size: usize) {
        let started = Instant::now();
        debug!("Session {} running on {} via {}", self.id, conn.database(), conn.id());

        // None when cancelled
        let outcome = {
            let mut stream = conn.query(self.query.clone(), batch_size);
            let mut rows = Vec::new();
            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break None,
                    next = stream.next() => match next {
                        Some(Ok(batch)) => rows.extend(batch),
                        Some(Err(e)) => break Some(Err(e)),
                        None => break Some(Ok(rows)),
                    },
                }
            }
        };
        conn.close().await;

        let Some(outcome) = outcome else {
            debug!("Session {} cancelled after {:?}", self.id, started.elapsed());
            return;
        };

        let elapsed = started.elapsed();
        let next = match outcome {
            Ok(rows) => {
                info!("Session {} fetched {} rows in {:?}", self.id, rows.len(), elapsed);
                QueryState::Completed(Arc::new(ResultSummary::success(
                    rows,
                    ColumnInfo::describe(&self.relation),
                    self.relation.primary_key.clone(),
                    elapsed,
                )))
            }
            Err(e) => {
                error!("Session {} failed: {}", self.id, e);
                QueryState::Failed(Arc::new(ResultSummary::failure(e.to_string(), elapsed)))
            }
        };
        *self.state.write().await = next;
    }

    /// A panicking driver still leaves the session in a terminal state.
    async fn fail_after_panic(&self, panic: Box<dyn Any + Send>, elapsed: Duration) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Session {} execution panicked: {}", self.id, message);

        let mut state = self.state.write().await;
        if matches!(*state, QueryState::Running) && !self.cancel.is_cancelled() {
            *state = QueryState::Failed(Arc::new(ResultSummary::failure(
                format!("query execution aborted: {}", message),
                elapsed,
            )));
        }
    }

    /// Current state, with every row handed out so far once completed.
    ///
    /// The first poll of a completed session covers one page; later polls
    /// include whatever `fetch` has advanced past, so `fetched_to` never
    /// moves backwards.
    pub async fn poll(&self, page_size: usize) -> PollStatus {
        self.touch();
        let state = self.state().await;
        let page = match &state {
            QueryState::Completed(summary) => {
                let len = self.cursor.load(Ordering::SeqCst).max(page_size);
                let page = summary.page(0, len);
                self.cursor.fetch_max(page.fetched_to, Ordering::SeqCst);
                Some(page)
            }
            _ => None,
        };
        PollStatus { state, page }
    }

    /// Next page of a completed result.
    pub async fn fetch(&self, page_size: usize) -> Result<RowPage, SessionError> {
        self.touch();
        let state = self.state.read().await;
        let QueryState::Completed(summary) = &*state else {
            return Err(SessionError::InvalidState {
                id: self.id.clone(),
                actual: state.name(),
                expected: "Completed",
            });
        };

        let total = summary.row_count();
        let (Ok(from) | Err(from)) =
            self.cursor
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |from| {
                    Some(from.saturating_add(page_size).min(total))
                });
        Ok(summary.page(from, page_size))
    }

    /// Cancel any running execution and release the connection.
    pub async fn close(&self) {
        self.cancel.cancel();

        // Waits for a concurrent start to publish its task
        let state = self.state.read().await.name();
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Session {} task ended abnormally: {}", self.id, e);
            }
        }
        let conn = self.connection.lock().await.take();
        if let Some(conn) = conn {
            conn.close().await;
        }
        info!("Closed session {} on {} ({})", self.id, self.target, state);
    }

    /// Time since the client last looked at this session.
    pub fn idle_for(&self) -> Duration {
        self.last_polled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn touch(&self) {
        *self.last_polled.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }
}

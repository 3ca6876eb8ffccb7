//! The long-running-command engine (spec §4.2, §5).
//!
//! Each node owns one [`Executor`]: a single-threaded task pump with a
//! bounded FIFO queue (default depth 32). Submitted commands return
//! immediately with a fresh [`CommandId`]; the executor task pops one
//! at a time, re-evaluates its `is_allowed` predicate at pop time, and
//! publishes lifecycle events on two broadcast channels standing in
//! for the `longRunningCommandStatus`/`longRunningCommandResult`
//! change-event attributes of spec §6.
//!
//! Nested LRCs are coordinated through a [`BlockingSet`]: a parent
//! command records each child's `CommandId`, a background task
//! forwards matching child result events into the set, and
//! `BlockingSet::wait` blocks until the set drains or its deadline
//! passes.

use crate::fqdn::Fqdn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use uuid::Uuid;

/// Default bounded queue depth (spec §4.2).
pub const DEFAULT_QUEUE_DEPTH: usize = 32;
/// Default timeout for configuration LRCs (spec §4.2).
pub const DEFAULT_CONFIG_TIMEOUT: Duration = Duration::from_secs(60);
/// Default timeout for on/off LRCs (spec §4.2).
pub const DEFAULT_ON_OFF_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for `Abort` to return even if children are unresponsive (spec §4.4, §5).
pub const ABORT_DEADLINE: Duration = Duration::from_secs(30);
/// Granularity at which cooperative waits must poll the cancel flag (spec §5).
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// `result_code` vocabulary from spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LrcResultCode {
    Ok,
    Started,
    Queued,
    Failed,
    Rejected,
    NotAllowed,
    Aborted,
    Unknown,
}

/// `longRunningCommandStatus` status vocabulary from spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LrcStatus {
    Staging,
    Queued,
    InProgress,
    Aborted,
    Completed,
    Failed,
    Rejected,
    NotAllowed,
}

/// Unique id assigned to a submitted command at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(String);

impl CommandId {
    fn new(node: &Fqdn, name: &str) -> Self {
        Self(format!("{node}_{name}_{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstruct a [`CommandId`] from the string a sibling
    /// `submit_tracked` call just returned. Only meaningful for the id
    /// that produced it — does not mint a new, independent command.
    pub(crate) fn existing(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry on the `longRunningCommandStatus` attribute.
#[derive(Debug, Clone)]
pub struct LrcStatusEvent {
    pub id: CommandId,
    pub status: LrcStatus,
}

/// One entry on the `longRunningCommandResult` attribute.
#[derive(Debug, Clone)]
pub struct LrcResultEvent {
    pub id: CommandId,
    pub code: LrcResultCode,
    pub message: String,
}

/// Cooperative cancellation flag checked at the suspension points
/// named in spec §5: between fan-out steps, during polling waits.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type IsAllowed = Box<dyn FnOnce() -> bool + Send>;
type CommandBody = Box<dyn FnOnce(CancelToken) -> BoxFuture<(LrcResultCode, String)> + Send>;

struct QueuedCommand {
    id: CommandId,
    name: &'static str,
    is_allowed: IsAllowed,
    body: CommandBody,
}

/// A node's single-threaded LRC task pump.
///
/// Cheap to clone: every field is an `Arc` or a channel handle, so
/// parents hand out `Executor` clones to subscribers without needing
/// a separate handle type.
#[derive(Clone)]
pub struct Executor {
    node: Fqdn,
    queue_tx: mpsc::Sender<QueuedCommand>,
    status_tx: broadcast::Sender<LrcStatusEvent>,
    result_tx: broadcast::Sender<LrcResultEvent>,
    queue_len: Arc<AtomicUsize>,
    current_cancel: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl Executor {
    pub fn new(node: Fqdn) -> Self {
        Self::with_depth(node, DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_depth(node: Fqdn, depth: usize) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(depth);
        let (status_tx, _) = broadcast::channel(256);
        let (result_tx, _) = broadcast::channel(256);
        let queue_len = Arc::new(AtomicUsize::new(0));
        let current_cancel = Arc::new(Mutex::new(None));

        spawn_loop(
            node.clone(),
            queue_rx,
            status_tx.clone(),
            result_tx.clone(),
            queue_len.clone(),
            current_cancel.clone(),
        );

        Self {
            node,
            queue_tx,
            status_tx,
            result_tx,
            queue_len,
            current_cancel,
        }
    }

    /// Submit a long-running command. Returns `(QUEUED, command_id)` on
    /// success or `(REJECTED, reason)` if the queue is full — nothing
    /// is enqueued in the rejected case (spec §4.2).
    pub fn submit<F, Fut, A>(&self, name: &'static str, is_allowed: A, body: F) -> (LrcResultCode, String)
    where
        A: FnOnce() -> bool + Send + 'static,
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = (LrcResultCode, String)> + Send + 'static,
    {
        let id = CommandId::new(&self.node, name);
        let cmd = QueuedCommand {
            id: id.clone(),
            name,
            is_allowed: Box::new(is_allowed),
            body: Box::new(move |tok| Box::pin(body(tok))),
        };
        match self.queue_tx.try_send(cmd) {
            Ok(()) => {
                self.queue_len.fetch_add(1, Ordering::SeqCst);
                let _ = self.status_tx.send(LrcStatusEvent {
                    id: id.clone(),
                    status: LrcStatus::Queued,
                });
                (LrcResultCode::Queued, id.0)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(node = %self.node, command = name, "LRC queue full, rejecting");
                (LrcResultCode::Rejected, format!("queue depth exceeded for {name}"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                (LrcResultCode::Rejected, "executor shut down".to_string())
            }
        }
    }

    /// Pre-empt the in-flight command, if any. `Abort` uses this to set
    /// the cooperative cancel flag (spec §4.2, §5).
    /// Like [`Executor::submit`] but surfaces the real [`CommandId`] on
    /// success instead of its string form, for a parent that needs to
    /// register the child with its own [`BlockingSet`] (spec §4.2
    /// nested LRCs).
    pub fn submit_tracked<F, Fut, A>(
        &self,
        name: &'static str,
        is_allowed: A,
        body: F,
    ) -> Result<CommandId, (LrcResultCode, String)>
    where
        A: FnOnce() -> bool + Send + 'static,
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = (LrcResultCode, String)> + Send + 'static,
    {
        match self.submit(name, is_allowed, body) {
            (LrcResultCode::Queued, id) => Ok(CommandId::existing(id)),
            (code, message) => Err((code, message)),
        }
    }

    /// Submit `Abort`'s own body. Unlike [`Executor::submit`], this
    /// bypasses the bounded queue entirely and starts running on its
    /// own task immediately — spec §4.2 requires `Abort` to be
    /// privileged, pre-empting whatever is in flight rather than
    /// waiting behind queued commands, and spec §5 requires it to
    /// return within its deadline even with a full queue. It therefore
    /// can never be rejected for queue depth.
    pub fn submit_abort<F, Fut>(&self, name: &'static str, body: F) -> CommandId
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = (LrcResultCode, String)> + Send + 'static,
    {
        let id = CommandId::new(&self.node, name);
        let node = self.node.clone();
        let status_tx = self.status_tx.clone();
        let result_tx = self.result_tx.clone();
        let cmd_id = id.clone();
        tokio::spawn(async move {
            tracing::info!(node = %node, command = name, %cmd_id, "privileged command in progress");
            let _ = status_tx.send(LrcStatusEvent {
                id: cmd_id.clone(),
                status: LrcStatus::InProgress,
            });

            let cancel_flag = Arc::new(AtomicBool::new(false));
            let (code, message) = body(CancelToken(cancel_flag)).await;

            let status = result_status(code);
            tracing::info!(node = %node, command = name, %cmd_id, ?status, "privileged command finished");
            let _ = status_tx.send(LrcStatusEvent {
                id: cmd_id.clone(),
                status,
            });
            let _ = result_tx.send(LrcResultEvent { id: cmd_id, code, message });
        });
        id
    }

    pub fn request_abort(&self) -> bool {
        if let Some(flag) = self.current_cancel.lock().as_ref() {
            flag.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<LrcStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_result(&self) -> broadcast::Receiver<LrcResultEvent> {
        self.result_tx.subscribe()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_len.load(Ordering::SeqCst)
    }
}

fn result_status(code: LrcResultCode) -> LrcStatus {
    match code {
        LrcResultCode::Ok | LrcResultCode::Started => LrcStatus::Completed,
        LrcResultCode::Aborted => LrcStatus::Aborted,
        LrcResultCode::Rejected => LrcStatus::Rejected,
        LrcResultCode::NotAllowed => LrcStatus::NotAllowed,
        LrcResultCode::Failed | LrcResultCode::Unknown => LrcStatus::Failed,
    }
}

fn spawn_loop(
    node: Fqdn,
    mut queue_rx: mpsc::Receiver<QueuedCommand>,
    status_tx: broadcast::Sender<LrcStatusEvent>,
    result_tx: broadcast::Sender<LrcResultEvent>,
    queue_len: Arc<AtomicUsize>,
    current_cancel: Arc<Mutex<Option<Arc<AtomicBool>>>>,
) {
    tokio::spawn(async move {
        while let Some(cmd) = queue_rx.recv().await {
            queue_len.fetch_sub(1, Ordering::SeqCst);
            let QueuedCommand {
                id,
                name,
                is_allowed,
                body,
            } = cmd;

            if !is_allowed() {
                tracing::info!(node = %node, command = name, %id, "command not allowed at pop time");
                let _ = status_tx.send(LrcStatusEvent {
                    id: id.clone(),
                    status: LrcStatus::NotAllowed,
                });
                let _ = result_tx.send(LrcResultEvent {
                    id,
                    code: LrcResultCode::NotAllowed,
                    message: format!("{name} not allowed from current state"),
                });
                continue;
            }

            tracing::info!(node = %node, command = name, %id, "command in progress");
            let _ = status_tx.send(LrcStatusEvent {
                id: id.clone(),
                status: LrcStatus::InProgress,
            });

            let cancel_flag = Arc::new(AtomicBool::new(false));
            *current_cancel.lock() = Some(cancel_flag.clone());
            let (code, message) = body(CancelToken(cancel_flag)).await;
            *current_cancel.lock() = None;

            let status = result_status(code);
            tracing::info!(node = %node, command = name, %id, ?status, "command finished");
            let _ = status_tx.send(LrcStatusEvent {
                id: id.clone(),
                status,
            });
            let _ = result_tx.send(LrcResultEvent { id, code, message });
        }
    });
}

/// The set of in-flight child command ids a parent command is
/// awaiting (spec §4.2 "blocking set").
pub struct BlockingSet {
    pending: Mutex<HashMap<CommandId, Option<LrcResultEvent>>>,
    notify: Notify,
}

impl BlockingSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        })
    }

    pub fn insert(&self, id: CommandId) {
        self.pending.lock().insert(id, None);
    }

    pub fn complete(&self, event: LrcResultEvent) {
        let mut pending = self.pending.lock();
        if let Some(slot) = pending.get_mut(&event.id) {
            *slot = Some(event);
            drop(pending);
            self.notify.notify_waiters();
        }
    }

    /// Subscribe this set to a child's result broadcast channel: any
    /// event whose id is in the set is recorded and wakes waiters.
    pub fn track(self: &Arc<Self>, mut child_results: broadcast::Receiver<LrcResultEvent>) {
        let set = self.clone();
        tokio::spawn(async move {
            loop {
                match child_results.recv().await {
                    Ok(event) => set.complete(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Block until the set drains or `timeout` elapses. On success,
    /// returns every child's result event; on timeout, returns the
    /// ids still pending (spec §4.2 — the error message enumerates
    /// them).
    pub async fn wait(&self, timeout: Duration) -> Result<Vec<LrcResultEvent>, Vec<CommandId>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let pending = self.pending.lock();
                if pending.values().all(Option::is_some) {
                    return Ok(pending.values().cloned().map(Option::unwrap).collect());
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                let still_pending = self
                    .pending
                    .lock()
                    .iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(k, _)| k.clone())
                    .collect();
                return Err(still_pending);
            }
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn node() -> Fqdn {
        Fqdn::from("mid_csp_cbf/test/001")
    }

    #[tokio::test]
    async fn submit_runs_body_and_publishes_result() {
        let exec = Executor::new(node());
        let mut results = exec.subscribe_result();
        let (code, id) = exec.submit(
            "Noop",
            || true,
            |_cancel| async move { (LrcResultCode::Ok, "done".to_string()) },
        );
        assert_eq!(code, LrcResultCode::Queued);

        let event = tokio::time::timeout(StdDuration::from_secs(1), results.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.id.as_str(), id);
        assert_eq!(event.code, LrcResultCode::Ok);
    }

    #[tokio::test]
    async fn is_allowed_rechecked_at_pop_time() {
        let exec = Executor::new(node());
        let mut results = exec.subscribe_result();
        let allow = Arc::new(AtomicBool::new(false));
        let allow2 = allow.clone();
        exec.submit(
            "Gated",
            move || allow2.load(Ordering::SeqCst),
            |_| async move { (LrcResultCode::Ok, String::new()) },
        );
        let event = results.recv().await.unwrap();
        assert_eq!(event.code, LrcResultCode::NotAllowed);
    }

    #[tokio::test]
    async fn queue_full_rejects_and_does_not_enqueue() {
        let exec = Executor::with_depth(node(), 1);
        // First command blocks forever so the queue stays occupied.
        let gate = Arc::new(Notify::new());
        let gate2 = gate.clone();
        exec.submit("Hang", || true, move |_| {
            let gate = gate2.clone();
            Box::pin(async move {
                gate.notified().await;
                (LrcResultCode::Ok, String::new())
            })
        });
        // give the executor a moment to pop the first command into flight
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        exec.submit("Filler", || true, |_| async move { (LrcResultCode::Ok, String::new()) });
        let (code, reason) = exec.submit("Overflow", || true, |_| async move {
            (LrcResultCode::Ok, String::new())
        });
        assert_eq!(code, LrcResultCode::Rejected);
        assert!(reason.contains("queue depth"));
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn abort_bypasses_full_queue() {
        let exec = Executor::with_depth(node(), 1);
        // Fill the queue exactly like `queue_full_rejects_and_does_not_enqueue`:
        // one command in flight forever, one sitting in the single queue slot.
        let gate = Arc::new(Notify::new());
        let gate2 = gate.clone();
        exec.submit("Hang", || true, move |_| {
            let gate = gate2.clone();
            Box::pin(async move {
                gate.notified().await;
                (LrcResultCode::Ok, String::new())
            })
        });
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        exec.submit("Filler", || true, move |_| {
            let gate = gate.clone();
            Box::pin(async move {
                gate.notified().await;
                (LrcResultCode::Ok, String::new())
            })
        });

        let mut results = exec.subscribe_result();
        let id = exec.submit_abort("Abort", |_cancel| async move {
            (LrcResultCode::Ok, "aborted".to_string())
        });

        let event = tokio::time::timeout(StdDuration::from_secs(1), results.recv())
            .await
            .expect("Abort must complete promptly even with a full queue")
            .unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.code, LrcResultCode::Ok);
        gate.notify_waiters();
    }

    #[tokio::test]
    async fn blocking_set_drains_on_child_events() {
        let set = BlockingSet::new();
        let id_a = CommandId::new(&node(), "child_a");
        let id_b = CommandId::new(&node(), "child_b");
        set.insert(id_a.clone());
        set.insert(id_b.clone());

        let set2 = set.clone();
        let ida2 = id_a.clone();
        let idb2 = id_b.clone();
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            set2.complete(LrcResultEvent {
                id: ida2,
                code: LrcResultCode::Ok,
                message: String::new(),
            });
            set2.complete(LrcResultEvent {
                id: idb2,
                code: LrcResultCode::Ok,
                message: String::new(),
            });
        });

        let results = set.wait(StdDuration::from_secs(1)).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn blocking_set_times_out_with_pending_ids() {
        let set = BlockingSet::new();
        let id = CommandId::new(&node(), "never_completes");
        set.insert(id.clone());
        let err = set.wait(StdDuration::from_millis(30)).await.unwrap_err();
        assert_eq!(err, vec![id]);
    }
}

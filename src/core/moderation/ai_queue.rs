// AI moderation queue - keeps slow judgment calls off the ingestion path.
//
// One worker drains an unbounded FIFO, so verdicts come out in the order the
// pipeline deferred the messages no matter how long each call takes.
// Shutdown is a sentinel on the same channel: everything enqueued before it is
// still judged, then the worker exits.

use super::moderation_models::{AiTask, Violation, ViolationType};
use super::violation_handler::ViolationHandler;
use crate::core::ai::AiJudge;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long the worker waits for work before checking in again.
pub const IDLE_WAIT: Duration = Duration::from_secs(30);

enum QueueItem {
    Task(AiTask),
    Shutdown,
}

pub struct AiModerationQueue {
    sender: mpsc::UnboundedSender<QueueItem>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AiModerationQueue {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn start(judge: Arc<dyn AiJudge>, handler: Arc<ViolationHandler>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = AiWorker {
            judge,
            handler,
            pending: Arc::clone(&pending),
        };
        let handle = tokio::spawn(worker.run(receiver));
        tracing::info!("AI moderation worker started");

        Self {
            sender,
            pending,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Append a task. Returns `false` once the worker has stopped.
    pub fn enqueue(&self, task: AiTask) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(QueueItem::Task(task)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("AI queue is shut down, task dropped");
            return false;
        }
        true
    }

    /// Tasks enqueued but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Ask the worker to stop after the tasks already queued.
    pub fn shutdown(&self) {
        if self.sender.send(QueueItem::Shutdown).is_err() {
            tracing::debug!("AI worker already stopped");
        }
    }

    /// Wait for the worker to exit. Only the first caller waits.
    pub async fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("AI worker panicked: {}", e);
            }
        }
    }
}

struct AiWorker {
    judge: Arc<dyn AiJudge>,
    handler: Arc<ViolationHandler>,
    pending: Arc<AtomicUsize>,
}

impl AiWorker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<QueueItem>) {
        loop {
            match tokio::time::timeout(IDLE_WAIT, receiver.recv()).await {
                Err(_) => {
                    tracing::trace!("AI queue idle");
                }
                Ok(None) | Ok(Some(QueueItem::Shutdown)) => break,
                Ok(Some(QueueItem::Task(task))) => {
                    self.process(task).await;
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        tracing::info!("AI moderation worker stopped");
    }

    async fn process(&self, task: AiTask) {
        let started = Instant::now();
        let result = self.judge.judge(&task.formatted_text()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let queued_ms = (chrono::Utc::now() - task.enqueued_at).num_milliseconds();

        match result {
            Ok(true) => {
                self.handler
                    .handle(
                        task.user_id,
                        task.group_id,
                        task.message_id,
                        Violation::new(ViolationType::Ai, "AI judged the message as a violation"),
                    )
                    .await;
            }
            Ok(false) => {
                tracing::info!(
                    target: "audit",
                    user_id = task.user_id,
                    username = %task.username,
                    group_id = task.group_id,
                    message_id = task.message_id,
                    elapsed_ms,
                    queued_ms,
                    "AI pass"
                );
            }
            Err(e) => {
                // Fail open: the message stays up.
                tracing::warn!(
                    target: "audit",
                    user_id = task.user_id,
                    group_id = task.group_id,
                    message_id = task.message_id,
                    elapsed_ms,
                    error = %e,
                    "AI judgment failed, message passed"
                );
            }
        }
    }
}

//! Fetch worker pool
//!
//! A fixed number of tokio tasks share the frontier. Each loop checks the
//! stop signal, leases an entry and hands it to the [`CrawlContext`] in a task
//! of its own, so a panic while processing one URL costs that URL an attempt
//! and leaves the worker running. When no host is eligible the worker sleeps
//! for the frontier's wait hint plus jitter, waking early on new work or on
//! stop.

use crate::crawler::coordinator::CrawlContext;
use crate::crawler::frontier::Dequeue;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Shortest sleep between two polls of the frontier
const MIN_IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Running worker tasks
pub struct WorkerPool {
    tasks: JoinSet<()>,
}

impl WorkerPool {
    /// Starts `size` workers (at least one)
    ///
    /// # Arguments
    ///
    /// * `size` - Number of worker tasks
    /// * `ctx` - Shared crawl state the workers process leases against
    /// * `stop` - Stop signal; workers exit once it turns `true`
    pub fn spawn(size: usize, ctx: Arc<CrawlContext>, stop: watch::Receiver<bool>) -> Self {
        let mut tasks = JoinSet::new();
        for id in 0..size.max(1) {
            tasks.spawn(worker_loop(id, ctx.clone(), stop.clone()));
        }
        Self { tasks }
    }

    /// Waits for every worker to exit
    pub async fn join(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }
    }
}

async fn worker_loop(id: usize, ctx: Arc<CrawlContext>, mut stop: watch::Receiver<bool>) {
    debug!("Worker {} started", id);

    loop {
        if *stop.borrow() {
            break;
        }

        let wait = match ctx.frontier().dequeue() {
            Dequeue::Leased(lease) => {
                // A panic unwinds only the lease task; its lease is requeued on drop
                let task_ctx = ctx.clone();
                match tokio::spawn(async move { task_ctx.process(lease).await }).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) if e.is_fatal() => {
                        ctx.escalate(e);
                        break;
                    }
                    Ok(Err(e)) => warn!("Worker {}: {}", id, e),
                    Err(e) if e.is_panic() => {
                        error!("Worker {}: lease task panicked: {}", id, e);
                        ctx.record_lease_panic();
                    }
                    Err(e) => warn!("Worker {}: lease task cancelled: {}", id, e),
                }
                continue;
            }
            Dequeue::Wait(hint) => hint,
            Dequeue::Exhausted if ctx.keeps_running() => ctx.idle_backoff(),
            Dequeue::Exhausted => break,
        };

        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ctx.frontier().notified() => {}
            _ = tokio::time::sleep(jittered(wait)) => {}
        }
    }

    debug!("Worker {} stopped", id);
}

/// `wait` plus up to a quarter of it at random, so idle workers spread out
fn jittered(wait: Duration) -> Duration {
    let wait = wait.max(MIN_IDLE_SLEEP);
    let spread = (wait.as_millis() as u64 / 4).max(1);
    wait + Duration::from_millis(rand::rng().random_range(0..=spread))
}

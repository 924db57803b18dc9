use flume::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::sink::ActivitySink;
use super::types::ActivityLog;
use crate::config::ActivityLogConfig;

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Queue capacity (max logs in memory before dropping)
    pub queue_capacity: usize,

    /// Max records handed to the sink at once
    pub batch_size: usize,

    /// Max wait time before flushing a partial batch (milliseconds)
    pub batch_timeout_ms: u64,

    /// Number of worker tasks draining the queue
    pub worker_count: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1000,
            worker_count: 2,
        }
    }
}

impl From<&ActivityLogConfig> for LoggerConfig {
    fn from(cfg: &ActivityLogConfig) -> Self {
        Self {
            queue_capacity: cfg.queue_capacity.max(1),
            batch_size: cfg.batch_size.max(1),
            batch_timeout_ms: cfg.batch_timeout_ms,
            worker_count: cfg.worker_count.max(1),
        }
    }
}

/// Async activity logger with queue mechanism
#[derive(Clone)]
pub struct ActivityLogger {
    sender: Sender<ActivityLog>,
}

impl ActivityLogger {
    /// Initialize logger with background workers. Must be called inside a tokio runtime.
    pub fn new(sink: Arc<dyn ActivitySink>, config: LoggerConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);

        info!(
            "Initializing ActivityLogger: queue={}, batch={}, timeout={}ms, workers={}",
            config.queue_capacity, config.batch_size, config.batch_timeout_ms, config.worker_count
        );

        for worker_id in 0..config.worker_count {
            let sink = sink.clone();
            let receiver = receiver.clone();
            let config = config.clone();

            tokio::spawn(async move {
                Self::worker_loop(worker_id, sink, receiver, config).await;
            });
        }

        Self { sender }
    }

    /// Log activity (non-blocking, fire-and-forget)
    pub fn log(&self, activity: ActivityLog) {
        if let Err(e) = self.sender.try_send(activity) {
            warn!("Failed to enqueue activity log (queue full?): {}", e);
        }
    }

    async fn worker_loop(
        worker_id: usize,
        sink: Arc<dyn ActivitySink>,
        receiver: Receiver<ActivityLog>,
        config: LoggerConfig,
    ) {
        debug!("Activity worker {} started", worker_id);

        let mut batch: Vec<ActivityLog> = Vec::with_capacity(config.batch_size);
        let batch_timeout = Duration::from_millis(config.batch_timeout_ms);

        loop {
            // Block for the first record, then fill until size or deadline.
            match receiver.recv_async().await {
                Ok(log) => batch.push(log),
                Err(_) => {
                    debug!("Activity worker {} shutting down (channel closed)", worker_id);
                    return;
                }
            }

            let deadline = tokio::time::Instant::now() + batch_timeout;
            let mut closed = false;
            while batch.len() < config.batch_size {
                match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                    Ok(Ok(log)) => batch.push(log),
                    Ok(Err(_)) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            Self::flush_batch(sink.as_ref(), &batch, worker_id).await;
            batch.clear();

            if closed {
                debug!("Activity worker {} shutting down (channel closed)", worker_id);
                return;
            }
        }
    }

    async fn flush_batch(sink: &dyn ActivitySink, batch: &[ActivityLog], worker_id: usize) {
        let start = std::time::Instant::now();

        match sink.write_batch(batch).await {
            Ok(written) => {
                debug!(
                    "Activity worker {} wrote {} logs in {:?}",
                    worker_id,
                    written,
                    start.elapsed()
                );
            }
            Err(e) => {
                error!("Activity worker {} failed to write batch: {:#}", worker_id, e);
            }
        }
    }

    /// Get queue statistics (for monitoring)
    pub fn queue_len(&self) -> usize {
        self.sender.len()
    }
}

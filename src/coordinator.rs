//! Flush scheduling and failure attribution for captured console output
//!
//! [`LifecycleCoordinator`] decides *when* buffered console output is flushed
//! to the reporting sink and attributes each flush to the correct test case.
//! A single worker thread consumes a command channel; periodic flushes come
//! from the channel's receive timeout, forced flushes from interruption
//! messages. Because one consumer handles both, timer flushes and forced
//! flushes can never interleave, and a forced flush always completes before
//! the interruption payload that triggered it is forwarded.

use crate::capture::CaptureBuffer;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::model::{CaseId, LogLevel, RunId};
use crate::sink::ReportingSink;
use chrono::Utc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// A notable event that forces captured output out ahead of its payload.
#[derive(Debug)]
pub enum Interruption {
    /// A failure was recorded; the description follows the flushed logs as
    /// an error-level entry.
    Failure(String),
    /// A screenshot was taken; the PNG bytes follow the flushed logs.
    Screenshot(Vec<u8>),
    /// An artifact was attached manually.
    Artifact { name: String, bytes: Vec<u8> },
    /// A log message emitted deliberately by test code at a chosen level.
    Log { level: LogLevel, message: String },
    /// Flush-only interruption with no payload.
    Manual,
}

enum Command {
    CaseStarted(String),
    Interrupt(Interruption, SyncSender<()>),
    CaseFinished(SyncSender<()>),
    Shutdown,
}

/// Owns the flush worker for one process-wide capture pipeline.
pub struct LifecycleCoordinator {
    tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl LifecycleCoordinator {
    /// Spawns the flush worker.
    pub fn start(
        buffer: CaptureBuffer,
        sink: Arc<dyn ReportingSink>,
        context: Arc<Mutex<RunContext>>,
        flush_interval: Duration,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("log-flush".to_string())
            .spawn(move || {
                FlushWorker {
                    buffer,
                    sink,
                    context,
                    capturing: None,
                }
                .run(rx, flush_interval)
            })?;

        Ok(LifecycleCoordinator {
            tx,
            worker: Some(worker),
        })
    }

    /// Enters the `Capturing` state for a case, resetting the name used for
    /// flush attribution.
    pub fn case_started(&self, name: &str) -> Result<()> {
        self.send(Command::CaseStarted(name.to_string()))
    }

    /// Forces a flush of everything captured so far, then forwards the
    /// interruption payload. Returns once both have been processed, so the
    /// caller can rely on log lines preceding the payload on the remote
    /// timeline.
    pub fn interrupt(&self, interruption: Interruption) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.send(Command::Interrupt(interruption, ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| Error::WorkerGone("flush worker dropped the ack".to_string()))
    }

    /// Exits the `Capturing` state: performs the final flush and waits for
    /// the capture-finished completion signal before returning.
    pub fn case_finished(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.send(Command::CaseFinished(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| Error::WorkerGone("flush worker dropped the ack".to_string()))
    }

    /// Stops the worker. Pending buffered output is left for the next
    /// coordinator; teardown does not flush.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(Command::Shutdown);
            let _ = worker.join();
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::WorkerGone("flush worker is not running".to_string()))
    }
}

impl Drop for LifecycleCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct FlushWorker {
    buffer: CaptureBuffer,
    sink: Arc<dyn ReportingSink>,
    context: Arc<Mutex<RunContext>>,
    capturing: Option<String>,
}

impl FlushWorker {
    fn run(mut self, rx: Receiver<Command>, flush_interval: Duration) {
        loop {
            match rx.recv_timeout(flush_interval) {
                Ok(Command::CaseStarted(name)) => {
                    self.capturing = Some(name);
                }
                Ok(Command::Interrupt(interruption, ack)) => {
                    self.flush();
                    self.forward(interruption);
                    let _ = ack.send(());
                }
                Ok(Command::CaseFinished(ack)) => {
                    self.flush();
                    self.capturing = None;
                    let _ = ack.send(());
                }
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if self.capturing.is_some() {
                        self.flush();
                    }
                }
            }
        }
    }

    /// Resolves the attribution target for the current case, if any.
    fn resolve(&self) -> Option<(RunId, CaseId)> {
        let name = self.capturing.as_deref()?;
        let context = self.context.lock().unwrap_or_else(|e| e.into_inner());
        let run_id = context.run_id()?;
        let case_id = context.case_id(name)?;
        Some((run_id, case_id))
    }

    /// Drains the buffer and forwards the contents as an info-level batch.
    /// Empty drains produce no side effects; delivery is best-effort.
    fn flush(&self) {
        let text = self.buffer.drain();
        if text.is_empty() {
            return;
        }
        let Some((run_id, case_id)) = self.resolve() else {
            debug!("Dropping captured output with no attributable test case");
            return;
        };
        let lines: Vec<String> = text
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if lines.is_empty() {
            return;
        }
        if let Err(e) = self.sink.send_logs(
            run_id,
            case_id,
            LogLevel::Info,
            Utc::now().timestamp_millis(),
            &lines,
        ) {
            warn!("Dropping captured log batch: {}", e);
        }
    }

    fn forward(&self, interruption: Interruption) {
        let Some((run_id, case_id)) = self.resolve() else {
            debug!("Dropping interruption payload with no attributable test case");
            return;
        };
        let result = match interruption {
            Interruption::Failure(description) => self.sink.send_logs(
                run_id,
                case_id,
                LogLevel::Error,
                Utc::now().timestamp_millis(),
                &[description],
            ),
            Interruption::Log { level, message } => self.sink.send_logs(
                run_id,
                case_id,
                level,
                Utc::now().timestamp_millis(),
                &[message],
            ),
            Interruption::Screenshot(bytes) => self.sink.send_screenshot(run_id, case_id, &bytes),
            Interruption::Artifact { name, bytes } => {
                self.sink.send_case_artifact(run_id, case_id, &name, &bytes)
            }
            Interruption::Manual => Ok(()),
        };
        if let Err(e) = result {
            warn!("Dropping interruption payload: {}", e);
        }
    }
}

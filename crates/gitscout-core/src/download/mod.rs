//! Download service with a bounded worker pool.
//!
//! A fixed number of workers pull tasks from a shared FIFO queue, stream each
//! response body to a `.part` temp file, and atomically rename it into place.
//! Task state transitions queued → in-flight → terminal exactly once; the
//! terminal flags are written under the same lock the status readers take.
//!
//! Shutdown is cooperative: a [`StopSignal`] stops workers from pulling new
//! tasks, in-flight transfers run to completion, and the pool joins with a
//! bounded wait.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::cancel::StopSignal;
use crate::config::DownloadConfig;
use crate::error::{GitScoutError, Result};
use crate::network::HttpClient;

/// Progress information for one download.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub task_id: String,
    /// Bytes written so far.
    pub bytes_downloaded: u64,
    /// Total bytes, when the server declared a length.
    pub total_bytes: Option<u64>,
    /// Average speed in bytes per second.
    pub speed_bytes_per_sec: f64,
    /// Percentage complete (0-100), when the total is known.
    pub percent: Option<f64>,
    /// Estimated seconds remaining, when the total and speed allow one.
    pub eta_seconds: Option<f64>,
}

impl DownloadProgress {
    fn new(task_id: &str, bytes_downloaded: u64, total_bytes: Option<u64>, speed: f64) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f64 / total as f64) * 100.0
            } else {
                0.0
            }
        });
        let eta_seconds = total_bytes.and_then(|total| {
            if speed > 0.0 && bytes_downloaded < total {
                Some((total - bytes_downloaded) as f64 / speed)
            } else {
                None
            }
        });
        Self {
            task_id: task_id.to_string(),
            bytes_downloaded,
            total_bytes,
            speed_bytes_per_sec: speed,
            percent,
            eta_seconds,
        }
    }
}

/// Invoked once when a task reaches its terminal state: task id, success
/// flag, error message if any.
pub type CompletionCallback = Arc<dyn Fn(&str, bool, Option<&str>) + Send + Sync>;

/// A queued download.
struct DownloadTask {
    url: String,
    destination: PathBuf,
    description: String,
    completed: bool,
    success: bool,
    error: Option<String>,
    callback: Option<CompletionCallback>,
}

/// Snapshot of a task's state for callers.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub completed: bool,
    pub success: bool,
    pub error: Option<String>,
    pub description: String,
}

/// Queue entry handed to workers.
struct QueuedJob {
    task_id: String,
    url: String,
    destination: PathBuf,
}

/// Bounded-concurrency download service.
pub struct DownloadService {
    http: Arc<HttpClient>,
    tasks: Arc<RwLock<HashMap<String, DownloadTask>>>,
    /// Queue sender; taken on shutdown so blocked workers wake up with a
    /// closed channel.
    queue_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
    workers: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    stop: StopSignal,
    next_task_id: AtomicU64,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
}

impl DownloadService {
    /// Start a service with `worker_count` workers pulling from the queue.
    pub fn new(http: Arc<HttpClient>, worker_count: usize) -> Arc<Self> {
        Self::build(http, worker_count, None)
    }

    /// Start a service that reports progress through the given channel.
    pub fn with_progress(
        http: Arc<HttpClient>,
        worker_count: usize,
        progress_tx: mpsc::Sender<DownloadProgress>,
    ) -> Arc<Self> {
        Self::build(http, worker_count, Some(progress_tx))
    }

    fn build(
        http: Arc<HttpClient>,
        worker_count: usize,
        progress_tx: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let service = Arc::new(Self {
            http,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            queue_tx: std::sync::Mutex::new(Some(queue_tx)),
            workers: std::sync::Mutex::new(Vec::new()),
            stop: StopSignal::new(),
            next_task_id: AtomicU64::new(1),
            progress_tx,
        });

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let worker_count = worker_count.max(1);
        let handles: Vec<_> = (0..worker_count)
            .map(|worker| {
                let service = Arc::clone(&service);
                let queue_rx = Arc::clone(&queue_rx);
                tokio::spawn(async move {
                    service.worker_loop(worker, queue_rx).await;
                })
            })
            .collect();
        *service.workers.lock().expect("worker list lock poisoned") = handles;

        service
    }

    /// Queue a file for download. Returns the task id for status polling.
    pub fn enqueue(
        &self,
        url: &str,
        destination: &Path,
        description: Option<&str>,
    ) -> Result<String> {
        self.enqueue_with_callback(url, destination, description, None)
    }

    /// Queue a file for download with a completion callback, invoked exactly
    /// once when the task reaches its terminal state.
    pub fn enqueue_with_callback(
        &self,
        url: &str,
        destination: &Path,
        description: Option<&str>,
        callback: Option<CompletionCallback>,
    ) -> Result<String> {
        if self.stop.is_triggered() {
            return Err(GitScoutError::DownloadCancelled);
        }

        let task_id = format!("task-{}", self.next_task_id.fetch_add(1, Ordering::SeqCst));
        let description = description
            .map(str::to_string)
            .or_else(|| {
                destination
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| url.to_string());

        let task = DownloadTask {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            description,
            completed: false,
            success: false,
            error: None,
            callback,
        };

        self.tasks
            .write()
            .expect("task map lock poisoned")
            .insert(task_id.clone(), task);

        let queue_tx = self.queue_tx.lock().expect("queue lock poisoned");
        queue_tx
            .as_ref()
            .ok_or(GitScoutError::DownloadCancelled)?
            .send(QueuedJob {
                task_id: task_id.clone(),
                url: url.to_string(),
                destination: destination.to_path_buf(),
            })
            .map_err(|_| GitScoutError::DownloadCancelled)?;

        Ok(task_id)
    }

    /// Queue many `(url, relative_path)` pairs under a base directory.
    pub fn enqueue_all(
        &self,
        files: &[(String, String)],
        base_dir: &Path,
    ) -> Result<Vec<String>> {
        let mut task_ids = Vec::with_capacity(files.len());
        for (url, rel_path) in files {
            if url.is_empty() || rel_path.is_empty() {
                continue;
            }
            let destination = base_dir.join(rel_path);
            task_ids.push(self.enqueue(url, &destination, None)?);
        }
        Ok(task_ids)
    }

    /// Current status of a task, or `None` for an unknown id.
    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        let tasks = self.tasks.read().expect("task map lock poisoned");
        tasks.get(task_id).map(|task| TaskStatus {
            completed: task.completed,
            success: task.success,
            error: task.error.clone(),
            description: task.description.clone(),
        })
    }

    /// Wait until every listed task is terminal, polling at a fixed interval.
    ///
    /// Returns `true` when all tasks completed successfully. A timeout makes
    /// this return `false` without cancelling anything — in-flight transfers
    /// keep running and their recorded outcomes are untouched.
    pub async fn await_all(
        &self,
        task_ids: &[String],
        timeout: Option<std::time::Duration>,
    ) -> bool {
        let started = Instant::now();

        loop {
            let all_done = {
                let tasks = self.tasks.read().expect("task map lock poisoned");
                task_ids
                    .iter()
                    .all(|id| tasks.get(id).map(|t| t.completed).unwrap_or(true))
            };
            if all_done {
                break;
            }

            if let Some(timeout) = timeout {
                if started.elapsed() > timeout {
                    debug!("await_all timed out after {:?}", started.elapsed());
                    return false;
                }
            }

            tokio::time::sleep(DownloadConfig::POLL_INTERVAL).await;
        }

        let tasks = self.tasks.read().expect("task map lock poisoned");
        task_ids
            .iter()
            .all(|id| tasks.get(id).map(|t| t.success).unwrap_or(false))
    }

    /// Signal workers to stop pulling tasks and join them.
    ///
    /// In-flight transfers finish (or time out) first; the bounded grace
    /// period keeps shutdown from hanging on a stuck stream.
    pub async fn shutdown(&self) {
        self.stop.trigger();
        // Closing the queue wakes any worker parked on an empty channel.
        self.queue_tx.lock().expect("queue lock poisoned").take();

        let handles: Vec<_> = {
            let mut workers = self.workers.lock().expect("worker list lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            if tokio::time::timeout(DownloadConfig::SHUTDOWN_GRACE, handle)
                .await
                .is_err()
            {
                warn!("Download worker did not stop within the grace period");
            }
        }
    }

    // Internal: worker side

    async fn worker_loop(&self, worker: usize, queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>) {
        debug!("Download worker {} started", worker);

        loop {
            if self.stop.is_triggered() {
                break;
            }

            // Only one worker at a time waits on the queue; the lock drops
            // before the job is processed, so transfers still overlap.
            let job = {
                let mut rx = queue_rx.lock().await;
                if self.stop.is_triggered() {
                    break;
                }
                rx.recv().await
            };

            let Some(job) = job else {
                break;
            };

            let outcome = self.process(&job).await;
            self.finish_task(&job.task_id, outcome);
        }

        debug!("Download worker {} stopped", worker);
    }

    fn finish_task(&self, task_id: &str, outcome: Result<u64>) {
        let (callback, success, error) = {
            let mut tasks = self.tasks.write().expect("task map lock poisoned");
            let Some(task) = tasks.get_mut(task_id) else {
                return;
            };
            match outcome {
                Ok(bytes) => {
                    info!(
                        "Downloaded {} bytes to {}",
                        bytes,
                        task.destination.display()
                    );
                    task.success = true;
                }
                Err(e) => {
                    error!("Error downloading {}: {}", task.url, e);
                    task.error = Some(e.to_string());
                }
            }
            task.completed = true;
            (task.callback.clone(), task.success, task.error.clone())
        };

        // Invoke the callback outside the lock so status readers never wait
        // on caller code.
        if let Some(callback) = callback {
            callback(task_id, success, error.as_deref());
        }
    }

    /// Stream one URL to its destination through a temp file.
    async fn process(&self, job: &QueuedJob) -> Result<u64> {
        if let Some(parent) = job.destination.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| GitScoutError::io_with_path(e, parent))?;
            }
        }

        let temp_path = PathBuf::from(format!(
            "{}{}",
            job.destination.display(),
            DownloadConfig::TEMP_SUFFIX
        ));

        let result = self.stream_to(&job.task_id, &job.url, &temp_path).await;

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&temp_path, &job.destination)
                    .await
                    .map_err(|e| {
                        let _ = std::fs::remove_file(&temp_path);
                        GitScoutError::io_with_path(e, &job.destination)
                    })?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn stream_to(&self, task_id: &str, url: &str, temp_path: &Path) -> Result<u64> {
        let response = self.http.get(url).await.map_err(|e| {
            GitScoutError::DownloadFailed {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        let total_bytes = response.content_length();
        let mut file = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| GitScoutError::io_with_path(e, temp_path))?;

        let mut bytes_downloaded: u64 = 0;
        let started = Instant::now();
        let mut last_report = Instant::now();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GitScoutError::DownloadFailed {
                url: url.to_string(),
                message: format!("error reading download stream: {e}"),
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| GitScoutError::io_with_path(e, temp_path))?;
            bytes_downloaded += chunk.len() as u64;

            if last_report.elapsed() >= DownloadConfig::PROGRESS_INTERVAL {
                self.report_progress(task_id, bytes_downloaded, total_bytes, started);
                last_report = Instant::now();
            }
        }

        file.flush()
            .await
            .map_err(|e| GitScoutError::io_with_path(e, temp_path))?;

        self.report_progress(task_id, bytes_downloaded, total_bytes, started);
        Ok(bytes_downloaded)
    }

    fn report_progress(
        &self,
        task_id: &str,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        started: Instant,
    ) {
        let Some(ref tx) = self.progress_tx else {
            return;
        };
        let elapsed = started.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            bytes_downloaded as f64 / elapsed
        } else {
            0.0
        };
        // Dropped when the receiver lags; progress is advisory.
        let _ = tx.try_send(DownloadProgress::new(
            task_id,
            bytes_downloaded,
            total_bytes,
            speed,
        ));
    }
}

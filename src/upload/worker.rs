//! Processing stage draining the upload queue.
//!
//! Each declaration taken off the queue is announced with `upload_started`,
//! handed to an [`UploadProcessor`], and finished with either
//! `upload_completed` or an `error` frame. All frames go to the client that
//! submitted the declaration.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use super::{UploadDeclaration, UploadError};
use crate::api::upload_error_body;
use crate::metrics;
use crate::notify::ClientNotifier;

/// Event announcing that processing of a declaration began.
pub const STARTED_EVENT: &str = "upload_started";
/// Event carrying per-file progress.
pub const PROGRESS_EVENT: &str = "upload_progress";
/// Event carrying the processor's result.
pub const COMPLETED_EVENT: &str = "upload_completed";

/// Sends progress frames for one declaration to its client.
#[derive(Clone)]
pub struct ProgressReporter {
    notifier: Arc<ClientNotifier>,
    upload_id: String,
    client_id: Option<String>,
}

impl ProgressReporter {
    /// Create a reporter for `declaration`.
    pub fn new(notifier: Arc<ClientNotifier>, declaration: &UploadDeclaration) -> Self {
        Self {
            notifier,
            upload_id: declaration.upload_id.clone(),
            client_id: declaration.client_id.clone(),
        }
    }

    /// Send an arbitrary event to the declaration's client.
    pub fn event(&self, event: &str, payload: &Value) {
        self.notifier
            .send(event, payload, self.client_id.as_deref());
    }

    /// Report `done` of `total` bytes of `path`.
    pub fn progress(&self, path: &str, done: u64, total: u64) {
        self.event(
            PROGRESS_EVENT,
            &json!({
                "upload_id": self.upload_id,
                "path": path,
                "done": done,
                "total": total,
            }),
        );
    }
}

/// Work performed on each submitted declaration.
///
/// Implementations must be thread-safe (Send + Sync) for use across tasks.
#[async_trait]
pub trait UploadProcessor: Send + Sync {
    /// Process `declaration`, reporting progress through `reporter`.
    ///
    /// The returned value becomes the `upload_completed` payload.
    async fn process(
        &self,
        declaration: &UploadDeclaration,
        reporter: &ProgressReporter,
    ) -> Result<Value, UploadError>;
}

/// Streams each declared file and computes its SHA-256 `sign`.
#[derive(Debug, Clone)]
pub struct DigestProcessor {
    chunk_size: usize,
    report_every: u64,
}

impl Default for DigestProcessor {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            report_every: 8 * 1024 * 1024,
        }
    }
}

impl DigestProcessor {
    /// Read `chunk_size` bytes at a time, report every `report_every` bytes.
    pub fn new(chunk_size: usize, report_every: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            report_every: report_every.max(1),
        }
    }
}

#[async_trait]
impl UploadProcessor for DigestProcessor {
    async fn process(
        &self,
        declaration: &UploadDeclaration,
        reporter: &ProgressReporter,
    ) -> Result<Value, UploadError> {
        let mut signed = Vec::with_capacity(declaration.files.len());
        let mut buf = vec![0u8; self.chunk_size];

        for file in &declaration.files {
            let path = declaration.file_path(file);
            let io_err = |source| UploadError::Io {
                path: path.display().to_string(),
                source,
            };
            let mut handle = tokio::fs::File::open(&path).await.map_err(io_err)?;

            let mut hasher = Sha256::new();
            let mut done: u64 = 0;
            let mut last_report: u64 = 0;
            loop {
                let n = handle.read(&mut buf).await.map_err(io_err)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                done += n as u64;
                if done - last_report >= self.report_every {
                    reporter.progress(&file.path, done, file.size);
                    last_report = done;
                }
            }
            if done != last_report || done == 0 {
                reporter.progress(&file.path, done, file.size);
            }

            signed.push(json!({
                "path": file.path,
                "size": done,
                "sign": format!("{:x}", hasher.finalize()),
            }));
        }

        Ok(json!({
            "upload_id": declaration.upload_id,
            "files": signed,
        }))
    }
}

/// Spawn the task draining `rx` until every sender is dropped.
///
/// # Panics
///
/// This function never panics.
pub fn spawn_upload_worker(
    rx: mpsc::Receiver<UploadDeclaration>,
    processor: Arc<dyn UploadProcessor>,
    notifier: Arc<ClientNotifier>,
) -> JoinHandle<()> {
    tokio::spawn(upload_stage(rx, processor, notifier))
}

async fn upload_stage(
    mut rx: mpsc::Receiver<UploadDeclaration>,
    processor: Arc<dyn UploadProcessor>,
    notifier: Arc<ClientNotifier>,
) {
    info!(target: "model_hub::upload", "upload worker started");

    while let Some(declaration) = rx.recv().await {
        let span = tracing::info_span!(
            "upload.process",
            upload_id = %declaration.upload_id,
            client_id = declaration.client_id.as_deref().unwrap_or(""),
        );
        process_one(&declaration, processor.as_ref(), &notifier)
            .instrument(span)
            .await;
    }

    info!(target: "model_hub::upload", "upload queue closed, worker exiting");
}

async fn process_one(
    declaration: &UploadDeclaration,
    processor: &dyn UploadProcessor,
    notifier: &Arc<ClientNotifier>,
) {
    let start = Instant::now();
    let reporter = ProgressReporter::new(notifier.clone(), declaration);
    let client_id = declaration.client_id.as_deref();

    metrics::inc_upload("started");
    reporter.event(
        STARTED_EVENT,
        &json!({
            "upload_id": declaration.upload_id,
            "files": declaration.files,
            "total": declaration.total_bytes(),
        }),
    );

    match processor.process(declaration, &reporter).await {
        Ok(result) => {
            metrics::inc_upload("completed");
            info!(elapsed_ms = start.elapsed().as_millis() as u64, "upload processed");
            notifier.send(COMPLETED_EVENT, &result, client_id);
        }
        Err(e) => {
            metrics::inc_upload("failed");
            error!(error = %e, "upload processing failed");
            let body = upload_error_body(&e)
                .with_data(json!({"upload_id": declaration.upload_id}));
            notifier.send_error(&body, client_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{UploadFile, UploadState};
    use std::io::Write;

    fn declaration(dir: &tempfile::TempDir, name: &str, size: u64) -> UploadDeclaration {
        UploadDeclaration {
            upload_id: "u1".into(),
            root: dir.path().to_string_lossy().into_owned(),
            files: vec![UploadFile {
                path: name.into(),
                size,
            }],
            client_id: Some("c1".into()),
            state: UploadState::Enqueued,
        }
    }

    async fn frames(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).expect("test: json"));
        }
        out
    }

    #[tokio::test]
    async fn test_digest_processor_signs_file_and_reports_progress() {
        let dir = tempfile::tempdir().expect("test: tempdir");
        let mut f = std::fs::File::create(dir.path().join("a.safetensors")).expect("test: create");
        f.write_all(b"hello world").expect("test: write");
        drop(f);

        let notifier = Arc::new(ClientNotifier::default());
        let (_, mut rx) = notifier.register("c1");
        let decl = declaration(&dir, "a.safetensors", 11);
        let reporter = ProgressReporter::new(notifier.clone(), &decl);

        let result = DigestProcessor::new(4, 4)
            .process(&decl, &reporter)
            .await
            .expect("test: process");
        assert_eq!(
            result["files"][0]["sign"],
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );

        let progress = frames(&mut rx).await;
        assert!(progress.len() >= 2, "got {} frames", progress.len());
        let last = progress.last().expect("test: last frame");
        assert_eq!(last["data"]["done"], 11);
        assert_eq!(last["data"]["total"], 11);
        assert!(progress.iter().all(|f| f["type"] == PROGRESS_EVENT));
    }

    #[tokio::test]
    async fn test_worker_reports_start_and_completion_to_submitter_only() {
        let dir = tempfile::tempdir().expect("test: tempdir");
        std::fs::write(dir.path().join("a.pt"), b"abc").expect("test: write");

        let notifier = Arc::new(ClientNotifier::default());
        let (_, mut mine) = notifier.register("c1");
        let (_, mut other) = notifier.register("c2");
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_upload_worker(rx, Arc::new(DigestProcessor::default()), notifier.clone());

        tx.send(declaration(&dir, "a.pt", 3)).await.expect("test: send");
        drop(tx);
        handle.await.expect("test: join");

        let got = frames(&mut mine).await;
        let kinds: Vec<&str> = got.iter().filter_map(|f| f["type"].as_str()).collect();
        assert_eq!(kinds, vec![STARTED_EVENT, PROGRESS_EVENT, COMPLETED_EVENT]);
        assert!(frames(&mut other).await.is_empty());
    }

    #[tokio::test]
    async fn test_worker_sends_error_frame_when_file_vanished() {
        let dir = tempfile::tempdir().expect("test: tempdir");
        let notifier = Arc::new(ClientNotifier::default());
        let (_, mut rx_frames) = notifier.register("c1");
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_upload_worker(rx, Arc::new(DigestProcessor::default()), notifier.clone());

        tx.send(declaration(&dir, "gone.safetensors", 10))
            .await
            .expect("test: send");
        drop(tx);
        handle.await.expect("test: join");

        let got = frames(&mut rx_frames).await;
        let last = got.last().expect("test: at least one frame");
        assert_eq!(last["type"], "error");
        assert_eq!(last["data"]["data"]["upload_id"], "u1");
    }
}

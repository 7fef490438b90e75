//! Declaration table and processing queue producer.

use std::path::Path;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::{UploadDeclaration, UploadError, UploadFile, UploadState};
use crate::cache::has_accepted_extension;
use crate::metrics;

/// Tracks pending declarations and feeds submitted ones to the worker.
#[derive(Debug)]
pub struct UploadCoordinator {
    pending: DashMap<String, UploadDeclaration>,
    queue: mpsc::Sender<UploadDeclaration>,
    allowed_extensions: Vec<String>,
}

impl UploadCoordinator {
    /// Create a coordinator writing to `queue`.
    pub fn new(queue: mpsc::Sender<UploadDeclaration>, allowed_extensions: Vec<String>) -> Self {
        Self {
            pending: DashMap::new(),
            queue,
            allowed_extensions,
        }
    }

    /// Create a coordinator together with its bounded queue.
    ///
    /// The receiver goes to [`spawn_upload_worker`](super::spawn_upload_worker).
    pub fn with_queue(
        capacity: usize,
        allowed_extensions: Vec<String>,
    ) -> (Self, mpsc::Receiver<UploadDeclaration>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, allowed_extensions), rx)
    }

    /// Validate a local file and store a pending declaration for it.
    ///
    /// # Errors
    ///
    /// In check order: [`UploadError::EmptyPath`], [`UploadError::NotAbsolute`],
    /// [`UploadError::NotExists`], [`UploadError::NotAFile`],
    /// [`UploadError::ExtensionNotAllowed`].
    ///
    /// # Panics
    ///
    /// This function never panics.
    #[instrument(skip(self), level = "debug")]
    pub async fn declare(&self, absolute_path: &str) -> Result<UploadDeclaration, UploadError> {
        if absolute_path.trim().is_empty() {
            return Err(UploadError::EmptyPath);
        }
        let path = Path::new(absolute_path);
        if !path.is_absolute() {
            return Err(UploadError::NotAbsolute(absolute_path.to_string()));
        }
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| UploadError::NotExists(absolute_path.to_string()))?;
        if !meta.is_file() {
            return Err(UploadError::NotAFile(absolute_path.to_string()));
        }
        if !has_accepted_extension(absolute_path, &self.allowed_extensions) {
            return Err(UploadError::ExtensionNotAllowed(absolute_path.to_string()));
        }

        let root = path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();

        let declaration = UploadDeclaration {
            upload_id: uuid::Uuid::new_v4().simple().to_string(),
            root,
            files: vec![UploadFile {
                path: name,
                size: meta.len(),
            }],
            client_id: None,
            state: UploadState::Declared,
        };
        self.pending
            .insert(declaration.upload_id.clone(), declaration.clone());
        metrics::inc_upload("declared");
        info!(upload_id = %declaration.upload_id, size = meta.len(), "upload declared");
        Ok(declaration)
    }

    /// Bind a pending declaration to `client_id` and enqueue it.
    ///
    /// The declaration is marked [`UploadState::Submitted`] in the pending
    /// table while the call waits for queue capacity. It only leaves the
    /// table once a slot is reserved, so a cancelled call or a closed queue
    /// leaves it pending and a later submit can pick it up. After a
    /// successful submit the id is gone and a repeat fails with
    /// [`UploadError::UnknownUploadId`].
    ///
    /// # Errors
    ///
    /// - [`UploadError::InvalidClientId`] if `client_id` is empty.
    /// - [`UploadError::EmptyUploadId`] if `upload_id` is empty.
    /// - [`UploadError::UnknownUploadId`] if nothing is pending under the id.
    /// - [`UploadError::QueueClosed`] if the worker is gone.
    pub async fn submit(
        &self,
        upload_id: &str,
        client_id: &str,
    ) -> Result<UploadDeclaration, UploadError> {
        if client_id.trim().is_empty() {
            return Err(UploadError::InvalidClientId);
        }
        if upload_id.trim().is_empty() {
            return Err(UploadError::EmptyUploadId);
        }
        {
            let mut pending = self
                .pending
                .get_mut(upload_id)
                .ok_or_else(|| UploadError::UnknownUploadId(upload_id.to_string()))?;
            pending.client_id = Some(client_id.to_string());
            pending.state = UploadState::Submitted;
        }
        metrics::inc_upload("submitted");
        debug!(upload_id, client_id, "upload submitted, waiting for queue room");

        let permit = self.queue.reserve().await.map_err(|_| {
            warn!(upload_id, "upload queue closed, declaration stays pending");
            UploadError::QueueClosed
        })?;
        let (_, mut declaration) = self
            .pending
            .remove(upload_id)
            .ok_or_else(|| UploadError::UnknownUploadId(upload_id.to_string()))?;

        declaration.client_id = Some(client_id.to_string());
        declaration.state = UploadState::Enqueued;
        permit.send(declaration.clone());
        metrics::inc_upload("enqueued");
        info!(upload_id, client_id, "upload enqueued");
        Ok(declaration)
    }

    /// Number of declarations waiting for a submit.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// A pending declaration by id.
    pub fn get(&self, upload_id: &str) -> Option<UploadDeclaration> {
        self.pending.get(upload_id).map(|d| d.value().clone())
    }
}

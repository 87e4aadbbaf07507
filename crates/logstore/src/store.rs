//! Principal-scoped handle over an [`ObjectStore`].
//!
//! Every mutation the aggregation engine performs (creating a temp file,
//! renaming it into place, deleting stale files) goes through a
//! [`ScopedStore`], which pairs the store client with the [`Principal`]
//! the operation runs as. This is the run-as seam: the store client handed
//! in at construction is expected to already carry that principal's
//! credentials.

use std::sync::Arc;

use diagnostics::emit;
use diagnostics::log_debug;
use futures::TryStreamExt;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::io::StreamReader;

use crate::error::Result;
use crate::principal::Principal;

#[derive(Clone)]
pub struct ScopedStore {
    store: Arc<dyn ObjectStore>,
    principal: Principal,
}

impl ScopedStore {
    pub fn new(store: Arc<dyn ObjectStore>, principal: Principal) -> Self {
        Self { store, principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    /// Begin a streaming write to `path`.
    ///
    /// The upload is buffered and multipart; nothing becomes visible at
    /// `path` until the returned writer is shut down. Creation failures
    /// (capacity, permission) surface on write or shutdown.
    pub fn create(&self, path: &Path) -> Box<dyn AsyncWrite + Send + Unpin> {
        log_debug!("create {path} as {principal}",
            path: path.as_ref(), principal: self.principal.name());
        Box::new(BufWriter::new(Arc::clone(&self.store), path.clone()))
    }

    /// Open `path` for sequential reading.
    pub async fn open(&self, path: &Path) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let result = self.store.get(path).await?;
        let stream = result.into_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    pub async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        log_debug!("rename {from} -> {to} as {principal}",
            from: from.as_ref(), to: to.as_ref(), principal: self.principal.name());
        self.store.rename(from, to).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &Path) -> Result<()> {
        log_debug!("delete {path} as {principal}",
            path: path.as_ref(), principal: self.principal.name());
        self.store.delete(path).await?;
        Ok(())
    }

    /// List the objects directly under `prefix`.
    pub async fn list(&self, prefix: &Path) -> Result<Vec<ObjectMeta>> {
        let listing = self.store.list_with_delimiter(Some(prefix)).await?;
        Ok(listing.objects)
    }

    pub async fn head(&self, path: &Path) -> Result<ObjectMeta> {
        Ok(self.store.head(path).await?)
    }
}

//! The `{entries, open}` capability over a collection of log objects.
//!
//! Aggregated per-node files live either directly in an application's log
//! directory or inside a sealed archive bundle. Readers do not care which:
//! the enumerator picks a [`StoreView`] implementation per source and the
//! query engine only ever sees entry names and byte streams.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::path::Path;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::error::Result;

/// One listable log object: its bare name, modification time, and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

#[async_trait]
pub trait StoreView: Send + Sync {
    /// List the entries visible through this view, in name order.
    async fn entries(&self) -> Result<Vec<RemoteEntry>>;

    /// Open one entry by name for sequential reading.
    async fn open(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// A view over the objects directly under one directory prefix.
pub struct DirectView {
    store: Arc<dyn ObjectStore>,
    dir: Path,
}

impl DirectView {
    pub fn new(store: Arc<dyn ObjectStore>, dir: Path) -> Self {
        Self { store, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl StoreView for DirectView {
    async fn entries(&self) -> Result<Vec<RemoteEntry>> {
        let listing = self.store.list_with_delimiter(Some(&self.dir)).await?;
        let mut out = Vec::with_capacity(listing.objects.len());
        for meta in listing.objects {
            let Some(name) = meta.location.filename() else {
                continue;
            };
            out.push(RemoteEntry {
                name: name.to_string(),
                last_modified: meta.last_modified,
                size: meta.size,
            });
        }
        Ok(out)
    }

    async fn open(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let path = self.dir.child(name);
        let result = self.store.get(&path).await?;
        let stream = result.into_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::{ObjectStore, PutPayload};
    use tokio::io::AsyncReadExt;

    async fn put(store: &dyn ObjectStore, path: &str, data: &[u8]) {
        store
            .put(&Path::from(path), PutPayload::from(data.to_vec()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn direct_view_lists_and_opens() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        put(store.as_ref(), "logs/app/node-a", b"alpha").await;
        put(store.as_ref(), "logs/app/node-b", b"beta").await;
        put(store.as_ref(), "logs/other/node-c", b"gamma").await;

        let view = DirectView::new(Arc::clone(&store), Path::from("logs/app"));
        let entries = view.entries().await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["node-a", "node-b"]);
        assert_eq!(entries[0].size, 5);

        let mut r = view.open("node-b").await.unwrap();
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"beta");
    }

    #[tokio::test]
    async fn direct_view_open_missing_entry_errors() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let view = DirectView::new(store, Path::from("logs/app"));
        assert!(view.open("absent").await.is_err());
    }
}

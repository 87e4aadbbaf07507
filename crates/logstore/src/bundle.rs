//! Sealed archive bundles.
//!
//! A bundle consolidates many small per-node log files into one immutable
//! object. Entry payloads are concatenated verbatim; a JSON index and a
//! fixed footer close the object:
//!
//! ```text
//! bundle := blob*  index  index_len:u64le  magic[8]
//! index  := JSON { "entries": [ { name, offset, len, last_modified_ms } ] }
//! magic  := "LGBNDL01"
//! ```
//!
//! Loading a [`BundleView`] touches only the footer and index; entry
//! payloads are fetched on demand with ranged reads. Entries are flat by
//! construction - a bundle never contains another bundle.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use diagnostics::emit;
use diagnostics::log_debug;
use object_store::ObjectStore;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::{Result, StoreError};
use crate::view::{RemoteEntry, StoreView};

pub const BUNDLE_MAGIC: [u8; 8] = *b"LGBNDL01";
const FOOTER_LEN: u64 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    name: String,
    offset: u64,
    len: u64,
    last_modified_ms: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BundleIndex {
    entries: Vec<IndexEntry>,
}

/// Streams many named payloads into one sealed bundle object.
///
/// Nothing is visible at the destination path until [`finish`] completes
/// the upload, so a half-written bundle can never be listed.
///
/// [`finish`]: BundleWriter::finish
pub struct BundleWriter {
    sink: BufWriter,
    path: Path,
    index: BundleIndex,
    offset: u64,
}

impl BundleWriter {
    pub fn create(store: Arc<dyn ObjectStore>, path: Path) -> Self {
        Self {
            sink: BufWriter::new(store, path.clone()),
            path,
            index: BundleIndex::default(),
            offset: 0,
        }
    }

    /// Append one entry, streaming `reader` to the end of the bundle.
    ///
    /// Returns the number of payload bytes copied.
    pub async fn append(
        &mut self,
        name: &str,
        last_modified: DateTime<Utc>,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64> {
        let copied = tokio::io::copy(reader, &mut self.sink).await?;
        self.index.entries.push(IndexEntry {
            name: name.to_string(),
            offset: self.offset,
            len: copied,
            last_modified_ms: last_modified.timestamp_millis(),
        });
        self.offset += copied;
        log_debug!("bundled {name} ({copied} bytes) into {path}",
            name: name, copied: copied, path: self.path.as_ref());
        Ok(copied)
    }

    /// Write the index and footer, then complete the upload.
    pub async fn finish(mut self) -> Result<()> {
        let index = serde_json::to_vec(&self.index)?;
        self.sink.write_all(&index).await?;
        self.sink.write_u64_le(index.len() as u64).await?;
        self.sink.write_all(&BUNDLE_MAGIC).await?;
        self.sink.shutdown().await?;
        Ok(())
    }
}

/// Read-side view of a sealed bundle: the same `{entries, open}` shape as
/// a direct directory listing.
pub struct BundleView {
    store: Arc<dyn ObjectStore>,
    path: Path,
    index: Vec<IndexEntry>,
}

impl BundleView {
    /// Open the bundle at `path`, reading only its footer and index.
    pub async fn load(store: Arc<dyn ObjectStore>, path: Path) -> Result<Self> {
        let meta = store.head(&path).await?;
        if meta.size < FOOTER_LEN {
            return Err(StoreError::bad_bundle(&path, "shorter than footer"));
        }

        let footer = store
            .get_range(&path, meta.size - FOOTER_LEN..meta.size)
            .await?;
        if footer[8..16] != BUNDLE_MAGIC {
            return Err(StoreError::bad_bundle(&path, "bad magic"));
        }
        let index_len = u64::from_le_bytes(
            footer[0..8]
                .try_into()
                .map_err(|_| StoreError::bad_bundle(&path, "short footer"))?,
        );
        if index_len > meta.size - FOOTER_LEN {
            return Err(StoreError::bad_bundle(&path, "index length exceeds object"));
        }

        let index_start = meta.size - FOOTER_LEN - index_len;
        let raw = store
            .get_range(&path, index_start..meta.size - FOOTER_LEN)
            .await?;
        let index: BundleIndex = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::bad_bundle(&path, e.to_string()))?;

        Ok(Self {
            store,
            path,
            index: index.entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn find(&self, name: &str) -> Option<&IndexEntry> {
        self.index.iter().find(|e| e.name == name)
    }
}

#[async_trait]
impl StoreView for BundleView {
    async fn entries(&self) -> Result<Vec<RemoteEntry>> {
        Ok(self
            .index
            .iter()
            .map(|e| RemoteEntry {
                name: e.name.clone(),
                last_modified: DateTime::from_timestamp_millis(e.last_modified_ms)
                    .unwrap_or_default(),
                size: e.len,
            })
            .collect())
    }

    async fn open(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let entry = self.find(name).ok_or_else(|| StoreError::EntryNotFound {
            path: self.path.to_string(),
            name: name.to_string(),
        })?;
        let bytes: Bytes = self
            .store
            .get_range(&self.path, entry.offset..entry.offset + entry.len)
            .await?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

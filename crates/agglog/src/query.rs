//! Multi-file query engine over published aggregated log files.
//!
//! Content extraction and metadata extraction share one traversal:
//! enumerate candidates lazily, open one file at a time, and walk its
//! container records applying the request's filters. Failures scanning a
//! single file are contained there - the file is logged and abandoned,
//! its stream released, and the query moves to the next candidate. Only
//! enumeration failures abort a query.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use diagnostics::emit;
use diagnostics::{log_debug, log_error};
use futures::{TryStreamExt, pin_mut};
use object_store::ObjectStore;
use object_store::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::io::StreamReader;

use crate::enumerate::{NodeFile, list_candidates};
use crate::error::{Error, Result};
use crate::format::{AclMap, FileHeader};
use crate::naming;
use crate::reader::LogFileReader;

/// What to fetch and how to filter it.
#[derive(Debug, Clone, Default)]
pub struct LogsRequest {
    pub app_id: String,
    pub app_owner: String,
    /// Restrict to files whose name contains this node's identifier.
    pub node_id: Option<String>,
    /// Restrict to exactly this container.
    pub container_id: Option<String>,
    /// Restrict to containers launched by this application attempt.
    /// Ignored when `container_id` is set.
    pub app_attempt_id: Option<String>,
    /// Log file types to emit; empty means every type.
    pub log_types: Vec<String>,
    /// Per-segment byte cap: positive takes the head, negative the tail,
    /// `None` emits everything.
    pub byte_cap: Option<i64>,
    /// With `container_id` set, keep scanning after the first file that
    /// matched instead of stopping early.
    pub match_all: bool,
}

/// Metadata for one log segment, in metadata-only query responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    pub file_type: String,
    pub length: u64,
    /// Modification time of the node file the segment came from.
    pub last_modified: DateTime<Utc>,
}

/// Metadata-mode response: container id to its segments, in file order.
pub type ContainerMetaMap = BTreeMap<String, Vec<SegmentMeta>>;

/// The separator appended after each emitted segment.
pub fn aggregated_log_suffix(file_type: &str) -> String {
    let end = format!("End of LogType:{file_type}");
    let stars = "*".repeat(end.len() + 50);
    format!("\n{end}\n{stars}\n\n")
}

pub struct LogQueryEngine {
    store: Arc<dyn ObjectStore>,
    root: Path,
    /// One-slot cache for owner/ACL peeks: repeated peeks against the
    /// same path skip the re-open.
    header_cache: Mutex<Option<(String, FileHeader)>>,
}

impl LogQueryEngine {
    pub fn new(store: Arc<dyn ObjectStore>, root: Path) -> Self {
        Self {
            store,
            root,
            header_cache: Mutex::new(None),
        }
    }

    fn container_matches(request: &LogsRequest, container_id: &str) -> bool {
        if let Some(want) = &request.container_id {
            return container_id == want;
        }
        if let Some(attempt) = &request.app_attempt_id {
            return naming::belongs_to_attempt(attempt, container_id);
        }
        true
    }

    fn type_passes(request: &LogsRequest, file_type: &str) -> bool {
        request.log_types.is_empty() || request.log_types.iter().any(|t| t == file_type)
    }

    /// Stream matching log content to `sink`.
    ///
    /// Returns whether any data was emitted; `false` is a normal "no data
    /// found" outcome, not an error.
    pub async fn read_logs<W>(&self, request: &LogsRequest, sink: &mut W) -> Result<bool>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let node_filter = request.node_id.as_deref().map(naming::node_string);
        let mut found = false;

        let stream = list_candidates(
            Arc::clone(&self.store),
            &self.root,
            &request.app_owner,
            &request.app_id,
        );
        pin_mut!(stream);
        while let Some(file) = stream.try_next().await? {
            if let Some(node) = &node_filter {
                if !file.name.contains(node.as_str()) {
                    continue;
                }
            }
            match self.scan_file_content(&file, request, sink).await {
                Ok(matched) => {
                    found |= matched;
                    if matched && request.container_id.is_some() && !request.match_all {
                        break;
                    }
                }
                Err(err) => {
                    log_error!("skipping unreadable aggregated log file {name}: {err}",
                        name: file.name.as_str(), err: err);
                }
            }
        }
        Ok(found)
    }

    async fn scan_file_content<W>(
        &self,
        file: &NodeFile,
        request: &LogsRequest,
        sink: &mut W,
    ) -> Result<bool>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let stream = file.open().await?;
        let mut reader = LogFileReader::open(stream).await?;
        let mut matched = false;

        while let Some(mut record) = reader.next_container().await? {
            if !Self::container_matches(request, record.container_id()) {
                continue;
            }
            while let Some(segment) = record.next_segment().await? {
                if Self::type_passes(request, &segment.file_type) {
                    record.copy_content(&segment, request.byte_cap, sink).await?;
                    sink.write_all(aggregated_log_suffix(&segment.file_type).as_bytes())
                        .await?;
                    matched = true;
                } else {
                    record.skip_content(&segment).await?;
                }
            }
            sink.flush().await?;
            // A specific container appears once per file; stop here.
            if request.container_id.is_some() {
                break;
            }
        }
        Ok(matched)
    }

    /// Collect per-container segment metadata without reading content.
    ///
    /// An application with no candidate files at all is
    /// [`Error::NoCandidateFiles`]; matching zero containers in existing
    /// files just returns an empty map.
    pub async fn read_logs_meta(&self, request: &LogsRequest) -> Result<ContainerMetaMap> {
        let node_filter = request.node_id.as_deref().map(naming::node_string);
        let mut out = ContainerMetaMap::new();
        let mut saw_candidate = false;

        let stream = list_candidates(
            Arc::clone(&self.store),
            &self.root,
            &request.app_owner,
            &request.app_id,
        );
        pin_mut!(stream);
        while let Some(file) = stream.try_next().await? {
            saw_candidate = true;
            if let Some(node) = &node_filter {
                if !file.name.contains(node.as_str()) {
                    continue;
                }
            }
            match self.scan_file_meta(&file, request, &mut out).await {
                Ok(matched) => {
                    if matched && request.container_id.is_some() && !request.match_all {
                        break;
                    }
                }
                Err(err) => {
                    log_error!("skipping unreadable aggregated log file {name}: {err}",
                        name: file.name.as_str(), err: err);
                }
            }
        }

        if !saw_candidate {
            return Err(Error::NoCandidateFiles {
                app_id: request.app_id.clone(),
            });
        }
        Ok(out)
    }

    async fn scan_file_meta(
        &self,
        file: &NodeFile,
        request: &LogsRequest,
        out: &mut ContainerMetaMap,
    ) -> Result<bool> {
        let stream = file.open().await?;
        let mut reader = LogFileReader::open(stream).await?;
        let mut matched = false;

        while let Some(mut record) = reader.next_container().await? {
            if !Self::container_matches(request, record.container_id()) {
                continue;
            }
            let entry = out.entry(record.container_id().to_string()).or_default();
            while let Some(segment) = record.next_segment().await? {
                entry.push(SegmentMeta {
                    file_type: segment.file_type.clone(),
                    length: segment.length,
                    last_modified: file.last_modified,
                });
                record.skip_content(&segment).await?;
            }
            matched = true;
            if request.container_id.is_some() {
                break;
            }
        }
        Ok(matched)
    }

    /// The owner recorded in the file's header.
    pub async fn application_owner(&self, path: &Path) -> Result<String> {
        Ok(self.peek_header(path).await?.owner)
    }

    /// The ACL entries recorded in the file's header.
    pub async fn application_acls(&self, path: &Path) -> Result<AclMap> {
        Ok(self.peek_header(path).await?.acls)
    }

    async fn peek_header(&self, path: &Path) -> Result<FileHeader> {
        {
            let cache = self.header_cache.lock().await;
            if let Some((cached, header)) = cache.as_ref() {
                if cached.as_str() == path.as_ref() {
                    log_debug!("header cache hit for {path}", path: path.as_ref());
                    return Ok(header.clone());
                }
            }
        }

        let result = self.store.get(path).await.map_err(logstore::StoreError::from)?;
        let stream = StreamReader::new(result.into_stream().map_err(std::io::Error::other));
        let header = LogFileReader::open(stream).await?.into_header();

        let mut cache = self.header_cache.lock().await;
        *cache = Some((path.to_string(), header.clone()));
        Ok(header)
    }
}

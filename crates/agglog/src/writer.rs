//! Write side of an aggregation cycle.
//!
//! One [`AggregationSession`] serves exactly one (node, application)
//! cycle. It streams records to a temporary object name; nothing under
//! the final name exists until [`publish`] renames the finished file into
//! place, so readers never observe a half-written cycle. A crash before
//! the rename leaves only a `.tmp` name, which enumeration ignores.
//!
//! [`publish`]: AggregationSession::publish

use std::io::Cursor;

use diagnostics::emit;
use diagnostics::{log_info, log_warn};
use logstore::ScopedStore;
use object_store::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::format::{self, AclMap, FileHeader};
use crate::{naming, retention};

/// One log file of one container, as fed to [`AggregationSession::append`].
///
/// `length` must be known up front (it is the stat size of the local log
/// file); the content is streamed, never buffered whole.
pub struct SegmentSource {
    pub file_type: String,
    pub length: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl SegmentSource {
    pub fn new(
        file_type: impl Into<String>,
        length: u64,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            file_type: file_type.into(),
            length,
            reader: Box::new(reader),
        }
    }

    pub fn from_bytes(file_type: impl Into<String>, content: Vec<u8>) -> Self {
        let length = content.len() as u64;
        Self::new(file_type, length, Cursor::new(content))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Stream open, header not yet written.
    Initialized,
    /// Header written; records may be appended.
    Writing,
    /// Stream shut down; only publish/discard remain.
    Closed,
}

pub struct AggregationSession {
    store: ScopedStore,
    tmp_path: Path,
    sink: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    state: SessionState,
}

impl AggregationSession {
    /// Open the temp object for writing and stamp the file magic.
    ///
    /// The upload is multipart and buffered; storage failures (capacity,
    /// permission) may surface here, on a later append, or at close, but
    /// always as storage errors, never as corruption.
    pub async fn initialize(store: ScopedStore, tmp_path: Path) -> Result<Self> {
        let mut sink = store.create(&tmp_path);
        format::write_magic(&mut sink).await?;
        Ok(Self {
            store,
            tmp_path,
            sink: Some(sink),
            state: SessionState::Initialized,
        })
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    fn sink_mut(&mut self) -> &mut (dyn AsyncWrite + Send + Unpin) {
        match self.sink.as_mut() {
            Some(sink) => sink.as_mut(),
            None => panic!("aggregation session already closed"),
        }
    }

    /// Write the owner/ACL header.
    ///
    /// # Panics
    ///
    /// Must be called exactly once, before any [`append`]; calling it
    /// twice or after a record is a bug in the caller, not a recoverable
    /// condition.
    ///
    /// [`append`]: AggregationSession::append
    pub async fn write_header(&mut self, owner: &str, acls: &AclMap) -> Result<()> {
        assert!(
            self.state == SessionState::Initialized,
            "header must be written exactly once, before any container record"
        );
        let header = FileHeader {
            owner: owner.to_string(),
            acls: acls.clone(),
        };
        format::write_header(self.sink_mut(), &header).await?;
        self.state = SessionState::Writing;
        Ok(())
    }

    /// Append one container record. Containers may arrive in any order;
    /// each normally appears at most once per file.
    ///
    /// # Panics
    ///
    /// Panics if the header has not been written yet or the session is
    /// closed.
    pub async fn append(&mut self, container_id: &str, segments: Vec<SegmentSource>) -> Result<()> {
        assert!(
            self.state == SessionState::Writing,
            "append requires the header to be written first"
        );
        let payload_len: u64 = segments
            .iter()
            .map(|s| format::segment_wire_len(&s.file_type, s.length))
            .sum();
        format::write_container_key(self.sink_mut(), container_id, payload_len).await?;
        for segment in segments {
            format::write_segment_header(self.sink_mut(), &segment.file_type, segment.length)
                .await?;
            let declared = segment.length;
            let mut limited = segment.reader.take(declared);
            let copied = tokio::io::copy(&mut limited, self.sink_mut()).await?;
            if copied != declared {
                return Err(Error::Io(std::io::Error::other(format!(
                    "segment source {} ended after {copied} of {declared} bytes",
                    segment.file_type
                ))));
            }
        }
        Ok(())
    }

    /// Shut the stream down, completing the upload of the temp object.
    /// Closing an already-closed session is a no-op, so finalize paths
    /// that run after an earlier failure are safe.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.shutdown().await?;
            self.state = SessionState::Closed;
        }
        Ok(())
    }

    /// Close, then atomically rename the temp object to `final_path`.
    /// The rename is the publish boundary; on failure the caller decides
    /// whether to re-run the cycle, nothing is retried here.
    pub async fn publish(mut self, final_path: &Path) -> Result<()> {
        self.close().await?;
        self.store
            .rename(&self.tmp_path, final_path)
            .await
            .map_err(|source| Error::Publish {
                src: self.tmp_path.to_string(),
                dst: final_path.to_string(),
                source,
            })?;
        log_info!("published aggregated log file {path}", path: final_path.as_ref());
        Ok(())
    }

    /// Close, then delete the temp object of a cycle that uploaded
    /// nothing.
    pub async fn discard(mut self) -> Result<()> {
        self.close().await?;
        self.store
            .delete(&self.tmp_path)
            .await
            .map_err(|source| Error::Discard {
                path: self.tmp_path.to_string(),
                source,
            })?;
        log_info!("discarded empty aggregation cycle {path}", path: self.tmp_path.as_ref());
        Ok(())
    }
}

/// Everything `finish_cycle` needs to know about the cycle being closed.
#[derive(Debug, Clone)]
pub struct CycleContext {
    /// The application's log directory.
    pub app_dir: Path,
    /// Node that produced this cycle's file.
    pub node_id: String,
    /// Upload time for this cycle, appended to rolling file names.
    pub upload_timestamp_ms: i64,
    /// Whether rolling aggregation is active for this application.
    pub rolling: bool,
    /// Whether this cycle actually wrote any container records.
    pub uploaded_in_cycle: bool,
    /// Rolling retention bound; `None` disables cleanup.
    pub retain_count: Option<usize>,
}

/// Finish one aggregation cycle: retire stale rolling files, then publish
/// the new file or discard the empty temp.
///
/// Retention runs only when this cycle uploaded and rolling aggregation
/// is on; a cycle that uploaded nothing has nothing to retire old files
/// in favor of. Retention trouble is logged and never fails the cycle.
pub async fn finish_cycle(session: AggregationSession, ctx: &CycleContext) -> Result<()> {
    if ctx.uploaded_in_cycle && ctx.rolling {
        if let Some(keep) = ctx.retain_count {
            let store = session.store.clone();
            if let Err(err) =
                retention::enforce_retention(&store, &ctx.app_dir, &ctx.node_id, keep).await
            {
                log_warn!("retention sweep failed for {node}: {err}",
                    node: ctx.node_id.as_str(), err: err);
            }
        }
    }

    if ctx.uploaded_in_cycle {
        let final_name = if ctx.rolling {
            naming::rolling_file_name(&ctx.node_id, ctx.upload_timestamp_ms)
        } else {
            naming::node_file_name(&ctx.node_id)
        };
        session.publish(&ctx.app_dir.child(final_name)).await
    } else {
        session.discard().await
    }
}

//! Enumeration of candidate per-node aggregated files.
//!
//! An application's log directory holds plain per-node files, possibly a
//! sealed `<app_id>.archive` bundle of older ones, and possibly `.tmp`
//! leftovers from in-progress or crashed cycles. Enumeration flattens
//! this into one lazy left-to-right sequence: bundle contents are spliced
//! in place of the bundle entry (bundles are flat, so this happens at
//! most one level deep), and `.tmp` names are excluded unconditionally -
//! they are unpublished by definition.
//!
//! The stream is lazy so callers hunting a single node or container can
//! stop as soon as they have what they need.

use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use logstore::{BundleView, DirectView, StoreView};
use object_store::ObjectStore;
use object_store::path::Path;
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::naming;

/// One candidate aggregated log file, wherever it physically lives.
#[derive(Clone)]
pub struct NodeFile {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub from_archive: bool,
    view: Arc<dyn StoreView>,
}

impl NodeFile {
    pub async fn open(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        Ok(self.view.open(&self.name).await?)
    }
}

impl fmt::Debug for NodeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeFile")
            .field("name", &self.name)
            .field("last_modified", &self.last_modified)
            .field("size", &self.size)
            .field("from_archive", &self.from_archive)
            .finish()
    }
}

/// Lazily enumerate the candidate files for `app_id` owned by `owner`.
///
/// Listing failures and unreadable bundles surface as errors on the
/// stream; deciding that an empty result means "nothing to report" is the
/// query layer's job.
pub fn list_candidates(
    store: Arc<dyn ObjectStore>,
    root: &Path,
    owner: &str,
    app_id: &str,
) -> impl Stream<Item = Result<NodeFile>> + Send + use<> {
    let dir = naming::app_log_dir(root, owner, app_id);
    let archive = naming::archive_name(app_id);

    try_stream! {
        let direct: Arc<dyn StoreView> = Arc::new(DirectView::new(Arc::clone(&store), dir.clone()));
        let entries = direct.entries().await?;
        for entry in entries {
            if entry.name == archive {
                let bundle: Arc<dyn StoreView> = Arc::new(
                    BundleView::load(Arc::clone(&store), dir.child(archive.as_str())).await?,
                );
                for inner in bundle.entries().await? {
                    if naming::is_tmp(&inner.name) {
                        continue;
                    }
                    yield NodeFile {
                        name: inner.name,
                        last_modified: inner.last_modified,
                        size: inner.size,
                        from_archive: true,
                        view: Arc::clone(&bundle),
                    };
                }
                continue;
            }
            if naming::is_tmp(&entry.name) {
                continue;
            }
            yield NodeFile {
                name: entry.name,
                last_modified: entry.last_modified,
                size: entry.size,
                from_archive: false,
                view: Arc::clone(&direct),
            };
        }
    }
}

//! Retention sweep for rolling aggregation.
//!
//! Each rolling cycle adds one timestamped file per node; this module
//! keeps the newest `keep_count - 1` of the already-published ones so the
//! file about to be published lands inside the retention bound. Other
//! nodes' files, non-rolling files, and in-progress `.tmp` files are
//! never touched.

use diagnostics::emit;
use diagnostics::{log_info, log_warn};
use logstore::ScopedStore;
use object_store::path::Path;

use crate::error::Result;
use crate::naming;

/// Delete this node's stale rolling files under `app_dir`, ordered by
/// their upload-timestamp suffix.
///
/// Individual deletion failures are logged and swallowed: one undeletable
/// stale file must not block retiring the others, and must never fail the
/// write cycle that triggered the sweep.
pub async fn enforce_retention(
    store: &ScopedStore,
    app_dir: &Path,
    node_id: &str,
    keep_count: usize,
) -> Result<()> {
    let prefix = format!("{}_", naming::node_string(node_id));

    let mut stale: Vec<(i64, Path)> = store
        .list(app_dir)
        .await?
        .into_iter()
        .filter_map(|meta| {
            let name = meta.location.filename()?;
            if naming::is_tmp(name) || !name.starts_with(&prefix) {
                return None;
            }
            let ts = naming::upload_timestamp(name)?;
            Some((ts, meta.location.clone()))
        })
        .collect();

    // Room for the incoming file: keep one fewer than the bound.
    let keep = keep_count.saturating_sub(1);
    if stale.len() <= keep {
        return Ok(());
    }
    stale.sort_by_key(|(ts, _)| *ts);
    let excess = stale.len() - keep;

    for (_, path) in stale.drain(..excess) {
        match store.delete(&path).await {
            Ok(()) => {
                log_info!("retired stale aggregated log file {path}", path: path.as_ref());
            }
            Err(err) => {
                log_warn!("failed to delete stale aggregated log file {path}: {err}",
                    path: path.as_ref(), err: err);
            }
        }
    }
    Ok(())
}

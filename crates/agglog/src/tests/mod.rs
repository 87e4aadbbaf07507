//! Scenario tests: full write-publish-query lifecycles over in-memory
//! and local-filesystem stores.


use std::sync::Arc;

use logstore::{Principal, ScopedStore};
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path;

use crate::format::{AccessType, AclMap};
use crate::writer::{AggregationSession, SegmentSource};
use crate::naming;

pub(crate) const ROOT: &str = "remote-logs";
pub(crate) const OWNER: &str = "svc-etl";
pub(crate) const APP: &str = "application_1700000000000_0042";

pub(crate) fn memstore() -> Arc<dyn ObjectStore> {
    Arc::new(InMemory::new())
}

pub(crate) fn test_acls() -> AclMap {
    let mut acls = AclMap::new();
    acls.insert(AccessType::View, "ops analyst".to_string());
    acls.insert(AccessType::Modify, "ops".to_string());
    acls
}

pub(crate) fn app_dir() -> Path {
    naming::app_log_dir(&Path::from(ROOT), OWNER, APP)
}

/// Write one complete per-node file through a real session and publish
/// it under `file_name` in the application's log directory.
pub(crate) async fn publish_node_file(
    store: &Arc<dyn ObjectStore>,
    file_name: &str,
    containers: &[(&str, Vec<(&str, &[u8])>)],
) {
    let scoped = ScopedStore::new(Arc::clone(store), Principal::from(OWNER));
    let dir = app_dir();
    let tmp = dir.child(naming::tmp_file_name(file_name));

    let mut session = AggregationSession::initialize(scoped, tmp).await.unwrap();
    session.write_header(OWNER, &test_acls()).await.unwrap();
    for (container_id, segments) in containers {
        let sources = segments
            .iter()
            .map(|(file_type, content)| SegmentSource::from_bytes(*file_type, content.to_vec()))
            .collect();
        session.append(container_id, sources).await.unwrap();
    }
    session.publish(&dir.child(file_name)).await.unwrap();
}

pub(crate) fn base_request() -> crate::query::LogsRequest {
    crate::query::LogsRequest {
        app_id: APP.to_string(),
        app_owner: OWNER.to_string(),
        ..crate::query::LogsRequest::default()
    }
}

pub(crate) fn engine(store: &Arc<dyn ObjectStore>) -> crate::query::LogQueryEngine {
    crate::query::LogQueryEngine::new(Arc::clone(store), Path::from(ROOT))
}

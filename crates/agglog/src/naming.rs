//! File and directory naming conventions for the shared log tier.
//!
//! These names are an interoperability surface: other tools locate, sweep,
//! and seal aggregated files purely by name, so the conventions here must
//! not drift.
//!
//! - `<root>/<owner>/logs/<app_id>/` - one directory per application
//! - `<node_string>` - a node's aggregated file (non-rolling)
//! - `<node_string>_<upload_ms>` - one rolling cycle's file
//! - `<name>.tmp` - an in-progress or abandoned cycle; never read
//! - `<app_id>.archive` - sealed bundle of many per-node files

use object_store::path::Path;

pub const TMP_FILE_SUFFIX: &str = ".tmp";
pub const ARCHIVE_SUFFIX: &str = ".archive";
pub const LOG_DIR_NAME: &str = "logs";

/// Node identifiers are `host:port`; `:` cannot appear in object names.
pub fn node_string(node_id: &str) -> String {
    node_id.replace(':', "_")
}

pub fn app_log_dir(root: &Path, owner: &str, app_id: &str) -> Path {
    root.child(owner).child(LOG_DIR_NAME).child(app_id)
}

pub fn node_file_name(node_id: &str) -> String {
    node_string(node_id)
}

pub fn rolling_file_name(node_id: &str, upload_ms: i64) -> String {
    format!("{}_{}", node_string(node_id), upload_ms)
}

pub fn tmp_file_name(final_name: &str) -> String {
    format!("{final_name}{TMP_FILE_SUFFIX}")
}

pub fn is_tmp(name: &str) -> bool {
    name.ends_with(TMP_FILE_SUFFIX)
}

pub fn archive_name(app_id: &str) -> String {
    format!("{app_id}{ARCHIVE_SUFFIX}")
}

/// The upload-timestamp suffix of a rolling file name, if it has one.
pub fn upload_timestamp(name: &str) -> Option<i64> {
    name.rsplit('_').next()?.parse().ok()
}

/// Whether `container_id` was launched by `attempt_id`.
///
/// Container ids look like `container_[e<epoch>_]<cluster_ts>_<app>_<attempt>_<seq>`
/// and attempt ids like `appattempt_<cluster_ts>_<app>_<attempt>`. The
/// attempt number is zero-padded differently in the two forms, so the
/// numeric fields are compared as numbers. Malformed ids never match.
pub fn belongs_to_attempt(attempt_id: &str, container_id: &str) -> bool {
    let Some(attempt) = attempt_id.strip_prefix("appattempt_") else {
        return false;
    };
    let attempt_parts: Vec<&str> = attempt.split('_').collect();
    if attempt_parts.len() != 3 {
        return false;
    }

    let Some(container) = container_id.strip_prefix("container_") else {
        return false;
    };
    let mut container_parts: Vec<&str> = container.split('_').collect();
    // Reservation epochs prefix the container form only.
    if container_parts.len() == 5 && container_parts[0].starts_with('e') {
        container_parts.remove(0);
    }
    if container_parts.len() != 4 {
        return false;
    }

    numeric_eq(attempt_parts[0], container_parts[0])
        && numeric_eq(attempt_parts[1], container_parts[1])
        && numeric_eq(attempt_parts[2], container_parts[2])
}

fn numeric_eq(a: &str, b: &str) -> bool {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_string_replaces_port_separator() {
        assert_eq!(node_string("worker-7.example.com:8041"), "worker-7.example.com_8041");
        assert_eq!(node_string("plainhost"), "plainhost");
    }

    #[test]
    fn app_log_dir_layout() {
        let dir = app_log_dir(&Path::from("remote-logs"), "svc-etl", "application_1700000000000_0042");
        assert_eq!(dir.as_ref(), "remote-logs/svc-etl/logs/application_1700000000000_0042");
    }

    #[test]
    fn rolling_and_tmp_names() {
        let name = rolling_file_name("host:8041", 1_700_000_123_456);
        assert_eq!(name, "host_8041_1700000123456");
        assert_eq!(upload_timestamp(&name), Some(1_700_000_123_456));
        assert!(is_tmp(&tmp_file_name(&name)));
        assert!(!is_tmp(&name));
    }

    #[test]
    fn upload_timestamp_absent_on_non_rolling_names() {
        assert_eq!(upload_timestamp("hostname"), None);
    }

    #[test]
    fn attempt_matching_ignores_zero_padding() {
        assert!(belongs_to_attempt(
            "appattempt_1700000000000_0042_000001",
            "container_1700000000000_0042_01_000003",
        ));
        assert!(belongs_to_attempt(
            "appattempt_1700000000000_0042_000002",
            "container_e17_1700000000000_0042_02_000001",
        ));
        assert!(!belongs_to_attempt(
            "appattempt_1700000000000_0042_000001",
            "container_1700000000000_0042_02_000003",
        ));
        assert!(!belongs_to_attempt(
            "appattempt_1700000000000_0042_000001",
            "container_1700000000000_0043_01_000003",
        ));
    }

    #[test]
    fn attempt_matching_rejects_malformed_ids() {
        assert!(!belongs_to_attempt("appattempt_va", "container_1_2_3_4"));
        assert!(!belongs_to_attempt("appattempt_1_2_3", "not_a_container"));
        assert!(!belongs_to_attempt("task_1_2_3", "container_1_2_3_4"));
    }
}

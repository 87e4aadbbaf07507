// Error types for aggregated log operations
use logstore::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("remote storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream framing violated mid-record. Recovered at file granularity:
    /// the multi-file scan abandons the file and moves on.
    #[error("corrupt aggregated log record: {reason}")]
    Corrupt { reason: String },

    /// The rename that makes a finished cycle visible failed. Fatal to the
    /// write cycle; never retried here.
    #[error("failed to publish {src} -> {dst}: {source}")]
    Publish {
        src: String,
        dst: String,
        #[source]
        source: StoreError,
    },

    /// Removing the temp file of a cycle that uploaded nothing failed.
    #[error("failed to remove abandoned temp file {path}: {source}")]
    Discard {
        path: String,
        #[source]
        source: StoreError,
    },

    /// Enumeration found nothing for the application. Distinct from a
    /// storage failure: there is simply nothing to report.
    #[error("no aggregated log files for application {app_id}")]
    NoCandidateFiles { app_id: String },
}

impl Error {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Error::Corrupt {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Aggregated container log storage.
//!
//! Worker containers on cluster nodes each produce a handful of log
//! files; once a cycle, every node multiplexes all of them into a single
//! self-describing archive file on the shared storage tier. This crate
//! owns that file format and its lifecycle:
//!
//! - [`format`]: the binary record codec (header, container records,
//!   length-prefixed segments),
//! - [`writer`]: one aggregation cycle's write session, with atomic
//!   publish via rename-from-temp,
//! - [`enumerate`]: lazy discovery of candidate per-node files,
//!   transparently expanding sealed archive bundles,
//! - [`query`]: content and metadata extraction across many files,
//!   skipping corrupt ones instead of failing the query,
//! - [`retention`]: the rolling-aggregation cleanup sweep,
//! - [`naming`]: the file naming conventions other tools rely on.
//!
//! Set AGGLOG_LOG (see the `diagnostics` crate) to watch it work.

pub mod enumerate;
pub mod error;
pub mod format;
pub mod naming;
pub mod query;
pub mod reader;
pub mod retention;
pub mod writer;

pub use enumerate::{NodeFile, list_candidates};
pub use error::{Error, Result};
pub use format::{AccessType, AclMap, FileHeader, SegmentHeader};
pub use query::{
    ContainerMetaMap, LogQueryEngine, LogsRequest, SegmentMeta, aggregated_log_suffix,
};
pub use reader::{ContainerRecord, LogFileReader};
pub use retention::enforce_retention;
pub use writer::{AggregationSession, CycleContext, SegmentSource, finish_cycle};

#[cfg(test)]
mod tests;

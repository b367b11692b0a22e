//! # Reconcile
//!
//! The reconciliation engine. A run loads the baseline and the fresh extract
//! as [`store::RecordStore`]s, then:
//!
//! 1. [`admission::classify`] drops block-listed venues and finds new ids,
//! 2. new records are appended after the baseline,
//! 3. [`merge::MergeEngine`] patches tracked fields of records modified since
//!    the target date,
//! 4. [`sequence::SequenceAssigner`] numbers the new records per member.
//!
//! [`pipeline::run`] wraps this with file I/O and backup rotation.
//! [`counting`] is the separate per-member application counter.

pub mod admission;
pub mod backup;
pub mod counting;
pub mod dates;
pub mod errors;
pub mod merge;
pub mod pipeline;
pub mod schema;
pub mod sequence;
pub mod settings;
pub mod store;
pub mod tabular;

pub use admission::{classify, Admission, BlockList};
pub use backup::{write_with_backup, BackupRotation, WriteReport};
pub use counting::{attach_counts, count_applications, CountColumns};
pub use dates::{DateNormalizer, DateParseError, SentinelMapping};
pub use errors::ReconcileError;
pub use merge::{MergeEngine, MergeOptions, MergeOutcome};
pub use pipeline::{reconcile, run, ReconcileStats, Reconciliation, RunSummary};
pub use schema::Schema;
pub use sequence::{SegmentFlag, SequenceAssigner, SequenceOrder};
pub use settings::{CountSettings, EngineSettings, LogSettings, ReconcileSettings, TargetDate};
pub use store::{DuplicatePolicy, RecordStore};
pub use tabular::{read_table, resolve_encoding, write_table, Table};

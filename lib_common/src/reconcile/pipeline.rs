//! # Reconciliation Pipeline
//!
//! Admission, append, merge and sequence numbering wired together, plus the
//! file-level run that loads the datasets and persists the next baseline.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::json;

use super::admission::{classify, BlockList};
use super::backup::{write_with_backup, BackupRotation, WriteReport};
use super::errors::ReconcileError;
use super::merge::MergeEngine;
use super::sequence::{SequenceAssigner, SequenceOrder};
use super::settings::{EngineSettings, ReconcileSettings};
use super::store::RecordStore;
use super::tabular::read_table;
use crate::loggers::loggerlocal::LoggerLocal;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub extract_records: usize,
    pub baseline_records: usize,
    pub blocked: usize,
    pub new_records: usize,
    pub update_candidates: usize,
    pub updated_records: usize,
    pub updated_fields: usize,
    pub unmatched_candidates: usize,
    pub invalid_dates: usize,
    pub sequences_assigned: usize,
    pub sequences_defaulted: usize,
    pub output_records: usize,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// The next baseline: old records (patched) followed by new ones.
    pub store: RecordStore,
    pub new_ids: HashSet<String>,
    pub stats: ReconcileStats,
}

/// Reconciles `extract` into `baseline`.
///
/// Every column the stages need is checked before anything is modified, so a
/// schema error never leaves a half-built result behind.
pub fn reconcile(
    extract: RecordStore,
    baseline: RecordStore,
    block_list: &BlockList,
    target: NaiveDate,
    engine: &EngineSettings,
    logger: &LoggerLocal,
) -> Result<Reconciliation, ReconcileError> {
    let schema = &engine.schema;

    let mut extract_columns = schema.admission_columns();
    extract_columns.extend(schema.merge_columns());
    // New rows carry their member id into the sequence assigner.
    extract_columns.push(schema.member_id.as_str());
    let mut baseline_columns = extract_columns.clone();
    baseline_columns.extend(schema.sequence_columns());
    if let SequenceOrder::ByColumn(column) = &engine.sequence_order {
        baseline_columns.push(column);
    }
    extract.require_columns(&extract_columns)?;
    baseline.require_columns(&baseline_columns)?;

    let mut stats = ReconcileStats {
        extract_records: extract.len(),
        baseline_records: baseline.len(),
        ..Default::default()
    };

    let admission = classify(&extract, &baseline, block_list, schema, logger)?;
    stats.blocked = admission.blocked;
    stats.new_records = admission.new_records.len();

    let mut merged = baseline;
    merged.append_all(&admission.new_records)?;

    // Only admitted records may patch the baseline; blocked rows are gone here.
    let merge = MergeEngine::new(schema, &engine.dates, engine.merge).merge(
        &admission.admitted,
        merged,
        target,
        &admission.new_ids,
        logger,
    )?;
    stats.update_candidates = merge.candidates;
    stats.updated_records = merge.changed_count;
    stats.updated_fields = merge.changed_fields;
    stats.unmatched_candidates = merge.unmatched.len();
    stats.invalid_dates = merge.invalid_dates.len();

    let sequenced = SequenceAssigner::new(schema, &engine.dates, engine.sequence_order.clone()).assign(
        merge.merged,
        &admission.new_ids,
        logger,
    )?;
    stats.sequences_assigned = sequenced.assigned;
    stats.sequences_defaulted = sequenced.defaulted;
    stats.output_records = sequenced.store.len();

    Ok(Reconciliation {
        store: sequenced.store,
        new_ids: admission.new_ids,
        stats,
    })
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub target_date: NaiveDate,
    pub stats: ReconcileStats,
    /// `None` on a dry run.
    pub write: Option<WriteReport>,
}

/// Loads the configured files, reconciles them and, unless `dry_run` is set,
/// replaces the output file with the result. `now` drives the update cutoff
/// and the backup timestamp.
pub fn run(
    settings: &ReconcileSettings,
    now: NaiveDateTime,
    dry_run: bool,
    logger: &LoggerLocal,
) -> Result<RunSummary, ReconcileError> {
    let engine = &settings.engine;
    let target_date = settings.target_date.resolve(now.date());
    logger.info(
        &format!(
            "Reconciling {} into {} (updates since {})",
            settings.new_file.display(),
            settings.old_file.display(),
            target_date
        ),
        Some(json!({ "target_date": settings.target_date.to_string(), "dry_run": dry_run })),
    );

    let extract = RecordStore::from_table(
        &settings.new_file.display().to_string(),
        read_table(&settings.new_file, settings.encoding)?,
        &engine.schema.application_id,
        engine.duplicate_policy,
        logger,
    )?;
    let baseline = RecordStore::from_table(
        &settings.old_file.display().to_string(),
        read_table(&settings.old_file, settings.encoding)?,
        &engine.schema.application_id,
        engine.duplicate_policy,
        logger,
    )?;
    let block_list = BlockList::load(&settings.exclude_file)?;
    logger.debug(
        &format!(
            "Loaded {} block-list patterns from {}",
            block_list.len(),
            settings.exclude_file.display()
        ),
        None,
    );

    let reconciliation = reconcile(extract, baseline, &block_list, target_date, engine, logger)?;
    let stats = reconciliation.stats.clone();

    let write = if dry_run {
        logger.info(
            &format!(
                "Dry run: {} not written ({} rows)",
                settings.output_file.display(),
                stats.output_records
            ),
            None,
        );
        None
    } else {
        let rotation = BackupRotation::new(&settings.backup_dir, settings.retention_days);
        Some(write_with_backup(
            &settings.output_file,
            &reconciliation.store.into_table(),
            settings.encoding,
            &rotation,
            now,
            logger,
        )?)
    };

    logger.info(&format!("New records added: {}", stats.new_records), None);
    logger.info(
        &format!("Records updated: {}", stats.updated_records),
        serde_json::to_value(&stats).ok(),
    );

    Ok(RunSummary {
        target_date,
        stats,
        write,
    })
}

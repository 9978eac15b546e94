//! Reconciliation coordinator.
//!
//! One [`ImportService::run`] call is one batch: parse → reproject →
//! validate → diff → single local transaction → per-record remote replay →
//! audit batch. Any stage failure aborts the stages after it; a replay
//! failure after the local commit is reported as drift, never as success.

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use arborsync_config::SyncConfig;
use arborsync_core::{
    validate_records, BatchId, CancelToken, ImportBatch, InventoryService, RemoteError, TreeId,
    TreeImport,
};
use arborsync_geo::{GeoPoint, GeoTransformer};
use arborsync_recon::{diff, DiffOutcome, MatchOptions};
use arborsync_store::TreeStore;

use crate::csv;
use crate::error::{ImportRunError, ReplayProgress};

/// Outcome of one successful reconciliation run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImportReport {
    pub batch_id: BatchId,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

/// Sequences one reconciliation run against the local store and the
/// remote inventory.
///
/// Runs serialize by construction: `run` borrows the service mutably, so
/// no two runs can interleave their operations against the same store.
pub struct ImportService<R> {
    config: SyncConfig,
    transformer: GeoTransformer,
    store: TreeStore,
    remote: R,
}

impl<R: InventoryService> ImportService<R> {
    /// Resolve the configured reference systems once; every batch the
    /// service runs reuses them.
    pub fn new(config: SyncConfig, store: TreeStore, remote: R) -> Result<Self, ImportRunError> {
        let transformer = GeoTransformer::new(config.geo.source_epsg, config.geo.target_epsg)
            .map_err(ImportRunError::Transform)?;
        Ok(Self { config, transformer, store, remote })
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Run one reconciliation for a file on disk.
    pub fn run_file(&mut self, path: &Path, cancel: &CancelToken) -> Result<ImportReport, ImportRunError> {
        let raw = csv::read_file(path).map_err(ImportRunError::Input)?;
        self.run(&raw, cancel)
    }

    /// Run one reconciliation for an already-read payload.
    pub fn run(&mut self, raw: &str, cancel: &CancelToken) -> Result<ImportReport, ImportRunError> {
        let started = Instant::now();

        let records = csv::parse(raw, &self.config.columns).map_err(ImportRunError::Input)?;
        debug!(rows = records.len(), "parsed import payload");

        let records = self.reproject(records)?;
        validate_records(&records).map_err(ImportRunError::Validation)?;

        let current = self.store.list_all().map_err(ImportRunError::Local)?;
        let opts = MatchOptions { coordinate_precision: self.config.recon.match_precision };
        let outcome = diff(&current, records, &opts);
        info!(
            create = outcome.summary.create,
            update = outcome.summary.update,
            delete = outcome.summary.delete,
            unchanged = outcome.summary.unchanged,
            "diffed against {} inventory records",
            current.len()
        );

        // Creates, then updates, then deletes, all or nothing.
        let created_ids = self
            .store
            .with_transaction(|tx| {
                let ids = arborsync_store::create_trees(tx, &outcome.create)?;
                arborsync_store::update_trees(tx, &outcome.update)?;
                arborsync_store::delete_trees_by_id(tx, &outcome.delete)?;
                Ok(ids)
            })
            .map_err(ImportRunError::Local)?;

        self.replay(&outcome, &created_ids, cancel)?;

        // Audit references every id a create or update touched.
        let mut affected = created_ids;
        affected.extend(outcome.update.iter().filter_map(|rec| rec.id));
        let batch = ImportBatch::new(self.config.imported_by.clone(), raw);
        let batch_id = self.store.record_batch(&batch, &affected).map_err(ImportRunError::Audit)?;

        let report = ImportReport {
            batch_id,
            created: outcome.summary.create,
            updated: outcome.summary.update,
            deleted: outcome.summary.delete,
            unchanged: outcome.summary.unchanged,
        };
        info!(
            batch_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation complete"
        );
        Ok(report)
    }

    /// Rewrite every record's raw planar pair as geographic degrees, in
    /// one batch call.
    fn reproject(&self, mut records: Vec<TreeImport>) -> Result<Vec<TreeImport>, ImportRunError> {
        // Raw records carry northing in `latitude`, easting in `longitude`.
        let points: Vec<GeoPoint> =
            records.iter().map(|rec| GeoPoint::new(rec.longitude, rec.latitude)).collect();
        let transformed =
            self.transformer.transform_batch(&points).map_err(ImportRunError::Transform)?;
        for (rec, point) in records.iter_mut().zip(&transformed) {
            rec.longitude = point.x;
            rec.latitude = point.y;
        }
        Ok(records)
    }

    /// Mirror the committed queues to the remote service, one call per
    /// record, honoring the cancel token between calls.
    fn replay(
        &self,
        outcome: &DiffOutcome,
        created_ids: &[TreeId],
        cancel: &CancelToken,
    ) -> Result<ReplayProgress, ImportRunError> {
        let mut progress = ReplayProgress::default();
        let now = Utc::now();

        for (rec, id) in outcome.create.iter().zip(created_ids) {
            check_cancelled(cancel, progress)?;
            let tree = rec.to_tree(*id, now);
            let remote_id = self
                .remote
                .create_tree(&tree)
                .map_err(|source| ImportRunError::Drift { progress, source })?;
            if remote_id != *id {
                // Local ids stay authoritative; the mismatch is only logged.
                warn!(local = *id, remote = remote_id, "remote assigned a different id");
            }
            progress.creates_done += 1;
        }

        for rec in &outcome.update {
            check_cancelled(cancel, progress)?;
            let id = rec.id.expect("differ resolves an id for every update record");
            let tree = rec.to_tree(id, now);
            self.remote
                .update_tree(id, &tree)
                .map_err(|source| ImportRunError::Drift { progress, source })?;
            progress.updates_done += 1;
        }

        for id in &outcome.delete {
            check_cancelled(cancel, progress)?;
            self.remote
                .delete_tree(*id)
                .map_err(|source| ImportRunError::Drift { progress, source })?;
            progress.deletes_done += 1;
        }

        Ok(progress)
    }
}

fn check_cancelled(cancel: &CancelToken, progress: ReplayProgress) -> Result<(), ImportRunError> {
    if cancel.is_cancelled() {
        return Err(ImportRunError::Drift { progress, source: RemoteError::Cancelled });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use arborsync_core::{ServerInfo, Tree};

    use crate::error::ParseError;

    /// Records every call; optionally fails the nth one (0-based).
    #[derive(Default)]
    struct MockRemote {
        calls: RefCell<Vec<String>>,
        fail_at: Cell<Option<usize>>,
    }

    impl MockRemote {
        fn call(&self, entry: String) -> Result<(), RemoteError> {
            let n = self.calls.borrow().len();
            if self.fail_at.get() == Some(n) {
                return Err(RemoteError::Http { status: 502, body: "unavailable".into() });
            }
            self.calls.borrow_mut().push(entry);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl InventoryService for MockRemote {
        fn server_info(&self) -> Result<ServerInfo, RemoteError> {
            Ok(ServerInfo { name: "mock".into(), version: "0".into() })
        }

        fn create_tree(&self, tree: &Tree) -> Result<TreeId, RemoteError> {
            self.call(format!("create {}", tree.number))?;
            Ok(tree.id)
        }

        fn update_tree(&self, id: TreeId, _tree: &Tree) -> Result<(), RemoteError> {
            self.call(format!("update {id}"))
        }

        fn delete_tree(&self, id: TreeId) -> Result<(), RemoteError> {
            self.call(format!("delete {id}"))
        }
    }

    const CSV_2010: &str = "\
Gebiet,Strasse,Baumnummer,Gattung,Hochwert,Rechtswert,Pflanzjahr
Mitte,Norderstraße,B-1,Tilia cordata,\"6069000,0\",\"512000,0\",2010
Mitte,Norderstraße,B-2,Quercus robur,\"6069100,0\",\"512100,0\",2010
Mitte,Süderstraße,B-3,,\"6069200,0\",\"512200,0\",2010
";

    fn config() -> SyncConfig {
        SyncConfig::from_toml(
            r#"
[geo]
source_epsg = 25832

[store]
path = ":memory:"

[remote]
api_base = "http://inventory.test"
"#,
        )
        .unwrap()
    }

    fn service() -> ImportService<MockRemote> {
        let store = TreeStore::open_in_memory().unwrap();
        ImportService::new(config(), store, MockRemote::default()).unwrap()
    }

    #[test]
    fn first_run_creates_every_record() {
        let mut service = service();
        let report = service.run(CSV_2010, &CancelToken::new()).unwrap();

        assert_eq!(report.created, 3);
        assert_eq!(report.updated, 0);
        assert_eq!(report.deleted, 0);

        let trees = service.store().list_all().unwrap();
        assert_eq!(trees.len(), 3);
        // Reprojection happened before persistence: UTM northing/easting
        // became geographic degrees near Flensburg.
        assert!(trees.iter().all(|t| (54.0..55.5).contains(&t.latitude)));
        assert!(trees.iter().all(|t| (8.5..10.0).contains(&t.longitude)));

        let calls = service.remote().calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.starts_with("create ")));

        assert_eq!(service.store().batch_count().unwrap(), 1);
        let ids: Vec<TreeId> = trees.iter().map(|t| t.id).collect();
        assert_eq!(service.store().batch_tree_ids(report.batch_id).unwrap(), ids);
    }

    #[test]
    fn rerunning_the_same_file_is_idempotent() {
        let mut service = service();
        service.run(CSV_2010, &CancelToken::new()).unwrap();
        let calls_after_first = service.remote().calls().len();

        let report = service.run(CSV_2010, &CancelToken::new()).unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 0);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.unchanged, 3);

        // No further remote mutation, but the run is still audited.
        assert_eq!(service.remote().calls().len(), calls_after_first);
        assert_eq!(service.store().batch_count().unwrap(), 2);
        assert!(service.store().batch_tree_ids(report.batch_id).unwrap().is_empty());
    }

    #[test]
    fn changed_field_at_same_position_updates_in_place() {
        let mut service = service();
        service.run(CSV_2010, &CancelToken::new()).unwrap();

        let changed = CSV_2010.replace("Tilia cordata", "Tilia platyphyllos");
        let report = service.run(&changed, &CancelToken::new()).unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 1);
        assert_eq!(report.unchanged, 2);

        let trees = service.store().list_all().unwrap();
        assert_eq!(trees.len(), 3);
        assert!(trees.iter().any(|t| t.species == "Tilia platyphyllos"));
        assert!(service.remote().calls().iter().any(|c| c.starts_with("update ")));
    }

    #[test]
    fn changed_year_at_same_position_replaces_the_tree() {
        let mut service = service();
        service.run(CSV_2010, &CancelToken::new()).unwrap();
        let old_ids: Vec<TreeId> =
            service.store().list_all().unwrap().iter().map(|t| t.id).collect();

        let replaced = CSV_2010.replacen("2010", "2015", 1);
        let report = service.run(&replaced, &CancelToken::new()).unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.unchanged, 2);

        let trees = service.store().list_all().unwrap();
        assert_eq!(trees.len(), 3);
        assert!(!trees.iter().any(|t| t.id == old_ids[0]), "replaced tree is gone");
        assert!(trees.iter().any(|t| t.planting_year == 2015));
        assert!(service.remote().calls().iter().any(|c| c == &format!("delete {}", old_ids[0])));
    }

    #[test]
    fn remote_failure_midway_reports_drift_and_skips_the_audit() {
        let mut service = service();
        service.remote().fail_at.set(Some(1)); // second of three creates

        let err = service.run(CSV_2010, &CancelToken::new()).unwrap_err();
        match err {
            ImportRunError::Drift { progress, source } => {
                assert_eq!(progress.creates_done, 1);
                assert_eq!(progress.updates_done, 0);
                assert!(matches!(source, RemoteError::Http { status: 502, .. }));
            }
            other => panic!("expected Drift, got {other:?}"),
        }

        // Local side committed before the replay started; audit did not run.
        assert_eq!(service.store().list_all().unwrap().len(), 3);
        assert_eq!(service.store().batch_count().unwrap(), 0);
    }

    #[test]
    fn cancellation_between_remote_calls_reports_drift() {
        let mut service = service();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = service.run(CSV_2010, &cancel).unwrap_err();
        match err {
            ImportRunError::Drift { progress, source } => {
                assert_eq!(progress, ReplayProgress::default());
                assert!(matches!(source, RemoteError::Cancelled));
            }
            other => panic!("expected Drift, got {other:?}"),
        }

        // No remote call was issued, but the local commit stands.
        assert!(service.remote().calls().is_empty());
        assert_eq!(service.store().list_all().unwrap().len(), 3);
    }

    #[test]
    fn semantic_validation_stops_the_run_before_any_mutation() {
        let mut service = service();
        let zero_year = CSV_2010.replacen("2010", "0", 1);

        let err = service.run(&zero_year, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ImportRunError::Validation(_)));

        assert!(service.store().list_all().unwrap().is_empty());
        assert!(service.remote().calls().is_empty());
        assert_eq!(service.store().batch_count().unwrap(), 0);
    }

    #[test]
    fn input_rejection_stops_the_run_before_any_mutation() {
        let mut service = service();
        let bad = "Falsch,Strasse,Baumnummer,Gattung,Hochwert,Rechtswert,Pflanzjahr\n";

        let err = service.run(bad, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ImportRunError::Input(ParseError::HeaderMismatch { .. })));
        assert!(service.store().list_all().unwrap().is_empty());
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Stable inventory identifier, assigned by the local store and mirrored
/// to the remote service. The importer is the only writer on both sides.
pub type TreeId = i64;

/// Audit batch identifier.
pub type BatchId = i64;

// ---------------------------------------------------------------------------
// Import records
// ---------------------------------------------------------------------------

/// One CSV row, alive for a single reconciliation run.
///
/// Before reprojection `latitude`/`longitude` hold the raw planar pair from
/// the source reference system (northing in `latitude`, easting in
/// `longitude`, matching the source file's Hochwert/Rechtswert columns).
/// After reprojection they are geographic degrees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeImport {
    pub area: String,
    pub number: String,
    pub species: String,
    pub latitude: f64,
    pub longitude: f64,
    pub planting_year: i32,
    pub street: String,
    /// Set by the differ when the record matches an existing tree, or by
    /// the store once the record is created. Absent until then.
    pub id: Option<TreeId>,
}

impl TreeImport {
    /// Materialize as a persistent record, for mirroring to the remote side.
    pub fn to_tree(&self, id: TreeId, now: DateTime<Utc>) -> Tree {
        Tree {
            id,
            created_at: now,
            updated_at: now,
            area: self.area.clone(),
            number: self.number.clone(),
            species: self.species.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            planting_year: self.planting_year,
            street: self.street.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory records
// ---------------------------------------------------------------------------

/// One asset as persisted in the local store and the remote service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tree {
    pub id: TreeId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub area: String,
    pub number: String,
    pub species: String,
    pub latitude: f64,
    pub longitude: f64,
    pub planting_year: i32,
    pub street: String,
}

// ---------------------------------------------------------------------------
// Audit batch
// ---------------------------------------------------------------------------

/// One reconciliation run's audit record. Written once, after local and
/// remote agree; never mutated or deleted by this system.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    /// Actor that triggered the run.
    pub imported_by: String,
    /// Raw input payload, retained for audit and replay.
    pub raw_payload: String,
    /// SHA-256 of `raw_payload`, hex-encoded.
    pub checksum: String,
}

impl ImportBatch {
    pub fn new(imported_by: impl Into<String>, raw_payload: impl Into<String>) -> Self {
        use sha2::{Digest, Sha256};
        let raw_payload = raw_payload.into();
        let checksum = {
            let mut hasher = Sha256::new();
            hasher.update(raw_payload.as_bytes());
            let digest = hasher.finalize();
            digest.iter().map(|b| format!("{b:02x}")).collect()
        };
        Self { imported_by: imported_by.into(), raw_payload, checksum }
    }
}

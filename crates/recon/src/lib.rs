//! `arborsync-recon` — inventory differ.
//!
//! Pure engine crate: receives the current inventory snapshot and the
//! freshly imported records, returns the minimal operation queues. No IO
//! dependencies.

use serde::Serialize;

use arborsync_core::{Tree, TreeId, TreeImport};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Coordinate matching policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Decimal places both sides are rounded to before comparison.
    /// `None` compares exact floating-point values, which assumes the
    /// source reprojects bit-identically between runs.
    pub coordinate_precision: Option<u8>,
}

impl MatchOptions {
    fn coords_equal(&self, a: (f64, f64), b: (f64, f64)) -> bool {
        match self.coordinate_precision {
            None => a.0 == b.0 && a.1 == b.1,
            Some(places) => {
                round_to(a.0, places) == round_to(b.0, places)
                    && round_to(a.1, places) == round_to(b.1, places)
            }
        }
    }
}

fn round_to(value: f64, places: u8) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Operation queues for one reconciliation run.
///
/// Every incoming record lands in exactly one of: `create`, `update`,
/// `create` plus a `delete` of the record it displaces (a replacement),
/// or the unchanged count, queued nowhere. The queues are disjoint and
/// ordered as the input was.
#[derive(Debug, Default)]
pub struct DiffOutcome {
    pub create: Vec<TreeImport>,
    /// Records that matched an existing tree; each carries that tree's id.
    pub update: Vec<TreeImport>,
    pub delete: Vec<TreeId>,
    pub summary: DiffSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub incoming: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub unchanged: usize,
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Partition `incoming` against the `current` snapshot.
///
/// A record whose coordinate pair matches no current tree is a create. A
/// coordinate match with the same planting year inherits the tree's id and
/// becomes an update, unless every remaining field is also equal, in
/// which case nothing needs to happen and the record is only counted. A
/// coordinate match with a different planting year replaces the tree: its
/// id is queued for deletion and the record becomes a create.
///
/// Matching is positional first-match over the snapshot.
pub fn diff(current: &[Tree], incoming: Vec<TreeImport>, opts: &MatchOptions) -> DiffOutcome {
    let mut outcome = DiffOutcome::default();
    outcome.summary.incoming = incoming.len();

    for mut record in incoming {
        let matched = current.iter().find(|tree| {
            opts.coords_equal((tree.latitude, tree.longitude), (record.latitude, record.longitude))
        });

        match matched {
            None => outcome.create.push(record),
            Some(tree) if tree.planting_year == record.planting_year => {
                if is_unchanged(tree, &record) {
                    outcome.summary.unchanged += 1;
                } else {
                    record.id = Some(tree.id);
                    outcome.update.push(record);
                }
            }
            Some(tree) => {
                // The tree at this spot was replaced.
                outcome.delete.push(tree.id);
                outcome.create.push(record);
            }
        }
    }

    outcome.summary.create = outcome.create.len();
    outcome.summary.update = outcome.update.len();
    outcome.summary.delete = outcome.delete.len();
    outcome
}

/// Field-level equality for a coordinate-and-year match; a fully equal
/// record is a no-op, which is what makes re-running the same file
/// produce empty queues.
fn is_unchanged(tree: &Tree, record: &TreeImport) -> bool {
    tree.area == record.area
        && tree.number == record.number
        && tree.species == record.species
        && tree.street == record.street
}

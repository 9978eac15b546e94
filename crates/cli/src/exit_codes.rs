//! CLI exit code registry.
//!
//! Exit codes are part of the shell contract; operator scripts key off
//! them, in particular the drift code, which means the local store
//! committed but the remote mirror did not.
//!
//! | Code | Meaning                                      |
//! |------|----------------------------------------------|
//! | 0    | Success                                      |
//! | 1    | General error (unspecified)                  |
//! | 2    | CLI usage error                              |
//! | 10   | Config unreadable or invalid                 |
//! | 11   | Input rejected (file type, header, rows)     |
//! | 12   | Field validation failed                      |
//! | 13   | Reprojection failed                          |
//! | 14   | Local transaction failed (rolled back)       |
//! | 15   | Reconciliation drift, operator action needed |
//! | 16   | Audit record not written (stores consistent) |
//! | 17   | Remote service unreachable or unauthorized   |

use arborsync_import::ImportRunError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Config file could not be read, parsed, or validated.
pub const EXIT_CONFIG: u8 = 10;

/// Input rejected before any mutation: wrong file type, header mismatch,
/// malformed or incomplete rows.
pub const EXIT_INPUT: u8 = 11;

/// Semantic field validation failed (year, coordinate range).
pub const EXIT_VALIDATION: u8 = 12;

/// Batch reprojection failed; no coordinates were used.
pub const EXIT_TRANSFORM: u8 = 13;

/// Local transaction failed and was rolled back; remote untouched.
pub const EXIT_LOCAL: u8 = 14;

/// Local store committed but the remote replay stopped partway.
/// The inventories disagree until an operator re-runs or reconciles.
pub const EXIT_DRIFT: u8 = 15;

/// Run succeeded on both sides but the audit batch was not written.
pub const EXIT_AUDIT: u8 = 16;

/// Remote service unreachable or credentials rejected.
pub const EXIT_REMOTE: u8 = 17;

/// Map a run error to its exit code.
pub fn run_exit_code(err: &ImportRunError) -> u8 {
    match err {
        ImportRunError::Input(_) => EXIT_INPUT,
        ImportRunError::Validation(_) => EXIT_VALIDATION,
        ImportRunError::Transform(_) => EXIT_TRANSFORM,
        ImportRunError::Local(_) => EXIT_LOCAL,
        ImportRunError::Drift { .. } => EXIT_DRIFT,
        ImportRunError::Audit(_) => EXIT_AUDIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arborsync_core::RemoteError;
    use arborsync_import::ReplayProgress;

    #[test]
    fn drift_gets_its_own_code() {
        let err = ImportRunError::Drift {
            progress: ReplayProgress::default(),
            source: RemoteError::Cancelled,
        };
        assert_eq!(run_exit_code(&err), EXIT_DRIFT);
        assert_ne!(EXIT_DRIFT, EXIT_ERROR);
        assert_ne!(EXIT_DRIFT, EXIT_LOCAL);
    }
}

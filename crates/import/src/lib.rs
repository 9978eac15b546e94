//! `arborsync-import` — input parsing and the reconciliation pipeline.
//!
//! [`csv`] turns a municipal CSV export into typed records; [`service`]
//! sequences the whole run: parse → reproject → validate → diff → local
//! transaction → remote replay → audit batch.

pub mod csv;
pub mod error;
pub mod service;

pub use error::{ImportRunError, ParseError, ReplayProgress, Stage};
pub use service::{ImportReport, ImportService};

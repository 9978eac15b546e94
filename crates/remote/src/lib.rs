//! `arborsync-remote` — inventory API client.
//!
//! Blocking reqwest client (no async runtime required). Implements the
//! `InventoryService` boundary: one HTTP call per record, bearer-token
//! auth, JSON bodies. Retries and queueing are deliberately absent; the
//! coordinator treats any failure as the end of the replay.

mod client;

pub use client::InventoryClient;

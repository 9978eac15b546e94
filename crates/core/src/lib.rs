//! `arborsync-core` — shared domain model for the tree inventory.
//!
//! Pure types crate: records, semantic validation, and the remote-service
//! boundary. No IO dependencies.

pub mod cancel;
pub mod model;
pub mod remote;
pub mod validate;

pub use cancel::CancelToken;
pub use model::{BatchId, ImportBatch, Tree, TreeId, TreeImport};
pub use remote::{InventoryService, RemoteError, ServerInfo};
pub use validate::{validate_records, ValidationError};

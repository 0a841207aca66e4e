//! Generation ledger
//!
//! One record per completed generation, pointing at its stored artifact.

mod store;
mod types;

pub use store::{GenerationLedger, SqliteGenerationLedger};
pub use types::{GenerationRecord, RecordKind};

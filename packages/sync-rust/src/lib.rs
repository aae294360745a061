//! `viewgrid` Sync — record fetches and view config persistence for the
//! view store, with in-memory and HTTP backends.

pub mod config;
pub mod error;
pub mod generation;
pub mod http;
pub mod inspect;
pub mod logging;
pub mod memory;
pub mod sync;
pub mod traits;

pub use config::SyncConfig;
pub use error::SyncError;
pub use generation::{Generation, GenerationTracker};
pub use sync::{FetchOutcome, RowSetState, SaveOutcome, StoreHandle, ViewSync};
pub use traits::{RecordSource, ViewConfigStore};

//! # filerelay-core
//!
//! The transfer pipeline shared by every filerelay binary.
//!
//! ```text
//!  ┌────────────┐   RemoteFs    ┌──────────────────────────────────────────┐
//!  │ source     │──────────────▶│ TransferEngine                           │
//!  │ (sftp/s3)  │               │  list → filter → download (×3, verified) │
//!  └────────────┘               │  → transform → render → upload → dispose │
//!  ┌────────────┐   RemoteFs    │                                          │
//!  │ destination│◀──────────────│  Journal: activity + audit lines         │
//!  └────────────┘               └──────────────────────────────────────────┘
//! ```
//!
//! Backends implement [`fs::RemoteFs`]; `filerelay-sftp` and `filerelay-s3`
//! provide the network ones and [`memory::MemoryFs`] the in-process one.

pub mod engine;
pub mod error;
pub mod extract;
pub mod fs;
pub mod journal;
pub mod memory;
pub mod profile;
pub mod render;
pub mod retry;
pub mod transform;

pub use engine::{TransferAttempt, TransferEngine, TransferSummary, DOWNLOAD_ATTEMPTS};
pub use error::{PipelineError, PipelineResult, Stage};
pub use fs::{EntryKind, FsError, FsResult, RemoteEntry, RemoteFs};
pub use journal::Journal;
pub use memory::MemoryFs;
pub use profile::{Disposition, Mode, TransferProfile};
pub use retry::{Attempted, RetryPolicy};

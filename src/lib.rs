//! codemri - Persistence, synchronization and refresh scheduling for repository health reports
//!
//! This library stores immutable analysis snapshots per repository branch,
//! reconciles concurrent or out-of-order updates under a conflict strategy,
//! classifies branches as stale, and drives re-analysis from a background loop.

pub mod cli;
pub mod config;
pub mod error;
pub mod freshness;
pub mod model;
pub mod refresh;
pub mod storage;
pub mod sync;

/// Re-export commonly used types
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use freshness::{StalenessEvaluator, StalenessInfo};
pub use model::{AnalysisSnapshot, BranchInfo, Repository};
pub use refresh::{RefreshScheduler, RefreshTrigger};
pub use storage::Database;
pub use sync::{ConflictStrategy, SyncOutcome, SyncService};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "codemri";

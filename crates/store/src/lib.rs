//! Persistent state store for the NextAI gateway.
//!
//! A process-wide, single-file JSON store rooted at `data_dir/state.json`,
//! with read/write transactions, atomic persistence (write-to-temp then
//! rename), a load-time migration pass, and per-job advisory file locks for
//! cross-process cron coordination.

pub mod lock;
pub mod migrate;
pub mod state;
pub mod store;

pub use lock::CronJobLock;
pub use state::State;
pub use store::Store;

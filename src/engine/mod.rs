//! Core engine: the per-pool read → decide → execute loop, plus the
//! upkeep tasks that run beside it.

pub mod executor;
pub mod reader;
pub mod scheduler;
pub mod upkeep;

pub use executor::{ActionExecutor, ExecutorConfig};
pub use reader::AuctionReader;
pub use scheduler::{CycleReport, CycleStatus, PoolWorker, ShutdownPolicy, WorkerConfig};
pub use upkeep::{BalanceMonitor, FeeWithdrawer, WithdrawalConfig};

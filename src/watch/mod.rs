//! Watch engine for zk transactions and L1 deposits
//!
//! The engine:
//! 1. Claims a transaction and awaits its commit and verify milestones
//! 2. Lists deposits per token until their L1 receipt settles
//! 3. Coalesces the resulting balance refreshes behind one debounce timer
//! 4. Tracks every watch as a task that can be abandoned at logout

pub mod deposit;
pub mod engine;
pub mod refresh;
pub mod transaction;

pub use deposit::DepositWatcher;
pub use engine::WatchEngine;
pub use refresh::RefreshScheduler;
pub use transaction::TransactionWatcher;

use crate::error::WatcherResult;

use async_trait::async_trait;

/// Re-fetches wallet balances and transaction history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceRefresher: Send + Sync {
    async fn refresh_balances(&self, force: bool) -> WatcherResult<()>;

    async fn refresh_history(&self, offset: u64, force: bool) -> WatcherResult<()>;
}

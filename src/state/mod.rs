//! Shared status store
//!
//! Holds:
//! - Watched zk transactions and their confirmation status
//! - Per-token deposit lists with a revision counter
//! - Withdrawal to L1 transaction links

mod memory;
mod store;

pub use memory::InMemoryStatusStore;
pub use store::{
    DepositRecord, DepositStatus, DepositUpdate, StatusStore, TxStatus, WatchedTransaction,
};

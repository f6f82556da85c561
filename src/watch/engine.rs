//! Session-scoped watch engine

use super::deposit::DepositWatcher;
use super::refresh::RefreshScheduler;
use super::transaction::TransactionWatcher;
use super::BalanceRefresher;
use crate::chain::{ChainNotifier, DepositHandle};
use crate::config::WatcherConfig;
use crate::state::StatusStore;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

/// Owns the watch machines and every watch task of one wallet session
pub struct WatchEngine {
    /// Session identifier for logs
    session_id: Uuid,
    /// Shared status store
    store: Arc<dyn StatusStore>,
    /// Transaction watch machine
    transactions: Arc<TransactionWatcher>,
    /// Deposit watch machine
    deposits: Arc<DepositWatcher>,
    /// Debounced refresh
    scheduler: Arc<RefreshScheduler>,
    /// Outstanding watch tasks
    tasks: Mutex<JoinSet<()>>,
}

impl WatchEngine {
    /// Create a new watch engine
    pub fn new(
        store: Arc<dyn StatusStore>,
        notifier: Arc<dyn ChainNotifier>,
        refresher: Arc<dyn BalanceRefresher>,
        config: &WatcherConfig,
    ) -> Self {
        let scheduler = Arc::new(RefreshScheduler::new(
            refresher,
            config.refresh_debounce(),
            config.history_offset,
        ));
        let transactions = Arc::new(TransactionWatcher::new(
            store.clone(),
            notifier,
            scheduler.clone(),
        ));
        let deposits = Arc::new(DepositWatcher::new(
            store.clone(),
            scheduler.clone(),
            config.guard_duplicate_deposits,
        ));

        let session_id = Uuid::new_v4();
        info!(
            "Watch session {} started (refresh debounce {:?})",
            session_id,
            scheduler.delay()
        );

        Self {
            session_id,
            store,
            transactions,
            deposits,
            scheduler,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Read access for observers
    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    /// Start watching a zk transaction in the background
    pub fn watch_transaction(&self, tx_hash: impl Into<String>, already_submitted: bool) {
        let tx_hash = tx_hash.into();
        let watcher = self.transactions.clone();
        self.spawn(async move {
            watcher.watch(&tx_hash, already_submitted).await;
        });
    }

    /// Start watching an L1 deposit in the background
    pub fn watch_deposit(
        &self,
        deposit: Arc<dyn DepositHandle>,
        token: impl Into<String>,
        amount: impl Into<String>,
    ) {
        let token = token.into();
        let amount = amount.into();
        let watcher = self.deposits.clone();
        self.spawn(async move {
            watcher.watch(deposit.as_ref(), &token, &amount).await;
        });
    }

    /// Remember the L1 transaction of a withdrawal
    pub fn link_withdrawal(&self, tx_hash: &str, eth_tx_hash: &str) -> bool {
        self.store.set_withdrawal_link(tx_hash, eth_tx_hash)
    }

    /// Ask for a debounced balance/history refresh
    pub fn request_refresh(&self) {
        self.scheduler.request();
    }

    /// Number of watch tasks still running
    pub fn active_watches(&self) -> usize {
        let mut tasks = self.lock_tasks();
        reap(&mut tasks);
        let active = tasks.len();
        crate::metrics::record_active_watches(active);
        active
    }

    /// Drop every outstanding watch task without awaiting it.
    ///
    /// Also cancels a pending refresh. Transactions abandoned before their
    /// commit are released as their tasks unwind, so they can be watched
    /// again; committed transactions and listed deposits are left as they
    /// were. Returns the number of tasks dropped.
    pub fn abandon_all(&self) -> usize {
        let abandoned = {
            let mut tasks = self.lock_tasks();
            reap(&mut tasks);
            let old = std::mem::take(&mut *tasks);
            let count = old.len();
            // Dropping the set aborts its tasks
            drop(old);
            count
        };
        self.scheduler.cancel_pending();
        crate::metrics::record_active_watches(0);

        info!(
            "Watch session {} abandoned {} outstanding watches",
            self.session_id, abandoned
        );
        abandoned
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock_tasks();
        reap(&mut tasks);
        tasks.spawn(task);
        crate::metrics::record_active_watches(tasks.len());
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Collect finished watch tasks
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            if e.is_panic() {
                error!("Watch task panicked: {}", e);
            }
        }
    }
}

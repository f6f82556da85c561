//! Test doubles for the chain and refresh collaborators

use crate::chain::{ChainNotifier, DepositHandle, Milestone};
use crate::error::{WatcherError, WatcherResult};
use crate::watch::BalanceRefresher;

use async_trait::async_trait;
use axum::{routing::post, Json, Router};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::Instant;

/// Let spawned tasks run until they block
pub async fn settle() {
    for _ in 0..200 {
        tokio::task::yield_now().await;
    }
}

/// Serve JSON-RPC on a local port and return its URL.
///
/// `reply` gets the call index and the request body and returns the
/// `result` or `error` part of the response; `jsonrpc` and `id` are added.
pub async fn spawn_json_rpc<F>(reply: F) -> String
where
    F: Fn(usize, &Value) -> Value + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let reply = Arc::new(reply);
    let app = Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| {
            let calls = calls.clone();
            let reply = reply.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let mut response = reply(n, &body);
                response["jsonrpc"] = json!("2.0");
                response["id"] = body["id"].clone();
                Json(response)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

type Gate = watch::Sender<Option<bool>>;

fn open_gate() -> Gate {
    watch::channel(None).0
}

async fn pass(mut gate: watch::Receiver<Option<bool>>) -> bool {
    match gate.wait_for(|outcome| outcome.is_some()).await {
        Ok(outcome) => *outcome == Some(true),
        Err(_) => false,
    }
}

/// Notifier whose milestones resolve only when the test says so
pub struct GatedNotifier {
    calls: Mutex<Vec<(String, Milestone)>>,
    gates: DashMap<(String, Milestone), Gate>,
}

impl GatedNotifier {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            gates: DashMap::new(),
        }
    }

    /// Resolve `milestone` for `tx_hash`, successfully or not
    pub fn resolve(&self, tx_hash: &str, milestone: Milestone, ok: bool) {
        self.gates
            .entry((tx_hash.to_string(), milestone))
            .or_insert_with(open_gate)
            .send_replace(Some(ok));
    }

    /// How many waits were issued for `milestone` of `tx_hash`
    pub fn call_count(&self, tx_hash: &str, milestone: Milestone) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, m)| h == tx_hash && *m == milestone)
            .count()
    }
}

#[async_trait]
impl ChainNotifier for GatedNotifier {
    async fn await_milestone(&self, tx_hash: &str, milestone: Milestone) -> WatcherResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((tx_hash.to_string(), milestone));

        let gate = self
            .gates
            .entry((tx_hash.to_string(), milestone))
            .or_insert_with(open_gate)
            .subscribe();

        if pass(gate).await {
            Ok(())
        } else {
            Err(WatcherError::TransactionFailed {
                tx_hash: tx_hash.to_string(),
                reason: "rejected by test".to_string(),
            })
        }
    }
}

/// Deposit whose receipt settles only when the test says so
pub struct FakeDeposit {
    eth_tx_hash: String,
    gate: Gate,
}

impl FakeDeposit {
    pub fn new(eth_tx_hash: &str) -> Self {
        Self {
            eth_tx_hash: eth_tx_hash.to_string(),
            gate: open_gate(),
        }
    }

    pub fn settle(&self, ok: bool) {
        self.gate.send_replace(Some(ok));
    }
}

#[async_trait]
impl DepositHandle for FakeDeposit {
    fn eth_tx_hash(&self) -> String {
        self.eth_tx_hash.clone()
    }

    async fn await_receipt(&self) -> WatcherResult<()> {
        if pass(self.gate.subscribe()).await {
            Ok(())
        } else {
            Err(WatcherError::DepositReverted {
                eth_tx_hash: self.eth_tx_hash.clone(),
            })
        }
    }
}

/// Refresher that records every call
pub struct RecordingRefresher {
    balances: Mutex<Vec<(bool, Instant)>>,
    history: Mutex<Vec<(u64, bool)>>,
}

impl RecordingRefresher {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn balance_calls(&self) -> usize {
        self.balances.lock().unwrap().len()
    }

    pub fn fired_at(&self) -> Vec<Instant> {
        self.balances.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn history_calls(&self) -> Vec<(u64, bool)> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl BalanceRefresher for RecordingRefresher {
    async fn refresh_balances(&self, force: bool) -> WatcherResult<()> {
        self.balances.lock().unwrap().push((force, Instant::now()));
        Ok(())
    }

    async fn refresh_history(&self, offset: u64, force: bool) -> WatcherResult<()> {
        self.history.lock().unwrap().push((offset, force));
        Ok(())
    }
}

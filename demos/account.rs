//! Bank-account walkthrough: rules, appends, a replay, and the change-feed
//! forwarder, all against the in-memory backend.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example account
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use facetstore::{
    ChangeFeedForwarder, CollectingSink, Event, Facet, MemoryBackend, Processor, ReducerInput,
    StoreError,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Account {
    balance: i64,
    movements: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Movement {
    amount: i64,
}

fn account_processor() -> Processor<Account, Movement> {
    Processor::builder()
        .rule("Deposited", |mut input: ReducerInput<'_, Account, Movement>| {
            let amount = input.current.amount;
            input.publish("BalanceChanged", json!({ "delta": amount }));
            let mut account = input.state;
            account.balance += amount;
            account.movements += 1;
            account
        })
        .rule("Withdrawn", |mut input: ReducerInput<'_, Account, Movement>| {
            let amount = input.current.amount;
            input.publish("BalanceChanged", json!({ "delta": -amount }));
            let mut account = input.state;
            account.balance -= amount;
            account.movements += 1;
            account
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), StoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,facetstore=debug".into()),
        )
        .init();

    let backend = MemoryBackend::new();
    let mut feed = backend.subscribe();
    let accounts = Facet::new(
        "account",
        Arc::new(backend.clone()),
        account_processor(),
    );

    // First commit creates the entity.
    let opened = accounts
        .append(
            "a-1",
            vec![
                Event::new("Deposited", Movement { amount: 100 }),
                Event::new("Deposited", Movement { amount: 50 }),
            ],
        )
        .await?;
    tracing::info!(seq = opened.seq, balance = opened.item.balance, "account funded");

    // Fast path: the caller just read, so it can write without re-reading.
    let current = accounts.get("a-1").await?.expect("account exists");
    let after = accounts
        .append_to(
            "a-1",
            current.item,
            current.record.sequence,
            vec![Event::new("Withdrawn", Movement { amount: 30 })],
        )
        .await?;
    tracing::info!(seq = after.seq, balance = after.item.balance, "withdrawal applied");

    // Full replay re-derives the same state from the inbound log and
    // reports the historical outbound timeline without re-publishing it.
    let replayed = accounts.recalculate("a-1", vec![]).await?;
    tracing::info!(
        seq = replayed.seq,
        balance = replayed.item.balance,
        replayed_outbounds = replayed.past_outbound.len(),
        "replay agrees with the materialized state"
    );

    // Everything the commits enqueued is on the change feed.
    let forwarder = ChangeFeedForwarder::new(CollectingSink::new());
    let delivered = forwarder.drain(&mut feed).await?;
    tracing::info!(delivered, "outbound events forwarded");
    for (event_type, payload) in forwarder.sink().delivered() {
        println!("bus <- {event_type}: {payload}");
    }

    Ok(())
}

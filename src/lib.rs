//! Wallet and transaction orchestration client for the $TREATZ coin-flip
//! and raffle game on Solana.
//!
//! The crate turns a user gesture ("bet 1 TREATZ on TREAT", "buy 3 tickets")
//! into a deposit transaction correlated to a server-side action by memo,
//! then watches the action until the backend settles it. The pipeline:
//! provider registry (who signs) -> account resolver (which token accounts)
//! -> transaction builder (ordered instruction plan) -> universal sender
//! (best send path, broadcast, retry) -> settlement poller (typed outcome
//! events).

pub mod api;
pub mod config;
pub mod engine;
pub mod errors;
pub mod provider;
pub mod resolver;
pub mod sender;
pub mod session;
pub mod settlement;
pub mod tx_builder;
pub mod types;

pub use engine::{ActionReceipt, Engine, SubmitOutcome};
pub use errors::{ClientError, Result};
pub use types::{ActionKind, BetSide, Outcome, SettlementEvent, SettlementStatus};

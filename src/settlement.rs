//! Settlement polling state machine
//!
//! `Submitted → Polling → {Settled, TimedOut, Unknown}`. A submitted action
//! is polled on a fixed interval until the server reports a terminal status
//! or the wall-clock budget elapses. Individual poll failures are swallowed
//! and retried on the next tick; they never abort the loop or shorten the
//! budget. Terminal events are delivered exactly once, and the loop stops
//! cleanly when the owning context is torn down so no timers leak.
//!
//! A `TimedOut` action is indeterminate, not failed: the broadcast
//! transaction's ledger fate is independent of polling success, so nothing
//! is rolled back.

use crate::api::ApiClient;
use crate::errors::Result;
use crate::types::{Outcome, SettlementEvent, SettlementRecord, SettlementStatus};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Terminal server-side result surfaced by a probe
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub outcome: Outcome,
    pub commit_hash: Option<String>,
    pub reveal_seed: Option<String>,
}

/// One poll against the server resource tracking an action.
/// `Ok(None)` means still pending; errors are treated as transient.
#[async_trait]
pub trait SettlementProbe: Send + Sync {
    fn remote_id(&self) -> &str;
    async fn check(&self) -> Result<Option<ProbeResult>>;
}

/// Polls `GET /bets/:id` for a coin-flip bet
pub struct BetProbe {
    api: Arc<ApiClient>,
    bet_id: String,
}

impl BetProbe {
    pub fn new(api: Arc<ApiClient>, bet_id: impl Into<String>) -> Self {
        Self {
            api,
            bet_id: bet_id.into(),
        }
    }
}

#[async_trait]
impl SettlementProbe for BetProbe {
    fn remote_id(&self) -> &str {
        &self.bet_id
    }

    async fn check(&self) -> Result<Option<ProbeResult>> {
        let bet = self.api.get_bet(&self.bet_id).await?;
        if bet.status != "SETTLED" {
            return Ok(None);
        }
        let outcome = if bet.win == Some(true) {
            Outcome::Win
        } else {
            Outcome::Loss
        };
        Ok(Some(ProbeResult {
            outcome,
            commit_hash: bet.server_seed_hash,
            reveal_seed: bet.server_seed_reveal,
        }))
    }
}

/// Polls `GET /rounds/:id/winner` for a raffle entry
pub struct RaffleProbe {
    api: Arc<ApiClient>,
    round_id: String,
    player: Pubkey,
}

impl RaffleProbe {
    pub fn new(api: Arc<ApiClient>, round_id: impl Into<String>, player: Pubkey) -> Self {
        Self {
            api,
            round_id: round_id.into(),
            player,
        }
    }
}

#[async_trait]
impl SettlementProbe for RaffleProbe {
    fn remote_id(&self) -> &str {
        &self.round_id
    }

    async fn check(&self) -> Result<Option<ProbeResult>> {
        let round = self.api.round_winner(&self.round_id).await?;
        if round.status != "SETTLED" {
            return Ok(None);
        }
        let outcome = match round.winner {
            Some(winner) if winner == self.player.to_string() => Outcome::Win,
            _ => Outcome::Loss,
        };
        Ok(Some(ProbeResult {
            outcome,
            commit_hash: None,
            reveal_seed: None,
        }))
    }
}

/// A running poll loop that can be cancelled on context teardown
pub struct PollTask {
    handle: JoinHandle<SettlementRecord>,
    shutdown: watch::Sender<bool>,
}

impl PollTask {
    /// Stop the loop without emitting a terminal event
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether the loop has reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to finish and return the final record
    pub async fn join(self) -> SettlementRecord {
        self.handle.await.unwrap_or_else(|_| {
            SettlementRecord::pending("aborted", "aborted")
        })
    }
}

/// Settlement poller configuration and runner
#[derive(Debug, Clone)]
pub struct SettlementPoller {
    poll_interval: Duration,
    timeout: Duration,
}

impl SettlementPoller {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Spawn the poll loop for an action
    pub fn spawn<P>(
        &self,
        action_id: String,
        probe: P,
        events: mpsc::Sender<SettlementEvent>,
    ) -> PollTask
    where
        P: SettlementProbe + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = self.clone();
        let handle = tokio::spawn(async move {
            poller.run(action_id, &probe, &events, shutdown_rx).await
        });
        PollTask {
            handle,
            shutdown: shutdown_tx,
        }
    }

    /// Run the poll loop to a terminal state.
    ///
    /// Emits `Settled` exactly once or `TimedOut` exactly once; a cancelled
    /// loop emits nothing and resolves `Unknown`.
    pub async fn run(
        &self,
        action_id: String,
        probe: &dyn SettlementProbe,
        events: &mpsc::Sender<SettlementEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SettlementRecord {
        let mut record = SettlementRecord::pending(action_id.clone(), probe.remote_id());
        let deadline = Instant::now() + self.timeout;
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!(action_id, "settlement polling cancelled");
                    record.status = SettlementStatus::Unknown;
                    return record;
                }
                _ = sleep_until(deadline) => {
                    info!(action_id, remote_id = probe.remote_id(),
                          "settlement timed out, action is indeterminate");
                    record.status = SettlementStatus::TimedOut;
                    let _ = events
                        .send(SettlementEvent::TimedOut { action_id })
                        .await;
                    return record;
                }
                _ = ticker.tick() => {
                    match probe.check().await {
                        Ok(Some(result)) => {
                            info!(action_id, outcome = ?result.outcome, "action settled");
                            record.status = SettlementStatus::Settled;
                            record.outcome = Some(result.outcome);
                            record.server_commit_hash = result.commit_hash;
                            record.server_reveal_seed = result.reveal_seed;
                            let _ = events
                                .send(SettlementEvent::Settled {
                                    action_id,
                                    outcome: result.outcome,
                                })
                                .await;
                            return record;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            // Transient; the next tick retries and the
                            // deadline is unaffected.
                            warn!(action_id, error = %e, "settlement poll failed");
                        }
                    }
                }
            }
        }
    }
}

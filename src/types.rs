//! Shared domain types for bets, raffle entries and settlement tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;

/// Which side of the coin flip the player picked.
///
/// Wire form is uppercase; the backend parses it back out of the memo tag
/// (`BET:{bet_id}:{SIDE}`), so casing matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetSide {
    Trick,
    Treat,
}

impl BetSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trick => "TRICK",
            Self::Treat => "TREAT",
        }
    }
}

impl fmt::Display for BetSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRICK" => Ok(Self::Trick),
            "TREAT" => Ok(Self::Treat),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// The kind of user action being orchestrated.
///
/// Re-entrancy guards are scoped per kind: an in-flight bet blocks further
/// bets but not ticket purchases, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Bet,
    TicketPurchase,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bet => f.write_str("bet"),
            Self::TicketPurchase => f.write_str("ticket_purchase"),
        }
    }
}

/// Payload detail that depends on the action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionDetail {
    Side(BetSide),
    Tickets(u64),
}

/// A user action that has been submitted but not yet reconciled with the
/// server-side outcome. Created on form submit, dropped once settlement
/// resolves or times out.
#[derive(Debug, Clone)]
pub struct PendingAction {
    /// Locally-assigned identifier, unique per process
    pub action_id: String,
    pub kind: ActionKind,
    /// Wager or total ticket cost, in smallest token units
    pub amount_base_units: u64,
    pub detail: ActionDetail,
    /// Server-issued correlation tag carried in the memo instruction
    pub memo_payload: String,
    pub created_at: DateTime<Utc>,
}

/// Win/loss outcome of a settled action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

/// Settlement lifecycle state. Transitions only move forward; a record never
/// regresses out of `Settled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    Pending,
    Settled,
    TimedOut,
    Unknown,
}

/// Reconciliation record bridging an optimistic local action to the
/// eventually-consistent server outcome
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub action_id: String,
    /// Server-assigned identifier (bet id or round id)
    pub remote_id: String,
    pub status: SettlementStatus,
    pub outcome: Option<Outcome>,
    /// Fairness commitment published before the outcome was determined
    pub server_commit_hash: Option<String>,
    /// Seed revealed after settlement, for post-hoc verification
    pub server_reveal_seed: Option<String>,
}

impl SettlementRecord {
    pub fn pending(action_id: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            remote_id: remote_id.into(),
            status: SettlementStatus::Pending,
            outcome: None,
            server_commit_hash: None,
            server_reveal_seed: None,
        }
    }
}

/// Typed settlement event delivered to presentation collaborators.
///
/// `Settled` is emitted exactly once per action; `TimedOut` at most once.
/// Rendering and FX layers subscribe to these; they never live inside the
/// poll loop itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    Settled {
        action_id: String,
        outcome: Outcome,
    },
    TimedOut {
        action_id: String,
    },
}

/// Normalized session event re-emitted by the provider registry so dependent
/// UI can resynchronize without polling the underlying provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(Pubkey),
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bet_side_wire_form() {
        assert_eq!(BetSide::Trick.as_str(), "TRICK");
        assert_eq!(BetSide::Treat.to_string(), "TREAT");
        assert_eq!("treat".parse::<BetSide>().unwrap(), BetSide::Treat);
        assert!("COIN".parse::<BetSide>().is_err());
    }

    #[test]
    fn test_settlement_record_starts_pending() {
        let rec = SettlementRecord::pending("a1", "bet42");
        assert_eq!(rec.status, SettlementStatus::Pending);
        assert!(rec.outcome.is_none());
    }
}

//! Backend API client
//!
//! Thin typed wrapper over the game backend: bet/ticket creation, round and
//! bet status reads for settlement polling, remote config, and the cluster
//! blockhash proxy used for transaction assembly.

use crate::config::RemoteConfig;
use crate::errors::{ClientError, Result};
use crate::types::BetSide;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use solana_sdk::hash::Hash;
use std::str::FromStr;
use std::time::Duration;

/// Response to `POST /bets`: the server-chosen deposit destination, the memo
/// correlation tag and the fairness commitment hash
#[derive(Debug, Clone, Deserialize)]
pub struct BetTicket {
    pub bet_id: String,
    pub server_seed_hash: String,
    /// Deposit destination wallet (the game vault)
    pub deposit: String,
    /// Correlation tag, `BET:{bet_id}:{SIDE}`
    pub memo: String,
}

/// Response to `POST /rounds/:id/buy`
#[derive(Debug, Clone, Deserialize)]
pub struct TicketOrder {
    #[serde(default)]
    pub purchase_id: Option<String>,
    /// Deposit destination wallet (the jackpot vault)
    pub deposit: String,
    /// Correlation tag, `JP:{round_id}`
    pub memo: String,
}

/// Bet resource as polled from `GET /bets/:id`
#[derive(Debug, Clone, Deserialize)]
pub struct BetResource {
    pub bet_id: String,
    /// `PENDING` until the deposit lands and the flip settles, then `SETTLED`
    pub status: String,
    #[serde(default)]
    pub win: Option<bool>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub server_seed_hash: Option<String>,
    #[serde(default)]
    pub server_seed_reveal: Option<String>,
}

/// Current raffle round from `GET /rounds/current`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentRound {
    pub round_id: String,
    pub status: String,
    #[serde(default)]
    pub opens_at: Option<String>,
    #[serde(default)]
    pub closes_at: Option<String>,
    /// Pot in smallest units
    #[serde(default)]
    pub pot: u64,
}

/// Round winner resource from `GET /rounds/:id/winner`
#[derive(Debug, Clone, Deserialize)]
pub struct RoundWinner {
    pub round_id: String,
    pub status: String,
    #[serde(default)]
    pub winner: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewBetBody<'a> {
    amount: u64,
    side: &'a str,
}

#[derive(Debug, Serialize)]
struct BuyTicketsBody {
    tickets: u64,
}

#[derive(Debug, Deserialize)]
struct BlockhashResponse {
    blockhash: String,
}

/// HTTP client for the game backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ClientError::api(path, e))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| ClientError::api(path, e))?;
        resp.json::<T>().await.map_err(|e| ClientError::api(path, e))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::api(path, e))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| ClientError::api(path, e))?;
        resp.json::<T>().await.map_err(|e| ClientError::api(path, e))
    }

    /// Fetch the remote configuration. Failures map to `ConfigUnavailable`
    /// so callers can distinguish "no config yet" from ordinary API errors.
    pub async fn get_config(&self) -> Result<RemoteConfig> {
        self.get_json::<RemoteConfig>("/config")
            .await
            .map_err(|e| ClientError::ConfigUnavailable(e.to_string()))
    }

    /// Create a bet record; the transfer itself is sent separately with the
    /// returned memo so the backend can correlate the deposit
    pub async fn create_bet(&self, amount_base_units: u64, side: BetSide) -> Result<BetTicket> {
        self.post_json(
            "/bets",
            &NewBetBody {
                amount: amount_base_units,
                side: side.as_str(),
            },
        )
        .await
    }

    /// Order raffle tickets for a round
    pub async fn buy_tickets(&self, round_id: &str, tickets: u64) -> Result<TicketOrder> {
        self.post_json(&format!("/rounds/{round_id}/buy"), &BuyTicketsBody { tickets })
            .await
    }

    pub async fn get_bet(&self, bet_id: &str) -> Result<BetResource> {
        self.get_json(&format!("/bets/{bet_id}")).await
    }

    pub async fn current_round(&self) -> Result<CurrentRound> {
        self.get_json("/rounds/current").await
    }

    pub async fn round_winner(&self, round_id: &str) -> Result<RoundWinner> {
        self.get_json(&format!("/rounds/{round_id}/winner")).await
    }

    /// Fetch a fresh blockhash through the backend's cluster proxy
    pub async fn latest_blockhash(&self) -> Result<Hash> {
        let resp: BlockhashResponse = self.get_json("/cluster/latest_blockhash").await?;
        Hash::from_str(&resp.blockhash)
            .map_err(|e| ClientError::api("/cluster/latest_blockhash", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> ApiClient {
        ApiClient::new(server.url(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_create_bet() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bets")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "amount": 5_000_000,
                "side": "TREAT"
            })))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"bet_id":"abc123","server_seed_hash":"deadbeef",
                   "deposit":"GameVau1t1111111111111111111111111111111111",
                   "memo":"BET:abc123:TREAT"}"#,
            )
            .create_async()
            .await;

        let ticket = client(&server).create_bet(5_000_000, BetSide::Treat).await.unwrap();
        assert_eq!(ticket.bet_id, "abc123");
        assert_eq!(ticket.memo, "BET:abc123:TREAT");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_bet_pending_has_no_outcome() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bets/abc123")
            .with_header("content-type", "application/json")
            .with_body(r#"{"bet_id":"abc123","status":"PENDING"}"#)
            .create_async()
            .await;

        let bet = client(&server).get_bet("abc123").await.unwrap();
        assert_eq!(bet.status, "PENDING");
        assert!(bet.win.is_none());
    }

    #[tokio::test]
    async fn test_latest_blockhash_parses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/cluster/latest_blockhash")
            .with_header("content-type", "application/json")
            .with_body(r#"{"blockhash":"4uQeVj5tqViQh7yWWGStvkEG1Zmhx6uasJtWCJziofM"}"#)
            .create_async()
            .await;

        let hash = client(&server).latest_blockhash().await.unwrap();
        assert_ne!(hash, Hash::default());
    }

    #[tokio::test]
    async fn test_config_failure_is_config_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/config")
            .with_status(503)
            .create_async()
            .await;

        let err = client(&server).get_config().await.unwrap_err();
        assert!(matches!(err, ClientError::ConfigUnavailable(_)));
        assert!(err.is_retryable());
    }
}

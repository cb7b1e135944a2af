//! Action orchestration engine
//!
//! Owns the end-to-end data flow for a user action: ensure connection,
//! resolve accounts, compose the plan, sign and broadcast, then hand the
//! action to the settlement poller. One in-flight sequence is permitted per
//! action kind; re-entrant submissions while a send is outstanding are
//! no-ops, never concurrent double-submits.

use crate::api::ApiClient;
use crate::config::{Config, RemoteConfig};
use crate::errors::{ClientError, Result};
use crate::provider::ProviderRegistry;
use crate::resolver::{AccountResolver, TokenProgramVariant};
use crate::sender::UniversalSender;
use crate::session::{Session, SessionState};
use crate::settlement::{BetProbe, PollTask, RaffleProbe, SettlementPoller};
use crate::tx_builder::{build_memo, transfer_checked, TransactionBuilder, TxPlan};
use crate::types::{ActionDetail, ActionKind, BetSide, PendingAction, SettlementEvent};
use chrono::Utc;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::signature::Signature;
use solana_sdk::{pubkey::Pubkey, system_instruction};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

const EVENT_QUEUE_CAPACITY: usize = 32;

/// Result of submitting a user action
#[derive(Debug)]
pub enum SubmitOutcome {
    Submitted(ActionReceipt),
    /// A sequence of the same kind is already outstanding; this gesture was
    /// dropped without building or sending anything
    Ignored,
}

/// Receipt for a broadcast action now awaiting settlement
#[derive(Debug, Clone)]
pub struct ActionReceipt {
    pub action_id: String,
    /// Server-assigned identifier (bet id or round id)
    pub remote_id: String,
    pub signature: Signature,
    /// Fairness commitment published before the flip (bets only)
    pub commit_hash: Option<String>,
}

pub struct Engine {
    api: Arc<ApiClient>,
    rpc: Arc<RpcClient>,
    registry: Arc<ProviderRegistry>,
    session: Arc<Session>,
    builder: TransactionBuilder,
    sender: UniversalSender,
    poller: SettlementPoller,
    remote: RwLock<Option<RemoteConfig>>,
    bet_in_flight: AtomicBool,
    tickets_in_flight: AtomicBool,
    action_seq: AtomicU64,
    events_tx: mpsc::Sender<SettlementEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<SettlementEvent>>>,
    tasks: Mutex<Vec<(PendingAction, PollTask)>>,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self> {
        let api = Arc::new(ApiClient::new(
            config.api.base_url.clone(),
            Duration::from_secs(config.api.timeout_secs),
        )?);
        let rpc = Arc::new(RpcClient::new(config.rpc.url.clone()));
        let session = Arc::new(Session::new());
        let registry = Arc::new(ProviderRegistry::new(Arc::clone(&session)));
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        Ok(Self {
            builder: TransactionBuilder::new(Arc::clone(&api)),
            sender: UniversalSender::new(
                Arc::clone(&rpc),
                Arc::clone(&api),
                config.rpc.broadcast_retries,
            ),
            poller: SettlementPoller::new(
                Duration::from_secs(config.settlement.poll_interval_secs),
                Duration::from_secs(config.settlement.timeout_secs),
            ),
            api,
            rpc,
            registry,
            session,
            remote: RwLock::new(None),
            bet_in_flight: AtomicBool::new(false),
            tickets_in_flight: AtomicBool::new(false),
            action_seq: AtomicU64::new(0),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Take the settlement event stream. Presentation collaborators consume
    /// this once; events are typed and delivered exactly once per terminal
    /// state.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<SettlementEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Session snapshot for link-visibility and label rendering
    pub async fn session_state(&self) -> SessionState {
        self.session.state().await
    }

    /// Last-known balance for the balance badge
    pub async fn display_balance(&self) -> Option<f64> {
        self.session.display_balance().await
    }

    /// Remote config, fetched on first use and retried lazily on the next
    /// user attempt while unavailable
    pub async fn remote_config(&self) -> Result<RemoteConfig> {
        if let Some(cfg) = self.remote.read().await.clone() {
            return Ok(cfg);
        }
        let cfg = self.api.get_config().await?;
        self.session.set_decimals(cfg.token_decimals).await;
        *self.remote.write().await = Some(cfg.clone());
        Ok(cfg)
    }

    /// Place a coin-flip bet. Returns `Ignored` when a bet sequence is
    /// already outstanding.
    pub async fn place_bet(&self, amount_base_units: u64, side: BetSide) -> Result<SubmitOutcome> {
        if self
            .bet_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("bet already in flight, ignoring re-entrant submit");
            return Ok(SubmitOutcome::Ignored);
        }
        let _reset = scopeguard::guard(&self.bet_in_flight, |flag| {
            flag.store(false, Ordering::SeqCst);
        });

        let remote = self.remote_config().await?;
        let player = self.registry.ensure_connected().await?;
        let provider = self
            .registry
            .active()
            .await
            .ok_or(ClientError::ProviderMissing)?;

        let ticket = self.api.create_bet(amount_base_units, side).await?;
        info!(bet_id = %ticket.bet_id, amount = amount_base_units, side = %side, "bet created");

        let deposit = parse_key(&ticket.deposit, "deposit address")?;
        let plan = self
            .plan_value_transfer(
                &remote,
                player,
                deposit,
                remote.game_vault_ata.as_deref(),
                amount_base_units,
                &ticket.memo,
            )
            .await?;

        let signature = self.sender.send(plan, provider.as_ref()).await?;
        let action_id = self.next_action_id(ActionKind::Bet);
        let pending = PendingAction {
            action_id: action_id.clone(),
            kind: ActionKind::Bet,
            amount_base_units,
            detail: ActionDetail::Side(side),
            memo_payload: ticket.memo.clone(),
            created_at: Utc::now(),
        };

        let probe = BetProbe::new(Arc::clone(&self.api), ticket.bet_id.clone());
        let task = self
            .poller
            .spawn(action_id.clone(), probe, self.events_tx.clone());
        self.tasks.lock().await.push((pending, task));

        Ok(SubmitOutcome::Submitted(ActionReceipt {
            action_id,
            remote_id: ticket.bet_id,
            signature,
            commit_hash: Some(ticket.server_seed_hash),
        }))
    }

    /// Buy raffle tickets for the current round. Returns `Ignored` when a
    /// purchase sequence is already outstanding; an in-flight bet does not
    /// block ticket purchases.
    pub async fn buy_tickets(&self, tickets: u64) -> Result<SubmitOutcome> {
        if self
            .tickets_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("ticket purchase already in flight, ignoring re-entrant submit");
            return Ok(SubmitOutcome::Ignored);
        }
        let _reset = scopeguard::guard(&self.tickets_in_flight, |flag| {
            flag.store(false, Ordering::SeqCst);
        });

        let remote = self.remote_config().await?;
        let player = self.registry.ensure_connected().await?;
        let provider = self
            .registry
            .active()
            .await
            .ok_or(ClientError::ProviderMissing)?;

        let round = self.api.current_round().await?;
        let order = self.api.buy_tickets(&round.round_id, tickets).await?;
        let amount = tickets
            .checked_mul(remote.ticket_price)
            .ok_or_else(|| ClientError::submission("ticket amount overflow"))?;
        info!(round_id = %round.round_id, tickets, amount, "ticket order created");

        let deposit = parse_key(&order.deposit, "deposit address")?;
        let plan = self
            .plan_value_transfer(
                &remote,
                player,
                deposit,
                remote.jackpot_vault_ata.as_deref(),
                amount,
                &order.memo,
            )
            .await?;

        let signature = self.sender.send(plan, provider.as_ref()).await?;
        let action_id = self.next_action_id(ActionKind::TicketPurchase);
        let pending = PendingAction {
            action_id: action_id.clone(),
            kind: ActionKind::TicketPurchase,
            amount_base_units: amount,
            detail: ActionDetail::Tickets(tickets),
            memo_payload: order.memo.clone(),
            created_at: Utc::now(),
        };

        let probe = RaffleProbe::new(Arc::clone(&self.api), round.round_id.clone(), player);
        let task = self
            .poller
            .spawn(action_id.clone(), probe, self.events_tx.clone());
        self.tasks.lock().await.push((pending, task));

        Ok(SubmitOutcome::Submitted(ActionReceipt {
            action_id,
            remote_id: round.round_id,
            signature,
            commit_hash: None,
        }))
    }

    /// Compose the ordered plan for a value transfer to a vault: account
    /// creations first, then the transfer, then the memo correlation tag.
    /// SOL-only deployments use a system transfer and skip resolution.
    async fn plan_value_transfer(
        &self,
        remote: &RemoteConfig,
        player: Pubkey,
        deposit_owner: Pubkey,
        precomputed_ata: Option<&str>,
        amount: u64,
        memo: &str,
    ) -> Result<TxPlan> {
        let memo_ix = build_memo(memo.as_bytes(), &[]);

        let Some(mint_str) = remote.mint_address() else {
            let transfer = system_instruction::transfer(&player, &deposit_owner, amount);
            return self.builder.build(vec![], transfer, memo_ix, player).await;
        };
        let mint = parse_key(mint_str, "mint address")?;

        let resolver = self.resolver_for(remote);
        let source = resolver.resolve_source(&player, &mint).await?;

        let (destination, creations, variant) = match precomputed_ata {
            // A precomputed vault ATA is trusted as-is; the backend vouches
            // for its existence.
            Some(ata) if !ata.is_empty() => {
                (parse_key(ata, "vault ata")?, vec![], source.variant)
            }
            _ => {
                let resolved = resolver
                    .resolve_or_create(&deposit_owner, &mint, &player)
                    .await?;
                (
                    resolved.account.derived_address,
                    resolved.creation_instruction.into_iter().collect(),
                    resolved.variant,
                )
            }
        };

        let transfer = transfer_checked(
            variant,
            &source.derived_address,
            &mint,
            &destination,
            &player,
            amount,
            remote.token_decimals,
        )?;

        self.builder.build(creations, transfer, memo_ix, player).await
    }

    /// Refresh the cached balance for the connected identity: token balance
    /// of the source account, or lamports for SOL-only deployments
    pub async fn refresh_balance(&self) -> Result<Option<f64>> {
        let remote = self.remote_config().await?;
        let Some(player) = self.session.identity().await else {
            return Ok(None);
        };

        let base_units = match remote.mint_address() {
            Some(mint_str) => {
                let mint = parse_key(mint_str, "mint address")?;
                let source = self.resolver_for(&remote).resolve_source(&player, &mint).await?;
                if !source.exists {
                    0
                } else {
                    let balance = self
                        .rpc
                        .get_token_account_balance(&source.derived_address)
                        .await
                        .map_err(|e| ClientError::Rpc(e.to_string()))?;
                    balance
                        .amount
                        .parse::<u64>()
                        .map_err(|e| ClientError::Rpc(format!("bad balance amount: {e}")))?
                }
            }
            None => self
                .rpc
                .get_balance(&player)
                .await
                .map_err(|e| ClientError::Rpc(e.to_string()))?,
        };

        self.session.set_balance(base_units).await;
        Ok(self.session.display_balance().await)
    }

    /// Actions submitted but not yet reconciled with a server-side outcome.
    /// Finished entries are pruned on read.
    pub async fn pending_actions(&self) -> Vec<PendingAction> {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|(_, task)| !task.is_finished());
        tasks.iter().map(|(pending, _)| pending.clone()).collect()
    }

    /// Cancel outstanding poll loops; called on context teardown so no
    /// timers leak. Broadcast transactions are not (and cannot be) revoked.
    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for (_, task) in &tasks {
            task.cancel();
        }
        for (_, task) in tasks {
            task.join().await;
        }
    }

    /// Resolver configured with the remote-config token program hint as its
    /// fallback variant
    fn resolver_for(&self, remote: &RemoteConfig) -> AccountResolver {
        let resolver = AccountResolver::new(Arc::clone(&self.rpc));
        match remote
            .token_program
            .as_deref()
            .and_then(TokenProgramVariant::from_hint)
        {
            Some(variant) => resolver.with_fallback(variant),
            None => resolver,
        }
    }

    fn next_action_id(&self, kind: ActionKind) -> String {
        let seq = self.action_seq.fetch_add(1, Ordering::SeqCst);
        format!("{kind}-{seq}")
    }
}

fn parse_key(value: &str, what: &str) -> Result<Pubkey> {
    Pubkey::from_str(value)
        .map_err(|e| ClientError::AccountResolution(format!("invalid {what} '{value}': {e}")))
}

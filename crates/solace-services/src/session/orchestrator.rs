//! Session orchestrator
//!
//! Drives a session's event loop: hands the transport the room id from the
//! funding decision, starts the billing clock when the listener is confirmed
//! present, serializes chat sends behind their pre-flight deductions, and on
//! any end trigger stops the transport and attempts settlement exactly once
//! (retried once with backoff; if settlement never succeeds the user is not
//! billed and the platform absorbs the loss).

use rust_decimal::Decimal;
use solace_core::{
    models::{CallSettlement, FundingDecision, FundingSource, Wallet},
    traits::SettlementService,
    AppError, AppResult, RatePolicy,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::meter::{MessageMeter, SessionClock};
use super::state::{transition, Effect, EndReason, SessionEvent, SessionState};
use super::transport::{RealtimeTransport, TransportEvent};

/// Backoff before the single settlement retry
const SETTLE_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Grace window after balance exhaustion, so the user can read the notice
const BALANCE_GRACE: Duration = Duration::from_secs(3);

/// Commands from the user's UI
#[derive(Debug, Clone)]
pub enum UserCommand {
    /// Send a chat message (ignored for calls)
    Send(String),
    /// End the session
    End,
}

/// Result of a finished call session
#[derive(Debug)]
pub struct CallOutcome {
    /// Connected seconds accrued up to the end trigger
    pub consumed_secs: i64,
    /// The committed settlement, if one was reachable
    pub settlement: Option<CallSettlement>,
    /// Why the session ended
    pub reason: EndReason,
}

/// Result of a finished chat session
#[derive(Debug)]
pub struct ChatOutcome {
    /// Messages deducted and handed to the transport
    pub messages_sent: u32,
    /// Why the session ended
    pub reason: EndReason,
}

/// Session orchestrator over a transport and the settlement service
pub struct SessionOrchestrator<T, S> {
    transport: Arc<T>,
    settlement: Arc<S>,
    policy: RatePolicy,
}

impl<T: RealtimeTransport, S: SettlementService> SessionOrchestrator<T, S> {
    /// Create a new orchestrator
    pub fn new(transport: Arc<T>, settlement: Arc<S>, policy: RatePolicy) -> Self {
        Self {
            transport,
            settlement,
            policy,
        }
    }

    /// Run a call session to completion
    ///
    /// Joins the room, waits for the listener, meters connected time, and
    /// settles once on termination. If the listener never joined, nothing
    /// accrued and settlement is skipped entirely.
    pub async fn run_call(
        &self,
        user_id: &str,
        listener_id: &str,
        decision: &FundingDecision,
        room_token: &str,
        mut commands: mpsc::Receiver<UserCommand>,
    ) -> AppResult<CallOutcome> {
        let settlement_key = Uuid::new_v4().to_string();

        let mut events = self
            .transport
            .join(&decision.room_id, room_token)
            .await
            .map_err(|e| AppError::TransportConnection(e.to_string()))?;

        let (mut state, _) = transition(SessionState::Idle, SessionEvent::TransportJoined);
        let mut clock = SessionClock::new(decision.session_cap_secs);

        info!(room = %decision.room_id, "Call session started, awaiting listener");

        let reason = loop {
            let deadline = clock
                .deadline()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

            tokio::select! {
                _ = time::sleep_until(deadline), if clock.started() => {
                    let (next, effect) = transition(state, SessionEvent::CapReached);
                    state = next;
                    if effect == Effect::Settle {
                        break EndReason::CapReached;
                    }
                }
                ev = events.recv() => {
                    let (event, reason) = match ev {
                        Some(TransportEvent::RemoteJoined) => {
                            (SessionEvent::RemoteJoined, None)
                        }
                        Some(TransportEvent::RemoteLeft) => {
                            (SessionEvent::RemoteLeft, Some(EndReason::RemoteLeft))
                        }
                        Some(TransportEvent::MessageReceived { .. }) => continue,
                        Some(TransportEvent::ConnectionLost) | None => {
                            (SessionEvent::NetworkError, Some(EndReason::ConnectionLost))
                        }
                    };
                    let (next, effect) = transition(state, event);
                    state = next;
                    match effect {
                        Effect::StartBilling => {
                            debug!(room = %decision.room_id, "Listener joined, billing clock started");
                            clock.start(Instant::now());
                        }
                        Effect::Settle => break reason.unwrap_or(EndReason::ConnectionLost),
                        Effect::None => {}
                    }
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(UserCommand::Send(_)) => {} // calls carry no text
                        Some(UserCommand::End) | None => {
                            let (next, effect) = transition(state, SessionEvent::UserEndRequested);
                            state = next;
                            if effect == Effect::Settle {
                                break EndReason::UserEnded;
                            }
                        }
                    }
                }
            }
        };

        // Consumption is sampled at the end trigger; nothing accrues past it.
        let consumed_secs = clock.consumed_secs(Instant::now());

        if let Err(e) = self.transport.leave(&decision.room_id).await {
            warn!(room = %decision.room_id, "Transport leave failed: {}", e);
        }

        let settlement = if clock.started() {
            self.settle_call_with_retry(
                user_id,
                listener_id,
                &decision.source,
                consumed_secs,
                &settlement_key,
            )
            .await
        } else {
            debug!(room = %decision.room_id, "Listener never joined, nothing to settle");
            None
        };

        let (state, _) = transition(state, SessionEvent::SettlementComplete);
        debug_assert_eq!(state, SessionState::Ended);

        info!(
            room = %decision.room_id,
            consumed_secs,
            ?reason,
            "Call session ended"
        );

        Ok(CallOutcome {
            consumed_secs,
            settlement,
            reason,
        })
    }

    /// Run a chat session to completion
    ///
    /// Each outbound message is deducted (or taken from the free grant)
    /// before it is handed to the transport; sends are serialized by this
    /// loop, so message N's deduction completes before message N+1's
    /// pre-flight check. A live balance watch ends the session within a
    /// bounded grace once the funding source is observed exhausted.
    pub async fn run_chat(
        &self,
        user_id: &str,
        listener_id: &str,
        decision: &FundingDecision,
        room_token: &str,
        mut commands: mpsc::Receiver<UserCommand>,
        mut balance: watch::Receiver<Wallet>,
    ) -> AppResult<ChatOutcome> {
        let mut events = self
            .transport
            .join(&decision.room_id, room_token)
            .await
            .map_err(|e| AppError::TransportConnection(e.to_string()))?;

        let (mut state, _) = transition(SessionState::Idle, SessionEvent::TransportJoined);
        let mut clock = SessionClock::new(decision.session_cap_secs);
        let char_limit = decision
            .is_free_trial()
            .then_some(self.policy.free_trial_char_limit);
        let mut meter = MessageMeter::new(char_limit);
        let mut feed_open = true;

        info!(room = %decision.room_id, "Chat session started, awaiting listener");

        let reason = loop {
            let deadline = clock
                .deadline()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400));

            tokio::select! {
                _ = time::sleep_until(deadline), if clock.started() => {
                    let (next, effect) = transition(state, SessionEvent::CapReached);
                    state = next;
                    if effect == Effect::Settle {
                        break EndReason::CapReached;
                    }
                }
                ev = events.recv() => {
                    let (event, reason) = match ev {
                        Some(TransportEvent::RemoteJoined) => (SessionEvent::RemoteJoined, None),
                        Some(TransportEvent::RemoteLeft) => {
                            (SessionEvent::RemoteLeft, Some(EndReason::RemoteLeft))
                        }
                        // Inbound messages are a UI concern, not billable.
                        Some(TransportEvent::MessageReceived { .. }) => continue,
                        Some(TransportEvent::ConnectionLost) | None => {
                            (SessionEvent::NetworkError, Some(EndReason::ConnectionLost))
                        }
                    };
                    let (next, effect) = transition(state, event);
                    state = next;
                    match effect {
                        Effect::StartBilling => clock.start(Instant::now()),
                        Effect::Settle => break reason.unwrap_or(EndReason::ConnectionLost),
                        Effect::None => {}
                    }
                }
                cmd = commands.recv() => {
                    match cmd {
                        Some(UserCommand::Send(text)) if state == SessionState::Connected => {
                            match self.preflight_chat(user_id, decision, &meter, &text).await {
                                Ok(()) => {
                                    // Billed; a delivery failure past this
                                    // point loses the message, not the books.
                                    if let Err(e) = self
                                        .transport
                                        .send_message(&decision.room_id, &text)
                                        .await
                                    {
                                        warn!("Message delivery failed after deduction: {}", e);
                                    }
                                    meter.record_sent();
                                }
                                Err(
                                    AppError::InsufficientBalance { .. }
                                    | AppError::FreeMessagesExhausted,
                                ) => {
                                    let (next, effect) =
                                        transition(state, SessionEvent::BalanceExhausted);
                                    state = next;
                                    if effect == Effect::Settle {
                                        time::sleep(BALANCE_GRACE).await;
                                        break EndReason::BalanceExhausted;
                                    }
                                }
                                Err(e) => {
                                    // Validation failures and deduction
                                    // transport errors drop the message; the
                                    // session continues.
                                    warn!("Message rejected: {}", e);
                                }
                            }
                        }
                        Some(UserCommand::Send(_)) => {
                            debug!("Dropping message sent before the listener joined");
                        }
                        Some(UserCommand::End) | None => {
                            let (next, effect) =
                                transition(state, SessionEvent::UserEndRequested);
                            state = next;
                            if effect == Effect::Settle {
                                break EndReason::UserEnded;
                            }
                        }
                    }
                }
                changed = balance.changed(), if feed_open => {
                    if changed.is_err() {
                        feed_open = false;
                        continue;
                    }
                    let wallet = balance.borrow_and_update().clone();
                    if state == SessionState::Connected
                        && self.funding_exhausted(&wallet, &decision.source)
                    {
                        let (next, effect) = transition(state, SessionEvent::BalanceExhausted);
                        state = next;
                        if effect == Effect::Settle {
                            warn!(room = %decision.room_id, "Funding source exhausted, ending chat");
                            time::sleep(BALANCE_GRACE).await;
                            break EndReason::BalanceExhausted;
                        }
                    }
                }
            }
        };

        if let Err(e) = self.transport.leave(&decision.room_id).await {
            warn!(room = %decision.room_id, "Transport leave failed: {}", e);
        }

        // Per-message deductions already happened; only the listener earning
        // remains to be recorded.
        let messages_sent = meter.consumed();
        if messages_sent > 0 {
            if let Err(e) = self
                .settlement
                .close_chat_session(user_id, listener_id, messages_sent)
                .await
            {
                warn!("Failed to record chat earning: {}", e);
            }
        }

        let (state, _) = transition(state, SessionEvent::SettlementComplete);
        debug_assert_eq!(state, SessionState::Ended);

        info!(room = %decision.room_id, messages_sent, ?reason, "Chat session ended");

        Ok(ChatOutcome {
            messages_sent,
            reason,
        })
    }

    /// Pre-flight a chat message: validate, then deduct before transmission
    async fn preflight_chat(
        &self,
        user_id: &str,
        decision: &FundingDecision,
        meter: &MessageMeter,
        text: &str,
    ) -> AppResult<()> {
        meter.validate(text)?;

        if decision.is_free_trial() {
            self.settlement.use_free_message(user_id).await?;
        } else {
            self.settlement
                .deduct_chat_usage(user_id, &decision.source, 1)
                .await?;
        }
        Ok(())
    }

    /// Whether the observed wallet can still fund the session
    fn funding_exhausted(&self, wallet: &Wallet, source: &FundingSource) -> bool {
        match source {
            FundingSource::Plan { id } => wallet
                .plan(id)
                .map(|p| p.remaining <= Decimal::ZERO || p.is_expired(chrono::Utc::now()))
                .unwrap_or(true),
            FundingSource::TokenPool => wallet.tokens < self.policy.min_chat_tokens(),
            FundingSource::FreeTrial => wallet.free_messages_remaining <= 0,
        }
    }

    /// Attempt the termination settlement, retrying once with backoff
    ///
    /// If both attempts fail the user is not billed for this session rather
    /// than risking inconsistent state.
    async fn settle_call_with_retry(
        &self,
        user_id: &str,
        listener_id: &str,
        funding: &FundingSource,
        consumed_secs: i64,
        settlement_key: &str,
    ) -> Option<CallSettlement> {
        for attempt in 1..=2 {
            match self
                .settlement
                .finalize_call(user_id, listener_id, funding, consumed_secs, settlement_key)
                .await
            {
                Ok(settlement) => return Some(settlement),
                Err(e) => {
                    warn!(attempt, "Call settlement attempt failed: {}", e);
                    if attempt == 1 {
                        time::sleep(SETTLE_RETRY_BACKOFF).await;
                    }
                }
            }
        }

        error!(
            user_id,
            settlement_key, "Settlement unreachable, absorbing unbilled consumption"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use solace_core::models::{ActivePlan, ServiceKind};
    use solace_core::traits::WalletStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    /// Scripted transport: the test feeds room events through a channel
    struct MockTransport {
        events_tx: Mutex<Option<mpsc::Sender<TransportEvent>>>,
        sent: Mutex<Vec<String>>,
        left: AtomicBool,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                events_tx: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                left: AtomicBool::new(false),
            }
        }

        async fn emit(&self, event: TransportEvent) {
            let guard = self.events_tx.lock().await;
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(event).await;
            }
        }

        async fn sent_messages(&self) -> Vec<String> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl RealtimeTransport for MockTransport {
        async fn join(
            &self,
            _room_id: &str,
            _room_token: &str,
        ) -> AppResult<mpsc::Receiver<TransportEvent>> {
            let (tx, rx) = mpsc::channel(16);
            *self.events_tx.lock().await = Some(tx);
            Ok(rx)
        }

        async fn send_message(&self, _room_id: &str, text: &str) -> AppResult<()> {
            self.sent.lock().await.push(text.to_string());
            Ok(())
        }

        async fn leave(&self, _room_id: &str) -> AppResult<()> {
            self.left.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Settlement wrapper that fails its first finalize_call
    struct FlakyOnce {
        inner: Arc<MemoryStore>,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl SettlementService for FlakyOnce {
        async fn finalize_call(
            &self,
            user_id: &str,
            listener_id: &str,
            funding: &FundingSource,
            consumed_secs: i64,
            settlement_key: &str,
        ) -> AppResult<CallSettlement> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(AppError::SettlementUnreachable("first try".to_string()));
            }
            self.inner
                .finalize_call(user_id, listener_id, funding, consumed_secs, settlement_key)
                .await
        }

        async fn deduct_chat_usage(
            &self,
            user_id: &str,
            funding: &FundingSource,
            message_count: u32,
        ) -> AppResult<solace_core::models::ChatDeduction> {
            self.inner
                .deduct_chat_usage(user_id, funding, message_count)
                .await
        }

        async fn use_free_message(&self, user_id: &str) -> AppResult<i32> {
            self.inner.use_free_message(user_id).await
        }

        async fn close_chat_session(
            &self,
            user_id: &str,
            listener_id: &str,
            consumed_messages: u32,
        ) -> AppResult<()> {
            self.inner
                .close_chat_session(user_id, listener_id, consumed_messages)
                .await
        }
    }

    async fn seeded_store(tokens: Decimal, plans: Vec<ActivePlan>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new(RatePolicy::default()));
        let mut wallet = Wallet::new("user-1".to_string(), 0);
        wallet.tokens = tokens;
        wallet.active_plans = plans;
        store.put_wallet(wallet).await;
        store
    }

    fn call_plan(remaining: Decimal) -> ActivePlan {
        let mut p = ActivePlan::new(
            ServiceKind::Call,
            "Call Pack".to_string(),
            dec!(100),
            dec!(10),
            chrono::Utc::now() - chrono::Duration::days(1),
            30,
        );
        p.remaining = remaining;
        p
    }

    /// Let spawned tasks reach their await points under paused time
    async fn settle_tasks() {
        time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_billed_from_remote_join_to_remote_left() {
        let transport = Arc::new(MockTransport::new());
        let store = seeded_store(dec!(0), vec![call_plan(dec!(10))]).await;
        let plan_id = store.fetch("user-1").await.unwrap().unwrap().active_plans[0]
            .id
            .clone();
        let orch = Arc::new(SessionOrchestrator::new(
            transport.clone(),
            store.clone(),
            RatePolicy::default(),
        ));

        let decision = FundingDecision::from_plan(ServiceKind::Call, &plan_id, "Call Pack", 3600);
        let (_cmd_tx, cmd_rx) = mpsc::channel(4);
        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.run_call("user-1", "listener-9", &decision, "token", cmd_rx)
                    .await
            })
        };

        settle_tasks().await;
        transport.emit(TransportEvent::RemoteJoined).await;
        settle_tasks().await;

        time::sleep(Duration::from_secs(125)).await;
        transport.emit(TransportEvent::RemoteLeft).await;

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.reason, EndReason::RemoteLeft);
        // 10ms of scheduling slack never crosses a second boundary here.
        assert_eq!(outcome.consumed_secs, 125);

        let settlement = outcome.settlement.unwrap();
        assert_eq!(settlement.billed_minutes, 3);

        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        assert_eq!(wallet.active_plans[0].remaining, dec!(7));
        assert!(transport.left.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_billing_while_alone_in_room() {
        let transport = Arc::new(MockTransport::new());
        let store = seeded_store(dec!(10), vec![]).await;
        let orch = Arc::new(SessionOrchestrator::new(
            transport.clone(),
            store.clone(),
            RatePolicy::default(),
        ));

        let decision = FundingDecision::from_token_pool(ServiceKind::Call, 3600);
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.run_call("user-1", "listener-9", &decision, "token", cmd_rx)
                    .await
            })
        };

        settle_tasks().await;
        // Five minutes alone in the room, then the user gives up.
        time::sleep(Duration::from_secs(300)).await;
        cmd_tx.send(UserCommand::End).await.unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.reason, EndReason::UserEnded);
        assert_eq!(outcome.consumed_secs, 0);
        assert!(outcome.settlement.is_none());

        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        assert_eq!(wallet.tokens, dec!(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_forces_termination() {
        let transport = Arc::new(MockTransport::new());
        let store = seeded_store(dec!(100), vec![]).await;
        let orch = Arc::new(SessionOrchestrator::new(
            transport.clone(),
            store.clone(),
            RatePolicy::default(),
        ));

        // 60-second ceiling for the test.
        let mut decision = FundingDecision::from_token_pool(ServiceKind::Call, 3600);
        decision.session_cap_secs = 60;

        let (_cmd_tx, cmd_rx) = mpsc::channel(4);
        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.run_call("user-1", "listener-9", &decision, "token", cmd_rx)
                    .await
            })
        };

        settle_tasks().await;
        transport.emit(TransportEvent::RemoteJoined).await;

        // No one hangs up; the ceiling fires.
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.reason, EndReason::CapReached);
        assert_eq!(outcome.consumed_secs, 60);
        assert_eq!(outcome.settlement.unwrap().billed_minutes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_settles_partial_consumption() {
        let transport = Arc::new(MockTransport::new());
        let store = seeded_store(dec!(10), vec![]).await;
        let orch = Arc::new(SessionOrchestrator::new(
            transport.clone(),
            store.clone(),
            RatePolicy::default(),
        ));

        let decision = FundingDecision::from_token_pool(ServiceKind::Call, 3600);
        let (_cmd_tx, cmd_rx) = mpsc::channel(4);
        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.run_call("user-1", "listener-9", &decision, "token", cmd_rx)
                    .await
            })
        };

        settle_tasks().await;
        transport.emit(TransportEvent::RemoteJoined).await;
        settle_tasks().await;
        time::sleep(Duration::from_secs(45)).await;
        transport.emit(TransportEvent::ConnectionLost).await;

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.reason, EndReason::ConnectionLost);
        assert_eq!(outcome.consumed_secs, 45);
        // 45s bills one ceiling minute: 2 tokens.
        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        assert_eq!(wallet.tokens, dec!(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settlement_retried_after_network_failure() {
        let transport = Arc::new(MockTransport::new());
        let store = seeded_store(dec!(10), vec![]).await;
        let flaky = Arc::new(FlakyOnce {
            inner: store.clone(),
            tripped: AtomicBool::new(false),
        });
        let orch = Arc::new(SessionOrchestrator::new(
            transport.clone(),
            flaky,
            RatePolicy::default(),
        ));

        let decision = FundingDecision::from_token_pool(ServiceKind::Call, 3600);
        let (_cmd_tx, cmd_rx) = mpsc::channel(4);
        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.run_call("user-1", "listener-9", &decision, "token", cmd_rx)
                    .await
            })
        };

        settle_tasks().await;
        transport.emit(TransportEvent::RemoteJoined).await;
        settle_tasks().await;
        time::sleep(Duration::from_secs(90)).await;
        transport.emit(TransportEvent::RemoteLeft).await;

        let outcome = handle.await.unwrap().unwrap();
        // First attempt failed, the retry landed.
        assert!(outcome.settlement.is_some());
        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        assert_eq!(wallet.tokens, dec!(6));
    }

    fn chat_decision() -> FundingDecision {
        FundingDecision::from_token_pool(ServiceKind::Chat, 10800)
    }

    fn balance_watch(wallet: Wallet) -> (watch::Sender<Wallet>, watch::Receiver<Wallet>) {
        watch::channel(wallet)
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_preflight_blocks_unfunded_message() {
        // 0.4 tokens cannot fund a 0.5-token message: nothing transmitted.
        let transport = Arc::new(MockTransport::new());
        let store = seeded_store(dec!(0.4), vec![]).await;
        let orch = Arc::new(SessionOrchestrator::new(
            transport.clone(),
            store.clone(),
            RatePolicy::default(),
        ));

        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        let (_balance_tx, balance_rx) = balance_watch(wallet);
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let decision = chat_decision();
        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.run_chat("user-1", "listener-9", &decision, "token", cmd_rx, balance_rx)
                    .await
            })
        };

        settle_tasks().await;
        transport.emit(TransportEvent::RemoteJoined).await;
        settle_tasks().await;
        cmd_tx
            .send(UserCommand::Send("hello".to_string()))
            .await
            .unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.reason, EndReason::BalanceExhausted);
        assert_eq!(outcome.messages_sent, 0);
        assert!(transport.sent_messages().await.is_empty());

        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        assert_eq!(wallet.tokens, dec!(0.4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_messages_deducted_then_sent() {
        let transport = Arc::new(MockTransport::new());
        let store = seeded_store(dec!(2), vec![]).await;
        let orch = Arc::new(SessionOrchestrator::new(
            transport.clone(),
            store.clone(),
            RatePolicy::default(),
        ));

        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        let (_balance_tx, balance_rx) = balance_watch(wallet);
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let decision = chat_decision();
        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.run_chat("user-1", "listener-9", &decision, "token", cmd_rx, balance_rx)
                    .await
            })
        };

        settle_tasks().await;
        transport.emit(TransportEvent::RemoteJoined).await;
        settle_tasks().await;

        cmd_tx.send(UserCommand::Send("first".to_string())).await.unwrap();
        cmd_tx.send(UserCommand::Send("second".to_string())).await.unwrap();
        settle_tasks().await;
        cmd_tx.send(UserCommand::End).await.unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.messages_sent, 2);
        assert_eq!(
            transport.sent_messages().await,
            vec!["first".to_string(), "second".to_string()]
        );

        // Two messages at 0.5 token each.
        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        assert_eq!(wallet.tokens, dec!(1.0));

        // Chat earning recorded at session close.
        let earnings = store.earnings().await;
        assert_eq!(earnings.len(), 1);
        assert_eq!(earnings[0].units, dec!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_trial_never_billed_and_char_capped() {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new(RatePolicy::default()));
        let mut wallet = Wallet::new("user-1".to_string(), 2);
        wallet.tokens = dec!(5);
        store.put_wallet(wallet.clone()).await;
        let orch = Arc::new(SessionOrchestrator::new(
            transport.clone(),
            store.clone(),
            RatePolicy::default(),
        ));

        let (_balance_tx, balance_rx) = balance_watch(wallet);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let decision = FundingDecision::free_trial(10800);
        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.run_chat("user-1", "listener-9", &decision, "token", cmd_rx, balance_rx)
                    .await
            })
        };

        settle_tasks().await;
        transport.emit(TransportEvent::RemoteJoined).await;
        settle_tasks().await;

        // Over the 75-character cap: rejected, session continues.
        cmd_tx
            .send(UserCommand::Send("x".repeat(80)))
            .await
            .unwrap();
        cmd_tx.send(UserCommand::Send("short one".to_string())).await.unwrap();
        cmd_tx.send(UserCommand::Send("another".to_string())).await.unwrap();
        // Third free message does not exist; the grant is exhausted.
        cmd_tx.send(UserCommand::Send("one too many".to_string())).await.unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.reason, EndReason::BalanceExhausted);
        assert_eq!(outcome.messages_sent, 2);

        // Tokens untouched: free trial sessions are never billed.
        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        assert_eq!(wallet.tokens, dec!(5));
        assert_eq!(wallet.free_messages_remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_depletion_ends_chat_within_grace() {
        // Another device drains the same token pool; the watch ends this
        // session after the grace window.
        let transport = Arc::new(MockTransport::new());
        let store = seeded_store(dec!(5), vec![]).await;
        let orch = Arc::new(SessionOrchestrator::new(
            transport.clone(),
            store.clone(),
            RatePolicy::default(),
        ));

        let wallet = store.fetch("user-1").await.unwrap().unwrap();
        let (balance_tx, balance_rx) = balance_watch(wallet.clone());
        let (_cmd_tx, cmd_rx) = mpsc::channel(4);
        let decision = chat_decision();
        let handle = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.run_chat("user-1", "listener-9", &decision, "token", cmd_rx, balance_rx)
                    .await
            })
        };

        settle_tasks().await;
        transport.emit(TransportEvent::RemoteJoined).await;
        settle_tasks().await;

        let mut depleted = wallet;
        depleted.tokens = dec!(0);
        balance_tx.send(depleted).unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.reason, EndReason::BalanceExhausted);
    }
}

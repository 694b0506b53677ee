use std::fmt::Debug;

use log::*;
use xge_common::Idr;

use crate::{
    audit::AuditEntry,
    db::{
        common::{BatchBillOutcome, InsertTransactionResult, SettleOutcome},
        traits::ExchangerDatabase,
    },
    db_types::{
        account_info_snapshot,
        Actor,
        ChatId,
        NewTransaction,
        Role,
        Transaction,
        TransactionStatus,
        TxNumber,
        NIGHT_ACCOUNT_INFO,
        REFUND_ACCOUNT_INFO,
    },
    helpers::{bali_now, bali_now_naive, MessageRef},
    notify::Notifier,
    selector::{quote, Quote, SelectorConfig},
    xge_api::OrderFlowError,
};

/// Result of taking a new order: the stored row plus the quote that priced it.
#[derive(Debug, Clone)]
pub struct OrderCreated {
    pub transaction: Transaction,
    pub quote: Quote,
}

impl OrderCreated {
    pub fn is_night_request(&self) -> bool {
        self.transaction.status == TransactionStatus::Night
    }
}

/// `OrderFlowApi` is the primary API for moving exchange orders through their lifecycle in response
/// to client and operator intents arriving from the chat dispatcher.
///
/// Role checks happen here, against the [`Actor`] the dispatcher hands in. The store below only
/// ever sees guarded status moves, so a failed check never leaves partial state behind.
pub struct OrderFlowApi<B, N> {
    db: B,
    notifier: N,
    selector_config: SelectorConfig,
    settle_tolerance: Idr,
}

impl<B, N> Debug for OrderFlowApi<B, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, N> OrderFlowApi<B, N> {
    pub fn new(db: B, notifier: N) -> Self {
        Self { db, notifier, selector_config: SelectorConfig::default(), settle_tolerance: Idr::from(1_000) }
    }

    pub fn with_selector_config(mut self, config: SelectorConfig) -> Self {
        self.selector_config = config;
        self
    }

    pub fn with_settle_tolerance(mut self, tolerance: Idr) -> Self {
        self.settle_tolerance = tolerance;
        self
    }
}

impl<B, N> OrderFlowApi<B, N>
where
    B: ExchangerDatabase,
    N: Notifier,
{
    /// Prices an amount against the current rate card, tier limits and payout accounts.
    pub async fn quote_amount(&self, amount: Idr) -> Result<Quote, OrderFlowError> {
        let rates = self.db.fetch_actual_rates().await.map_err(OrderFlowError::db)?.ok_or(OrderFlowError::NoActualRates)?;
        let limits = self.db.fetch_rate_limits().await.map_err(OrderFlowError::db)?.ok_or(OrderFlowError::NoRateLimits)?;
        let accounts = self.db.fetch_accounts().await.map_err(OrderFlowError::db)?;
        Ok(quote(amount, &rates, &limits, &accounts, &self.selector_config)?)
    }

    /// Takes a new order from a partner chat.
    ///
    /// The amount is priced through the selector and the result stored with an immutable snapshot
    /// of the quoted payout accounts. Outside shift hours the order is recorded as a terminal
    /// `night` enquiry instead, and the staff channel is told about it.
    pub async fn create_order(
        &self,
        actor: &Actor,
        origin: &MessageRef,
        amount: Idr,
        note: Option<&str>,
    ) -> Result<OrderCreated, OrderFlowError> {
        let quote = self.quote_amount(amount).await?;
        let night = self.is_night_now().await?;
        let status = if night { TransactionStatus::Night } else { TransactionStatus::Created };
        let account_info = if night {
            NIGHT_ACCOUNT_INFO.to_string()
        } else if quote.is_refund() {
            REFUND_ACCOUNT_INFO.to_string()
        } else {
            account_info_snapshot(&quote.eligible_accounts)
        };
        let now = bali_now();
        let number = crate::helpers::allocate_tx_number(now, actor.id, origin.message_id);
        let entry = AuditEntry::new(bali_now_naive(), &actor.display, status.to_string(), origin.permalink());
        let new_tx = NewTransaction {
            transaction_number: number.clone(),
            user_id: actor.id,
            created_at: now.naive_local(),
            idr_amount: amount,
            rate_used: quote.used_rate,
            rub_amount: quote.rub_amount,
            account_info,
            status,
            history: entry.encode(),
            source_chat: origin.chat,
        };
        match self.db.insert_transaction(new_tx).await.map_err(OrderFlowError::db)? {
            InsertTransactionResult::Inserted(id) => {
                debug!("🔄️📦️ Order {number} stored with id {id} ({amount}, status {status})")
            },
            InsertTransactionResult::AlreadyExists(_) => {
                return Err(OrderFlowError::DuplicateTransaction { number });
            },
        }
        let transaction = self.fetch_required(&number).await?;
        if night {
            self.notifier
                .notify_admins(&format!("🌙 Night enquiry {number}: {amount} ≈ {}", quote.rub_amount))
                .await;
        }
        if let Some(note) = note {
            self.db.set_note(&number, note).await.map_err(OrderFlowError::db)?;
        }
        Ok(OrderCreated { transaction, quote })
    }

    /// The client reports payment: the order moves to `control` and the chat's control counter is
    /// bumped so operators can see how much review work is queued. An optional note (payment
    /// reference, sender name) is stored on the order.
    pub async fn request_control(
        &self,
        actor: &Actor,
        origin: &MessageRef,
        number: &TxNumber,
        note: Option<&str>,
    ) -> Result<Transaction, OrderFlowError> {
        let tx = self
            .transition(number, &[TransactionStatus::Created], TransactionStatus::Control, actor, origin)
            .await?;
        if let Some(note) = note {
            self.db.set_note(number, note).await.map_err(OrderFlowError::db)?;
        }
        let pending =
            self.db.increment_control_counter(tx.source_chat).await.map_err(OrderFlowError::db)?;
        let message = format!(
            "🛂 Order {number} awaits review ({}). {pending} pending in chat {}",
            tx.idr_amount, tx.source_chat
        );
        self.notifier.notify_role(Role::Operator, &message).await;
        self.notifier.notify_admins(&message).await;
        Ok(tx)
    }

    /// An operator confirms the payment evidence. Requires the operator role.
    pub async fn accept_order(
        &self,
        actor: &Actor,
        origin: &MessageRef,
        number: &TxNumber,
        crm_number: Option<&str>,
    ) -> Result<Transaction, OrderFlowError> {
        require(actor, Role::Operator)?;
        let tx = self
            .transition(number, &[TransactionStatus::Control], TransactionStatus::Accept, actor, origin)
            .await?;
        self.drop_control_counter(&tx).await?;
        if let Some(crm) = crm_number {
            self.db.set_crm_number(number, crm).await.map_err(OrderFlowError::db)?;
        }
        debug!("🔄️✅️ Order {number} accepted by {}", actor.display);
        Ok(tx)
    }

    /// Legacy direct acceptance, skipping the `control` step. Opt-in for desks that take payment
    /// evidence out of band. Works from `created` and from `timeout`, so a swept order whose
    /// payment turns up late is accepted in one move instead of revive-then-accept. The control
    /// counter is untouched since it was never incremented.
    pub async fn accept_order_direct(
        &self,
        actor: &Actor,
        origin: &MessageRef,
        number: &TxNumber,
    ) -> Result<Transaction, OrderFlowError> {
        require(actor, Role::Operator)?;
        self.transition(
            number,
            &[TransactionStatus::Created, TransactionStatus::Timeout],
            TransactionStatus::Accept,
            actor,
            origin,
        )
        .await
    }

    /// Groups a chat's accepted orders into one invoice. Requires the admin role. The whole batch
    /// moves atomically; an empty accept set is a quiet no-op.
    pub async fn batch_bill(
        &self,
        actor: &Actor,
        origin: &MessageRef,
        chat: ChatId,
    ) -> Result<BatchBillOutcome, OrderFlowError> {
        require(actor, Role::Admin)?;
        let entry = self.entry_for(actor, origin, TransactionStatus::Bill);
        let outcome = self.db.bill_accepted(chat, &entry, bali_now_naive()).await.map_err(OrderFlowError::db)?;
        if !outcome.is_empty() {
            self.notifier
                .notify_admins(&format!(
                    "🧾 Invoice raised for chat {chat}: {} orders, {} / {}",
                    outcome.transactions.len(),
                    outcome.total_idr,
                    outcome.total_rub
                ))
                .await;
        }
        Ok(outcome)
    }

    /// Reconciles a chat's invoice against the payout the admin reports. Within tolerance the
    /// whole invoice settles to `accounted`; otherwise nothing changes and the mismatch is
    /// surfaced.
    pub async fn confirm_transfer(
        &self,
        actor: &Actor,
        origin: &MessageRef,
        chat: ChatId,
        reported_total: Idr,
    ) -> Result<SettleOutcome, OrderFlowError> {
        require(actor, Role::Admin)?;
        let entry = self.entry_for(actor, origin, TransactionStatus::Accounted);
        let outcome = self
            .db
            .settle_billed(chat, reported_total, self.settle_tolerance, &entry, bali_now_naive())
            .await
            .map_err(OrderFlowError::db)?;
        match &outcome {
            SettleOutcome::Settled { transactions, total_idr } => {
                self.notifier
                    .notify_admins(&format!("✅ Invoice settled: {} orders for {total_idr}", transactions.len()))
                    .await;
            },
            SettleOutcome::Mismatch { expected, reported } => {
                warn!("🔄️⚠️ Invoice mismatch: expected {expected}, reported {reported}");
                self.notifier
                    .notify_admins(&format!(
                        "⚠️ Invoice NOT settled: expected {expected}, reported {reported}"
                    ))
                    .await;
            },
        }
        Ok(outcome)
    }

    /// Brings an archived order back to life. Requires the admin role.
    pub async fn revive_order(
        &self,
        actor: &Actor,
        origin: &MessageRef,
        number: &TxNumber,
    ) -> Result<Transaction, OrderFlowError> {
        require(actor, Role::Admin)?;
        self.transition(number, &[TransactionStatus::Timeout], TransactionStatus::Created, actor, origin).await
    }

    /// Cancels an order from any non-terminal state. Requires the superadmin role. Cancelling an
    /// order that sat in `control` releases its slot in the chat's control counter.
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        origin: &MessageRef,
        number: &TxNumber,
    ) -> Result<Transaction, OrderFlowError> {
        require(actor, Role::SuperAdmin)?;
        let current = self.fetch_required(number).await?;
        if current.status.is_terminal() {
            return Err(OrderFlowError::InvalidTransition {
                number: number.clone(),
                status: current.status,
                attempted: TransactionStatus::Cancel,
            });
        }
        let was_control = current.status == TransactionStatus::Control;
        let tx = self.transition(number, &[current.status], TransactionStatus::Cancel, actor, origin).await?;
        if was_control {
            self.drop_control_counter(&tx).await?;
        }
        info!("🔄️❌️ Order {number} cancelled by {}", actor.display);
        Ok(tx)
    }

    /// Administrative override: forces an order into `target` regardless of the transition table.
    /// Requires the superadmin role. Moves into or out of `control` keep the counter honest.
    pub async fn change_status(
        &self,
        actor: &Actor,
        origin: &MessageRef,
        number: &TxNumber,
        target: TransactionStatus,
    ) -> Result<Transaction, OrderFlowError> {
        require(actor, Role::SuperAdmin)?;
        let current = self.fetch_required(number).await?;
        if current.status == target {
            return Err(OrderFlowError::InvalidTransition {
                number: number.clone(),
                status: current.status,
                attempted: target,
            });
        }
        let from_control = current.status == TransactionStatus::Control;
        let tx = self.transition(number, &[current.status], target, actor, origin).await?;
        if from_control {
            self.drop_control_counter(&tx).await?;
        }
        if target == TransactionStatus::Control {
            self.db.increment_control_counter(tx.source_chat).await.map_err(OrderFlowError::db)?;
        }
        warn!("🔄️🔧 Order {number} forced from {} to {target} by {}", current.status, actor.display);
        Ok(tx)
    }

    /// Attaches or replaces the free-form note. Requires the operator role.
    pub async fn set_note(&self, actor: &Actor, number: &TxNumber, note: &str) -> Result<(), OrderFlowError> {
        require(actor, Role::Operator)?;
        let updated = self.db.set_note(number, note).await.map_err(OrderFlowError::db)?;
        if !updated {
            return Err(OrderFlowError::TransactionNotFound(number.clone()));
        }
        Ok(())
    }

    /// Attaches or replaces the CRM reference. Requires the operator role.
    pub async fn set_crm_number(&self, actor: &Actor, number: &TxNumber, crm: &str) -> Result<(), OrderFlowError> {
        require(actor, Role::Operator)?;
        let updated = self.db.set_crm_number(number, crm).await.map_err(OrderFlowError::db)?;
        if !updated {
            return Err(OrderFlowError::TransactionNotFound(number.clone()));
        }
        Ok(())
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    /// Guarded status move plus audit entry. A guard miss is turned into the precise error: either
    /// the row is missing, or it sits in a status the move is not legal from.
    async fn transition(
        &self,
        number: &TxNumber,
        expected: &[TransactionStatus],
        target: TransactionStatus,
        actor: &Actor,
        origin: &MessageRef,
    ) -> Result<Transaction, OrderFlowError> {
        let entry = self.entry_for(actor, origin, target);
        let moved = self
            .db
            .transition_transaction(number, expected, target, &entry, bali_now_naive())
            .await
            .map_err(OrderFlowError::db)?;
        match moved {
            Some(tx) => Ok(tx),
            None => {
                let current = self.fetch_required(number).await?;
                Err(OrderFlowError::InvalidTransition {
                    number: number.clone(),
                    status: current.status,
                    attempted: target,
                })
            },
        }
    }

    async fn fetch_required(&self, number: &TxNumber) -> Result<Transaction, OrderFlowError> {
        self.db
            .fetch_transaction(number)
            .await
            .map_err(OrderFlowError::db)?
            .ok_or_else(|| OrderFlowError::TransactionNotFound(number.clone()))
    }

    async fn drop_control_counter(&self, tx: &Transaction) -> Result<(), OrderFlowError> {
        let dec = self.db.decrement_control_counter(tx.source_chat).await.map_err(OrderFlowError::db)?;
        if dec.anomaly {
            self.notifier
                .notify_admins(&format!(
                    "⚠️ Control counter for chat {} hit zero out of turn (order {})",
                    tx.source_chat, tx.transaction_number
                ))
                .await;
        }
        Ok(())
    }

    fn entry_for(&self, actor: &Actor, origin: &MessageRef, target: TransactionStatus) -> AuditEntry {
        AuditEntry::new(bali_now_naive(), &actor.display, target.to_string(), origin.permalink())
    }

    async fn is_night_now(&self) -> Result<bool, OrderFlowError> {
        let settings = self.db.fetch_shift_settings().await.map_err(OrderFlowError::db)?;
        match settings {
            Some(s) => Ok(s.is_night(bali_now().time())),
            // With no shift window configured the desk never sleeps.
            None => Ok(false),
        }
    }
}

fn require(actor: &Actor, required: Role) -> Result<(), OrderFlowError> {
    if actor.role.at_least(required) {
        Ok(())
    } else {
        Err(OrderFlowError::Forbidden { actor: actor.display.clone(), required })
    }
}

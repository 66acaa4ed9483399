//! The payment-transaction state machine.
//!
//! `PaymentFlowApi` is the only way transaction statuses change. Each method names the status
//! it expects the transaction to be in; the backend enforces that expectation atomically
//! (compare-and-set), so an out-of-order call or a racing webhook loses cleanly with an
//! [`IllegalStatusChange`](PaymentGatewayError::IllegalStatusChange) instead of corrupting the
//! machine.

use std::fmt::Debug;

use log::*;
use uuid::Uuid;

use crate::{
    db_types::{
        NewOrder,
        NewPaymentTransaction,
        Order,
        OrderStatusType,
        PaymentStatus,
        PaymentTransaction,
        TransactionUpdate,
    },
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// What a webhook notification did to the transaction.
#[derive(Debug, Clone)]
pub enum NotificationOutcome {
    /// The transaction was already terminal; the duplicate notification changed nothing.
    AlreadyFinal(PaymentTransaction),
    /// The transaction reached a terminal status and the owning order was updated with it.
    Finalized { transaction: PaymentTransaction, order: Order },
}

pub struct PaymentFlowApi<B> {
    db: B,
}

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B> PaymentFlowApi<B>
where B: PaymentGatewayDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn create_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let order = self.db.insert_order(order).await?;
        debug!("🔄️📦️ Order {} ({}) created for user #{}", order.number, order.public_id, order.user_id);
        Ok(order)
    }

    /// The order with this public id, if it belongs to the user. Foreign orders are
    /// indistinguishable from missing ones.
    pub async fn order_for_user(&self, public_id: &str, user_id: i64) -> Result<Order, PaymentGatewayError> {
        self.db
            .fetch_order_for_user(public_id, user_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(public_id.to_string()))
    }

    /// Start a charge for an order.
    ///
    /// The order must still be awaiting payment. If a live (non-terminal) transaction already
    /// exists it is returned with `false` — initiating twice is not an error and mints no new
    /// shop transaction id. Otherwise a `Pending` transaction is created with a fresh, unique
    /// shop transaction id and returned with `true`.
    pub async fn begin_charge(
        &self,
        order: &Order,
        request_payload: String,
    ) -> Result<(PaymentTransaction, bool), PaymentGatewayError> {
        if order.status != OrderStatusType::PendingPayment {
            return Err(PaymentGatewayError::OrderNotPayable(order.status));
        }
        if let Some(live) = self.db.fetch_live_transaction_for_order(order.id).await? {
            debug!("🔄️💳️ Order {} already has live transaction [{}]", order.number, live.shop_transaction_id);
            return Ok((live, false));
        }
        let shop_transaction_id = format!("{}-{}", order.number, &Uuid::new_v4().simple().to_string()[..8]);
        let transaction = self
            .db
            .insert_transaction(NewPaymentTransaction {
                order_id: order.id,
                shop_transaction_id,
                amount: order.total_amount,
                currency: order.currency.clone(),
                request_payload,
            })
            .await?;
        debug!("🔄️💳️ Transaction [{}] created for order {}", transaction.shop_transaction_id, order.number);
        Ok((transaction, true))
    }

    /// The gateway registered the charge: `Pending → Prepared`, storing the gateway's
    /// transaction id.
    pub async fn mark_prepared(
        &self,
        transaction_id: i64,
        octo_transaction_id: &str,
        response_payload: String,
    ) -> Result<PaymentTransaction, PaymentGatewayError> {
        let update = TransactionUpdate {
            octo_transaction_id: Some(octo_transaction_id.to_string()),
            response_payload: Some(response_payload),
            ..TransactionUpdate::default()
        };
        let tx = self
            .db
            .transition_transaction(transaction_id, PaymentStatus::Pending, PaymentStatus::Prepared, update)
            .await?;
        debug!("🔄️💳️ Transaction [{}] prepared as gateway tx {octo_transaction_id}", tx.shop_transaction_id);
        Ok(tx)
    }

    /// The gateway wants cardholder verification: `Prepared → VerificationRequired`.
    pub async fn mark_verification_required(
        &self,
        transaction_id: i64,
        octo_payment_id: Option<String>,
        verification_url: Option<String>,
        seconds_left: Option<i64>,
        response_payload: String,
    ) -> Result<PaymentTransaction, PaymentGatewayError> {
        let update = TransactionUpdate {
            octo_payment_id,
            verification_url,
            seconds_left,
            response_payload: Some(response_payload),
            ..TransactionUpdate::default()
        };
        let tx = self
            .db
            .transition_transaction(
                transaction_id,
                PaymentStatus::Prepared,
                PaymentStatus::VerificationRequired,
                update,
            )
            .await?;
        debug!("🔄️💳️ Transaction [{}] awaiting cardholder verification", tx.shop_transaction_id);
        Ok(tx)
    }

    /// The charge was handed off for capture: `expected_current → Processing`. The caller names
    /// the state it saw (`Prepared` on immediate approval, `VerificationRequired` after an
    /// accepted SMS key); anything else is rejected.
    pub async fn mark_processing(
        &self,
        transaction_id: i64,
        expected_current: PaymentStatus,
        response_payload: String,
    ) -> Result<PaymentTransaction, PaymentGatewayError> {
        let update =
            TransactionUpdate { response_payload: Some(response_payload), ..TransactionUpdate::default() };
        let tx = self
            .db
            .transition_transaction(transaction_id, expected_current, PaymentStatus::Processing, update)
            .await?;
        debug!("🔄️💳️ Transaction [{}] is processing. Awaiting webhook.", tx.shop_transaction_id);
        Ok(tx)
    }

    /// The gateway rejected the charge outright: `expected_current → Failed`, recording the
    /// gateway's error code and message. The owning order is left untouched so the shopper can
    /// start a fresh attempt.
    pub async fn mark_failed(
        &self,
        transaction_id: i64,
        expected_current: PaymentStatus,
        error_code: Option<String>,
        error_message: Option<String>,
        response_payload: String,
    ) -> Result<PaymentTransaction, PaymentGatewayError> {
        let update = TransactionUpdate {
            error_code,
            error_message,
            response_payload: Some(response_payload),
            ..TransactionUpdate::default()
        };
        let tx =
            self.db.transition_transaction(transaction_id, expected_current, PaymentStatus::Failed, update).await?;
        warn!("🔄️💳️ Transaction [{}] failed at the gateway", tx.shop_transaction_id);
        Ok(tx)
    }

    /// Record a gateway exchange that changed nothing about the status, e.g. a rejected SMS key
    /// attempt. Keeps the audit payloads current.
    pub async fn record_exchange(
        &self,
        transaction_id: i64,
        request_payload: Option<String>,
        response_payload: Option<String>,
    ) -> Result<PaymentTransaction, PaymentGatewayError> {
        let update = TransactionUpdate { request_payload, response_payload, ..TransactionUpdate::default() };
        self.db.record_exchange(transaction_id, update).await
    }

    /// Apply a webhook notification from the gateway.
    ///
    /// The results, by current transaction status and reported outcome:
    ///
    /// | Current \ Reported   | Success | Failed | Cancelled |
    /// |----------------------|---------|--------|-----------|
    /// | Pending              | Err     | ✓      | ✓         |
    /// | Prepared             | Err     | ✓      | ✓         |
    /// | VerificationRequired | Err     | ✓      | ✓         |
    /// | Processing           | ✓       | ✓      | ✓         |
    /// | terminal             | no-op   | no-op  | no-op     |
    ///
    /// A `Success` report requires the transaction to have passed through the full
    /// `Prepared`/`Processing` path; anything else is an illegal transition. Failure and
    /// cancellation reports are accepted from any live state (the gateway expires charges that
    /// never confirmed). Duplicate notifications for an already-terminal transaction are
    /// idempotent no-ops.
    ///
    /// The transaction's terminal write and the owning order's status update happen in a single
    /// database transaction: `Success` marks the order `PaymentConfirmed` (stamping `paid_at`),
    /// `Failed` marks it `PaymentFailed`, `Cancelled` cancels it.
    pub async fn apply_notification(
        &self,
        gateway_id: &str,
        reported: PaymentStatus,
        error_code: Option<String>,
        error_message: Option<String>,
        raw_payload: String,
    ) -> Result<NotificationOutcome, PaymentGatewayError> {
        if !reported.is_terminal() {
            return Err(PaymentGatewayError::IllegalStatusChange {
                current: reported,
                requested: reported,
            });
        }
        let tx = self
            .db
            .fetch_transaction_by_gateway_id(gateway_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::TransactionNotFound(gateway_id.to_string()))?;
        if tx.status.is_terminal() {
            info!(
                "🔄️💳️ Duplicate notification for terminal transaction [{}] ({}). Ignoring.",
                tx.shop_transaction_id, tx.status
            );
            return Ok(NotificationOutcome::AlreadyFinal(tx));
        }
        if reported == PaymentStatus::Success && tx.status != PaymentStatus::Processing {
            return Err(PaymentGatewayError::IllegalStatusChange { current: tx.status, requested: reported });
        }
        let order_status = match reported {
            PaymentStatus::Success => OrderStatusType::PaymentConfirmed,
            PaymentStatus::Cancelled => OrderStatusType::Cancelled,
            _ => OrderStatusType::PaymentFailed,
        };
        let update = TransactionUpdate {
            error_code,
            error_message,
            response_payload: Some(raw_payload),
            ..TransactionUpdate::default()
        };
        let (transaction, order) =
            self.db.finalize_transaction(tx.id, tx.status, reported, order_status, update).await?;
        info!(
            "🔄️💳️ Transaction [{}] finalized as {}. Order {} is now {}",
            transaction.shop_transaction_id, transaction.status, order.number, order.status
        );
        Ok(NotificationOutcome::Finalized { transaction, order })
    }

    /// The latest transaction for the order, terminal or not. `None` means no payment was ever
    /// attempted.
    pub async fn latest_transaction(&self, order_id: i64) -> Result<Option<PaymentTransaction>, PaymentGatewayError> {
        self.db.fetch_latest_transaction_for_order(order_id).await
    }

    /// The transaction for this order with the given gateway transaction id.
    pub async fn transaction_for_order(
        &self,
        order_id: i64,
        octo_transaction_id: &str,
    ) -> Result<PaymentTransaction, PaymentGatewayError> {
        self.db
            .fetch_transaction_for_order(order_id, octo_transaction_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::TransactionNotFound(octo_transaction_id.to_string()))
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

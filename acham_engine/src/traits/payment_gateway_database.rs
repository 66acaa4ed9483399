use thiserror::Error;

use crate::db_types::{
    NewOrder,
    NewPaymentTransaction,
    Order,
    OrderStatusType,
    PaymentStatus,
    PaymentTransaction,
    TransactionUpdate,
};

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} not found")]
    OrderNotFound(String),
    #[error("Order id {0} not found")]
    OrderIdNotFound(i64),
    #[error("Payment transaction {0} not found")]
    TransactionNotFound(String),
    #[error("Cannot move a payment transaction from {current} to {requested}")]
    IllegalStatusChange { current: PaymentStatus, requested: PaymentStatus },
    #[error("The order is not awaiting payment (current status: {0})")]
    OrderNotPayable(OrderStatusType),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}

/// Storage contract for orders and the payment-transaction state machine.
///
/// Status changes go through [`transition_transaction`](Self::transition_transaction) /
/// [`finalize_transaction`](Self::finalize_transaction), which compare-and-set on the expected
/// current status so that concurrent webhook deliveries and status polls cannot race a
/// transaction into an illegal state.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    /// The order with this public id, but only if it belongs to `user_id`.
    async fn fetch_order_for_user(&self, public_id: &str, user_id: i64) -> Result<Option<Order>, PaymentGatewayError>;

    async fn insert_transaction(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, PaymentGatewayError>;

    /// The non-terminal transaction for the order, if one exists. At most one is ever live.
    async fn fetch_live_transaction_for_order(
        &self,
        order_id: i64,
    ) -> Result<Option<PaymentTransaction>, PaymentGatewayError>;

    /// The most recently created transaction for the order, terminal or not.
    async fn fetch_latest_transaction_for_order(
        &self,
        order_id: i64,
    ) -> Result<Option<PaymentTransaction>, PaymentGatewayError>;

    /// Look up a transaction for an order by the gateway's transaction id.
    async fn fetch_transaction_for_order(
        &self,
        order_id: i64,
        octo_transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentGatewayError>;

    /// Look up a transaction by the gateway's transaction id, falling back to the locally
    /// generated shop transaction id. Used by the webhook, which has no order context.
    async fn fetch_transaction_by_gateway_id(
        &self,
        gateway_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentGatewayError>;

    /// Compare-and-set status change: the row is updated only if its status still equals
    /// `expected_current`. On a lost race the error reports the actual current status.
    async fn transition_transaction(
        &self,
        transaction_id: i64,
        expected_current: PaymentStatus,
        new_status: PaymentStatus,
        update: TransactionUpdate,
    ) -> Result<PaymentTransaction, PaymentGatewayError>;

    /// Record gateway request/response payloads without changing status (e.g. a rejected SMS
    /// key attempt).
    async fn record_exchange(
        &self,
        transaction_id: i64,
        update: TransactionUpdate,
    ) -> Result<PaymentTransaction, PaymentGatewayError>;

    /// Move a transaction to a terminal status and update the owning order accordingly, in a
    /// single database transaction. Compare-and-set semantics as for
    /// [`transition_transaction`](Self::transition_transaction).
    async fn finalize_transaction(
        &self,
        transaction_id: i64,
        expected_current: PaymentStatus,
        final_status: PaymentStatus,
        order_status: OrderStatusType,
        update: TransactionUpdate,
    ) -> Result<(PaymentTransaction, Order), PaymentGatewayError>;
}

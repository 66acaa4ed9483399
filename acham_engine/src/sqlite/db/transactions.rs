use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewPaymentTransaction, PaymentStatus, PaymentTransaction, TransactionUpdate},
    traits::PaymentGatewayError,
};

pub async fn insert_transaction(
    transaction: NewPaymentTransaction,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, PaymentGatewayError> {
    let tx: PaymentTransaction = sqlx::query_as(
        r#"
            INSERT INTO payment_transactions (
                order_id,
                shop_transaction_id,
                amount,
                currency,
                request_payload
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(transaction.order_id)
    .bind(&transaction.shop_transaction_id)
    .bind(transaction.amount.value())
    .bind(&transaction.currency)
    .bind(&transaction.request_payload)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Transaction [{}] inserted with id {}", tx.shop_transaction_id, tx.id);
    Ok(tx)
}

pub async fn fetch_transaction_by_id(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_transactions WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// The non-terminal transaction for the order, if any.
pub async fn fetch_live_transaction_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM payment_transactions
            WHERE order_id = $1 AND status NOT IN ('Success', 'Failed', 'Cancelled')
            ORDER BY created_at DESC
            LIMIT 1
        "#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_latest_transaction_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_transactions WHERE order_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1")
        .bind(order_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_transaction_for_order(
    order_id: i64,
    octo_transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_transactions WHERE order_id = $1 AND octo_transaction_id = $2")
        .bind(order_id)
        .bind(octo_transaction_id)
        .fetch_optional(conn)
        .await
}

/// Looks up by the gateway's transaction id first, falling back to the shop transaction id.
/// Webhook payloads have carried either, depending on the gateway version.
pub async fn fetch_transaction_by_gateway_id(
    gateway_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM payment_transactions
            WHERE octo_transaction_id = $1 OR shop_transaction_id = $1
            ORDER BY octo_transaction_id = $1 DESC
            LIMIT 1
        "#,
    )
    .bind(gateway_id)
    .fetch_optional(conn)
    .await
}

/// Compare-and-set status transition.
///
/// The `WHERE id = ? AND status = ?` guard makes the legal-transition check atomic: a racing
/// writer that got there first leaves this update matching zero rows, and the caller gets an
/// [`PaymentGatewayError::IllegalStatusChange`] carrying whatever the status actually is now.
/// Terminal statuses also stamp `completed_at`.
pub(crate) async fn transition_transaction(
    id: i64,
    expected_current: PaymentStatus,
    new_status: PaymentStatus,
    update: TransactionUpdate,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, PaymentGatewayError> {
    if !expected_current.can_transition_to(new_status) {
        return Err(PaymentGatewayError::IllegalStatusChange { current: expected_current, requested: new_status });
    }
    let mut builder = QueryBuilder::new("UPDATE payment_transactions SET updated_at = CURRENT_TIMESTAMP, status = ");
    builder.push_bind(new_status.to_string());
    if new_status.is_terminal() {
        builder.push(", completed_at = CURRENT_TIMESTAMP");
    }
    push_update_fields(&mut builder, &update);
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND status = ");
    builder.push_bind(expected_current.to_string());
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let updated =
        builder.build().fetch_optional(&mut *conn).await?.map(|row: SqliteRow| PaymentTransaction::from_row(&row));
    match updated {
        Some(tx) => Ok(tx?),
        // The row moved under us (or never existed). Report the real current status.
        None => match fetch_transaction_by_id(id, conn).await? {
            Some(tx) => {
                Err(PaymentGatewayError::IllegalStatusChange { current: tx.status, requested: new_status })
            },
            None => Err(PaymentGatewayError::TransactionNotFound(id.to_string())),
        },
    }
}

/// Updates audit payload fields without touching the status.
pub(crate) async fn record_exchange(
    id: i64,
    update: TransactionUpdate,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, PaymentGatewayError> {
    let mut builder = QueryBuilder::new("UPDATE payment_transactions SET updated_at = CURRENT_TIMESTAMP");
    push_update_fields(&mut builder, &update);
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");
    let updated =
        builder.build().fetch_optional(conn).await?.map(|row: SqliteRow| PaymentTransaction::from_row(&row));
    match updated {
        Some(tx) => Ok(tx?),
        None => Err(PaymentGatewayError::TransactionNotFound(id.to_string())),
    }
}

fn push_update_fields(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, update: &TransactionUpdate) {
    if let Some(octo_transaction_id) = &update.octo_transaction_id {
        builder.push(", octo_transaction_id = ");
        builder.push_bind(octo_transaction_id.clone());
    }
    if let Some(octo_payment_id) = &update.octo_payment_id {
        builder.push(", octo_payment_id = ");
        builder.push_bind(octo_payment_id.clone());
    }
    if let Some(verification_url) = &update.verification_url {
        builder.push(", verification_url = ");
        builder.push_bind(verification_url.clone());
    }
    if let Some(seconds_left) = update.seconds_left {
        builder.push(", seconds_left = ");
        builder.push_bind(seconds_left);
    }
    if let Some(error_code) = &update.error_code {
        builder.push(", error_code = ");
        builder.push_bind(error_code.clone());
    }
    if let Some(error_message) = &update.error_message {
        builder.push(", error_message = ");
        builder.push_bind(error_message.clone());
    }
    if let Some(request_payload) = &update.request_payload {
        builder.push(", request_payload = ");
        builder.push_bind(request_payload.clone());
    }
    if let Some(response_payload) = &update.response_payload {
        builder.push(", response_payload = ");
        builder.push_bind(response_payload.clone());
    }
}

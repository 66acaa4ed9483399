use log::debug;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    db_types::{NewOrder, Order, OrderStatusType},
    traits::PaymentGatewayError,
};

pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    let public_id = Uuid::new_v4().to_string();
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                public_id,
                number,
                user_id,
                currency,
                total_amount,
                customer_email,
                customer_phone
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(public_id)
    .bind(&order.number)
    .bind(order.user_id)
    .bind(&order.currency)
    .bind(order.total_amount.value())
    .bind(&order.customer_email)
    .bind(&order.customer_phone)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {} inserted with id {}", order.number, order.id);
    Ok(order)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// The order with this public id, scoped to its owner. Foreign orders come back as `None`.
pub async fn fetch_order_for_user(
    public_id: &str,
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE public_id = $1 AND user_id = $2")
        .bind(public_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

/// Update the order status. `paid_at` is stamped when the order becomes `PaymentConfirmed`.
pub(crate) async fn update_order_status(
    id: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentGatewayError> {
    let paid = status == OrderStatusType::PaymentConfirmed;
    let result: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = $1,
                paid_at = CASE WHEN $2 THEN CURRENT_TIMESTAMP ELSE paid_at END,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(status.to_string())
    .bind(paid)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(PaymentGatewayError::OrderIdNotFound(id))
}

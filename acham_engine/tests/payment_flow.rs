//! Integration tests for the payment-transaction state machine, against a real (temporary)
//! SQLite database.

use acham_common::Money;
use acham_engine::{
    api::accounts_api::RegistrationRequest,
    db_types::{NewOrder, Order, OrderStatusType, PaymentStatus},
    test_utils::{prepare_test_env, random_db_path},
    AccountApi,
    NotificationOutcome,
    PaymentFlowApi,
    PaymentGatewayError,
    SqliteDatabase,
};

async fn test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error connecting to test database")
}

async fn seed_order(db: &SqliteDatabase, number: &str) -> Order {
    let accounts = AccountApi::new(db.clone());
    let user = accounts
        .register(RegistrationRequest {
            name: "Shopper".to_string(),
            email: format!("{number}@example.com"),
            phone: Some("+998901234567".to_string()),
            country_id: Some(1),
            password: Some("hunter2hunter2".to_string()),
        })
        .await
        .expect("registration failed")
        .user;
    let flow = PaymentFlowApi::new(db.clone());
    flow.create_order(NewOrder {
        number: number.to_string(),
        user_id: user.id,
        currency: "UZS".to_string(),
        total_amount: Money::from_major(250_000),
        customer_email: Some(user.email.clone()),
        customer_phone: user.phone.clone(),
    })
    .await
    .expect("order creation failed")
}

/// Walk a transaction up to `Processing` through the full legal path.
async fn charge_to_processing(flow: &PaymentFlowApi<SqliteDatabase>, order: &Order) -> i64 {
    let (tx, created) = flow.begin_charge(order, "{}".to_string()).await.expect("begin_charge failed");
    assert!(created);
    let tx = flow.mark_prepared(tx.id, "octo-tx-1", "{}".to_string()).await.expect("mark_prepared failed");
    let tx = flow
        .mark_verification_required(tx.id, Some("octo-pay-1".into()), None, Some(300), "{}".to_string())
        .await
        .expect("mark_verification_required failed");
    let tx = flow
        .mark_processing(tx.id, PaymentStatus::VerificationRequired, "{}".to_string())
        .await
        .expect("mark_processing failed");
    assert_eq!(tx.status, PaymentStatus::Processing);
    tx.id
}

#[tokio::test]
async fn happy_path_ends_with_paid_order() {
    let db = test_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let order = seed_order(&db, "ACH-1001").await;
    charge_to_processing(&flow, &order).await;

    let outcome = flow
        .apply_notification("octo-tx-1", PaymentStatus::Success, None, None, r#"{"status":"success"}"#.to_string())
        .await
        .expect("notification failed");
    let NotificationOutcome::Finalized { transaction, order } = outcome else {
        panic!("Expected the notification to finalize the transaction");
    };
    assert_eq!(transaction.status, PaymentStatus::Success);
    assert!(transaction.completed_at.is_some());
    assert_eq!(order.status, OrderStatusType::PaymentConfirmed);
    assert!(order.paid_at.is_some());
}

#[tokio::test]
async fn initiate_is_idempotent_while_a_transaction_is_live() {
    let db = test_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let order = seed_order(&db, "ACH-1002").await;

    let (first, created) = flow.begin_charge(&order, "{}".to_string()).await.expect("first begin");
    assert!(created);
    let (second, created) = flow.begin_charge(&order, "{}".to_string()).await.expect("second begin");
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(first.shop_transaction_id, second.shop_transaction_id);
}

#[tokio::test]
async fn success_cannot_skip_processing() {
    let db = test_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let order = seed_order(&db, "ACH-1003").await;
    let (tx, _) = flow.begin_charge(&order, "{}".to_string()).await.expect("begin");
    let tx = flow.mark_prepared(tx.id, "octo-tx-3", "{}".to_string()).await.expect("prepare");
    assert_eq!(tx.status, PaymentStatus::Prepared);

    // A success webhook for a transaction that never reached Processing is rejected
    let err = flow
        .apply_notification("octo-tx-3", PaymentStatus::Success, None, None, "{}".to_string())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PaymentGatewayError::IllegalStatusChange { current: PaymentStatus::Prepared, requested: PaymentStatus::Success }
    ));
    // ... but a failure report is accepted from there
    let outcome = flow
        .apply_notification("octo-tx-3", PaymentStatus::Failed, Some("-1".into()), None, "{}".to_string())
        .await
        .expect("failure notification");
    let NotificationOutcome::Finalized { transaction, order } = outcome else {
        panic!("Expected finalization");
    };
    assert_eq!(transaction.status, PaymentStatus::Failed);
    assert_eq!(order.status, OrderStatusType::PaymentFailed);
}

#[tokio::test]
async fn out_of_order_transitions_are_conflicts() {
    let db = test_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let order = seed_order(&db, "ACH-1004").await;
    let (tx, _) = flow.begin_charge(&order, "{}".to_string()).await.expect("begin");

    // verify-otp before confirm: the transaction is Pending, not VerificationRequired
    let err = flow
        .mark_processing(tx.id, PaymentStatus::VerificationRequired, "{}".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentGatewayError::IllegalStatusChange { .. }));

    // confirm before the gateway prepared the charge
    let err = flow
        .mark_verification_required(tx.id, None, None, None, "{}".to_string())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PaymentGatewayError::IllegalStatusChange { current: PaymentStatus::Pending, .. }
    ));
}

#[tokio::test]
async fn duplicate_webhook_is_a_no_op() {
    let db = test_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let order = seed_order(&db, "ACH-1005").await;
    charge_to_processing(&flow, &order).await;

    let first = flow
        .apply_notification("octo-tx-1", PaymentStatus::Success, None, None, "{}".to_string())
        .await
        .expect("first notification");
    assert!(matches!(first, NotificationOutcome::Finalized { .. }));

    // The second delivery changes nothing, even if it contradicts the first
    let second = flow
        .apply_notification("octo-tx-1", PaymentStatus::Failed, Some("-1".into()), None, "{}".to_string())
        .await
        .expect("duplicate notification");
    let NotificationOutcome::AlreadyFinal(tx) = second else {
        panic!("Expected the duplicate to be ignored");
    };
    assert_eq!(tx.status, PaymentStatus::Success);
}

#[tokio::test]
async fn gateway_rejection_at_prepare_fails_the_transaction_only() {
    let db = test_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let order = seed_order(&db, "ACH-1006").await;
    let (tx, _) = flow.begin_charge(&order, "{}".to_string()).await.expect("begin");

    let tx = flow
        .mark_failed(
            tx.id,
            PaymentStatus::Pending,
            Some("-20400".into()),
            Some("Shop not found".into()),
            "{}".to_string(),
        )
        .await
        .expect("mark_failed");
    assert_eq!(tx.status, PaymentStatus::Failed);
    assert_eq!(tx.error_code.as_deref(), Some("-20400"));
    assert!(tx.completed_at.is_some());

    // The order is still payable, and a new attempt mints a new shop transaction id
    let order = flow.order_for_user(&order.public_id, order.user_id).await.expect("order fetch");
    assert_eq!(order.status, OrderStatusType::PendingPayment);
    let (retry, created) = flow.begin_charge(&order, "{}".to_string()).await.expect("retry begin");
    assert!(created);
    assert_ne!(retry.shop_transaction_id, tx.shop_transaction_id);
}

#[tokio::test]
async fn cancellation_cancels_the_order() {
    let db = test_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let order = seed_order(&db, "ACH-1007").await;
    charge_to_processing(&flow, &order).await;

    let outcome = flow
        .apply_notification("octo-tx-1", PaymentStatus::Cancelled, None, None, "{}".to_string())
        .await
        .expect("cancel notification");
    let NotificationOutcome::Finalized { transaction, order } = outcome else {
        panic!("Expected finalization");
    };
    assert_eq!(transaction.status, PaymentStatus::Cancelled);
    assert_eq!(order.status, OrderStatusType::Cancelled);
    assert!(order.paid_at.is_none());
}

#[tokio::test]
async fn foreign_orders_are_invisible() {
    let db = test_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let order = seed_order(&db, "ACH-1008").await;
    let err = flow.order_for_user(&order.public_id, order.user_id + 1).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::OrderNotFound(_)));
}

#[tokio::test]
async fn latest_transaction_reflects_the_most_recent_attempt() {
    let db = test_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let order = seed_order(&db, "ACH-1009").await;
    assert!(flow.latest_transaction(order.id).await.expect("latest").is_none());

    let (tx, _) = flow.begin_charge(&order, "{}".to_string()).await.expect("begin");
    flow.mark_failed(tx.id, PaymentStatus::Pending, None, None, "{}".to_string()).await.expect("fail");
    let (retry, _) = flow.begin_charge(&order, "{}".to_string()).await.expect("retry");

    let latest = flow.latest_transaction(order.id).await.expect("latest").expect("some transaction");
    assert_eq!(latest.id, retry.id);
    assert_eq!(latest.status, PaymentStatus::Pending);
}

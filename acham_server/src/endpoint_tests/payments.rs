use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use acham_common::Secret;
use acham_engine::{
    db_types::{OrderStatusType, PaymentStatus},
    PaymentFlowApi,
};
use octo_tools::OctoResponse;
use serde_json::json;

use super::{
    helpers::{access_token, sample_order, sample_transaction, sample_user, send_request, test_auth_config},
    mocks::{MockGateway, MockPaymentManager},
};
use crate::{
    auth::TokenIssuer,
    config::{PaymentUrls, ProxyConfig},
    helpers::calculate_hmac,
    middleware::{OctoSignatureFactory, OCTO_SIGNATURE_HEADER},
    payment_routes::{
        payment_notify,
        ConfirmPaymentRoute,
        InitiatePaymentRoute,
        PaymentOtpRoute,
        PaymentStatusRoute,
    },
};

fn success_envelope(data: serde_json::Value) -> OctoResponse {
    OctoResponse { error: 0, err_message: None, api_message: None, data: Some(data) }
}

fn rejection_envelope(code: i64, message: &str) -> OctoResponse {
    OctoResponse { error: code, err_message: Some(message.to_string()), api_message: None, data: None }
}

fn configure(db: MockPaymentManager, gateway: MockGateway) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(PaymentFlowApi::new(db)))
            .app_data(web::Data::new(gateway))
            .app_data(web::Data::new(TokenIssuer::new(&test_auth_config())))
            .app_data(web::Data::new(PaymentUrls {
                frontend_url: "http://localhost:4200".to_string(),
                public_url: "http://localhost:8380".to_string(),
            }))
            .app_data(web::Data::new(ProxyConfig { use_x_forwarded_for: false }))
            .service(InitiatePaymentRoute::<MockPaymentManager, MockGateway>::new())
            .service(ConfirmPaymentRoute::<MockPaymentManager, MockGateway>::new())
            .service(PaymentOtpRoute::<MockPaymentManager, MockGateway>::new())
            .service(PaymentStatusRoute::<MockPaymentManager>::new())
            .service(
                web::resource("/payments/notify").route(web::post().to(payment_notify::<MockPaymentManager>)),
            );
    }
}

fn bearer(user_id: i64) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", access_token(&sample_user(user_id))))
}

//----------------------------------------------   Initiate  ---------------------------------------------------------

#[actix_web::test]
async fn initiate_prepares_a_charge() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_live_transaction_for_order().returning(|_| Ok(None));
    db.expect_insert_transaction().returning(|new| {
        let mut tx = sample_transaction(11, new.order_id, PaymentStatus::Pending);
        tx.shop_transaction_id = new.shop_transaction_id;
        tx.octo_transaction_id = None;
        Ok(tx)
    });
    db.expect_record_exchange().returning(|id, _| Ok(sample_transaction(id, 5, PaymentStatus::Pending)));
    db.expect_transition_transaction()
        .withf(|_, from, to, update| {
            *from == PaymentStatus::Pending
                && *to == PaymentStatus::Prepared
                && update.octo_transaction_id.as_deref() == Some("octo-1")
        })
        .returning(|id, _, _, _| Ok(sample_transaction(id, 5, PaymentStatus::Prepared)));
    let mut gateway = MockGateway::new();
    gateway
        .expect_prepare_payment()
        .withf(|request| request.currency == "UZS" && request.notify_url.ends_with("/api/payments/notify"))
        .returning(|_| Ok(success_envelope(json!({ "id": "octo-1" }))));
    let req = TestRequest::post().uri("/payments/pub-5/initiate").insert_header(bearer(1)).to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"Prepared""#), "was: {body}");
    assert!(body.contains("octo-1"), "was: {body}");
}

#[actix_web::test]
async fn initiate_reuses_a_live_transaction() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_live_transaction_for_order()
        .returning(|_| Ok(Some(sample_transaction(11, 5, PaymentStatus::Prepared))));
    db.expect_insert_transaction().times(0);
    let mut gateway = MockGateway::new();
    gateway.expect_prepare_payment().times(0);
    let req = TestRequest::post().uri("/payments/pub-5/initiate").insert_header(bearer(1)).to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("A-105-deadbeef"), "was: {body}");
}

#[actix_web::test]
async fn initiate_marks_the_transaction_failed_on_gateway_rejection() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_live_transaction_for_order().returning(|_| Ok(None));
    db.expect_insert_transaction().returning(|new| {
        let mut tx = sample_transaction(11, new.order_id, PaymentStatus::Pending);
        tx.octo_transaction_id = None;
        Ok(tx)
    });
    db.expect_record_exchange().returning(|id, _| Ok(sample_transaction(id, 5, PaymentStatus::Pending)));
    db.expect_transition_transaction()
        .withf(|_, from, to, update| {
            *from == PaymentStatus::Pending
                && *to == PaymentStatus::Failed
                && update.error_code.as_deref() == Some("-20100")
        })
        .returning(|id, _, _, _| Ok(sample_transaction(id, 5, PaymentStatus::Failed)));
    let mut gateway = MockGateway::new();
    gateway.expect_prepare_payment().returning(|_| Ok(rejection_envelope(-20100, "Shop is disabled")));
    let req = TestRequest::post().uri("/payments/pub-5/initiate").insert_header(bearer(1)).to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("Shop is disabled"), "was: {body}");
    assert!(body.contains("-20100"), "was: {body}");
}

#[actix_web::test]
async fn foreign_orders_are_indistinguishable_from_missing_ones() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, _| Ok(None));
    let gateway = MockGateway::new();
    let req = TestRequest::post().uri("/payments/pub-5/initiate").insert_header(bearer(2)).to_request();
    let (status, _) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//----------------------------------------------   Confirm  ----------------------------------------------------------

#[actix_web::test]
async fn confirm_moves_to_verification_required() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_transaction_for_order()
        .returning(|order_id, _| Ok(Some(sample_transaction(11, order_id, PaymentStatus::Prepared))));
    db.expect_transition_transaction()
        .withf(|_, from, to, update| {
            *from == PaymentStatus::Prepared
                && *to == PaymentStatus::VerificationRequired
                && update.seconds_left == Some(300)
        })
        .returning(|id, _, _, update| {
            let mut tx = sample_transaction(id, 5, PaymentStatus::VerificationRequired);
            tx.octo_payment_id = update.octo_payment_id;
            tx.verification_url = update.verification_url;
            tx.seconds_left = update.seconds_left;
            Ok(tx)
        });
    let mut gateway = MockGateway::new();
    gateway.expect_pay().returning(|_, _| Ok(success_envelope(json!({ "status": "waiting_for_verification" }))));
    gateway.expect_verification_info().returning(|_| {
        Ok(success_envelope(json!({
            "id": "pay-9",
            "verification_url": "https://secure.octo.uz/verify/pay-9",
            "secondsLeft": 300,
        })))
    });
    let req = TestRequest::post()
        .uri("/payments/pub-5/confirm")
        .insert_header(bearer(1))
        .set_json(json!({
            "transaction_id": "octo-1",
            "card_number": "8600123412341234",
            "expire": "1228",
        }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"VerificationRequired""#), "was: {body}");
    assert!(body.contains(r#""seconds_left":300"#), "was: {body}");
}

#[actix_web::test]
async fn confirm_without_verification_info_goes_straight_to_processing() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_transaction_for_order()
        .returning(|order_id, _| Ok(Some(sample_transaction(11, order_id, PaymentStatus::Prepared))));
    db.expect_transition_transaction()
        .withf(|_, from, to, _| *from == PaymentStatus::Prepared && *to == PaymentStatus::Processing)
        .returning(|id, _, _, _| Ok(sample_transaction(id, 5, PaymentStatus::Processing)));
    let mut gateway = MockGateway::new();
    gateway.expect_pay().returning(|_, _| Ok(success_envelope(json!({ "status": "created" }))));
    gateway.expect_verification_info().returning(|_| Ok(success_envelope(json!({}))));
    let req = TestRequest::post()
        .uri("/payments/pub-5/confirm")
        .insert_header(bearer(1))
        .set_json(json!({
            "transaction_id": "octo-1",
            "card_number": "8600123412341234",
            "expire": "1228",
        }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"Processing""#), "was: {body}");
}

#[actix_web::test]
async fn confirm_in_the_wrong_state_is_a_conflict() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_transaction_for_order()
        .returning(|order_id, _| Ok(Some(sample_transaction(11, order_id, PaymentStatus::Processing))));
    db.expect_transition_transaction().times(0);
    let mut gateway = MockGateway::new();
    gateway.expect_pay().times(0);
    let req = TestRequest::post()
        .uri("/payments/pub-5/confirm")
        .insert_header(bearer(1))
        .set_json(json!({
            "transaction_id": "octo-1",
            "card_number": "8600123412341234",
            "expire": "1228",
        }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("Processing"), "was: {body}");
}

#[actix_web::test]
async fn confirm_rejects_a_bogus_card_number() {
    let db = MockPaymentManager::new();
    let mut gateway = MockGateway::new();
    gateway.expect_pay().times(0);
    let req = TestRequest::post()
        .uri("/payments/pub-5/confirm")
        .insert_header(bearer(1))
        .set_json(json!({ "transaction_id": "octo-1", "card_number": "1234", "expire": "1228" }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains(r#""card_number""#), "was: {body}");
}

//----------------------------------------------   Verify OTP  -------------------------------------------------------

#[actix_web::test]
async fn accepted_sms_key_moves_to_processing() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_transaction_for_order()
        .returning(|order_id, _| Ok(Some(sample_transaction(11, order_id, PaymentStatus::VerificationRequired))));
    db.expect_transition_transaction()
        .withf(|_, from, to, _| *from == PaymentStatus::VerificationRequired && *to == PaymentStatus::Processing)
        .returning(|id, _, _, _| Ok(sample_transaction(id, 5, PaymentStatus::Processing)));
    let mut gateway = MockGateway::new();
    gateway.expect_check_sms_key().returning(|_, _| Ok(success_envelope(json!({ "status": "succeeded" }))));
    let req = TestRequest::post()
        .uri("/payments/pub-5/verify-otp")
        .insert_header(bearer(1))
        .set_json(json!({ "transaction_id": "octo-1", "sms_key": "482913" }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"Processing""#), "was: {body}");
}

#[actix_web::test]
async fn rejected_sms_key_leaves_the_status_alone() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_transaction_for_order()
        .returning(|order_id, _| Ok(Some(sample_transaction(11, order_id, PaymentStatus::VerificationRequired))));
    db.expect_record_exchange()
        .returning(|id, _| Ok(sample_transaction(id, 5, PaymentStatus::VerificationRequired)));
    db.expect_transition_transaction().times(0);
    let mut gateway = MockGateway::new();
    gateway.expect_check_sms_key().returning(|_, _| Ok(rejection_envelope(-20303, "Wrong key")));
    let req = TestRequest::post()
        .uri("/payments/pub-5/verify-otp")
        .insert_header(bearer(1))
        .set_json(json!({ "transaction_id": "octo-1", "sms_key": "000000" }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("Wrong key"), "was: {body}");
}

#[actix_web::test]
async fn sms_key_in_the_wrong_state_is_a_conflict() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_transaction_for_order()
        .returning(|order_id, _| Ok(Some(sample_transaction(11, order_id, PaymentStatus::Prepared))));
    let mut gateway = MockGateway::new();
    gateway.expect_check_sms_key().times(0);
    let req = TestRequest::post()
        .uri("/payments/pub-5/verify-otp")
        .insert_header(bearer(1))
        .set_json(json!({ "transaction_id": "octo-1", "sms_key": "482913" }))
        .to_request();
    let (status, _) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

//----------------------------------------------   Status  -----------------------------------------------------------

#[actix_web::test]
async fn status_reports_no_payment_when_nothing_was_attempted() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_order_for_user().returning(|_, user_id| Ok(Some(sample_order(5, user_id))));
    db.expect_fetch_latest_transaction_for_order().returning(|_| Ok(None));
    let gateway = MockGateway::new();
    let req = TestRequest::get().uri("/payments/pub-5/status").insert_header(bearer(1)).to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""payment":null"#), "was: {body}");
    assert!(body.contains("PendingPayment"), "was: {body}");
}

//----------------------------------------------   Webhook  ----------------------------------------------------------

#[actix_web::test]
async fn success_notification_finalizes_transaction_and_order() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_transaction_by_gateway_id()
        .returning(|_| Ok(Some(sample_transaction(11, 5, PaymentStatus::Processing))));
    db.expect_finalize_transaction()
        .withf(|_, current, final_status, order_status, _| {
            *current == PaymentStatus::Processing
                && *final_status == PaymentStatus::Success
                && *order_status == OrderStatusType::PaymentConfirmed
        })
        .returning(|id, _, _, _, _| {
            let mut tx = sample_transaction(id, 5, PaymentStatus::Success);
            tx.completed_at = Some(tx.updated_at);
            let mut order = sample_order(5, 1);
            order.status = OrderStatusType::PaymentConfirmed;
            order.paid_at = Some(tx.updated_at);
            Ok((tx, order))
        });
    let gateway = MockGateway::new();
    let req = TestRequest::post()
        .uri("/payments/notify")
        .set_json(json!({ "transaction_id": "octo-1", "status": "success" }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":true"#), "was: {body}");
}

#[actix_web::test]
async fn duplicate_notification_is_a_noop() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_transaction_by_gateway_id()
        .returning(|_| Ok(Some(sample_transaction(11, 5, PaymentStatus::Success))));
    db.expect_finalize_transaction().times(0);
    let gateway = MockGateway::new();
    let req = TestRequest::post()
        .uri("/payments/notify")
        .set_json(json!({ "transaction_id": "octo-1", "status": "success" }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("already finalized"), "was: {body}");
}

#[actix_web::test]
async fn success_notification_for_an_unconfirmed_charge_is_refused() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_transaction_by_gateway_id()
        .returning(|_| Ok(Some(sample_transaction(11, 5, PaymentStatus::Prepared))));
    db.expect_finalize_transaction().times(0);
    let gateway = MockGateway::new();
    let req = TestRequest::post()
        .uri("/payments/notify")
        .set_json(json!({ "transaction_id": "octo-1", "status": "success" }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":false"#), "was: {body}");
}

#[actix_web::test]
async fn failure_notification_is_accepted_before_processing() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_transaction_by_gateway_id()
        .returning(|_| Ok(Some(sample_transaction(11, 5, PaymentStatus::VerificationRequired))));
    db.expect_finalize_transaction()
        .withf(|_, _, final_status, order_status, update| {
            *final_status == PaymentStatus::Failed
                && *order_status == OrderStatusType::PaymentFailed
                && update.error_code.as_deref() == Some("-20405")
        })
        .returning(|id, _, _, _, _| {
            let tx = sample_transaction(id, 5, PaymentStatus::Failed);
            let mut order = sample_order(5, 1);
            order.status = OrderStatusType::PaymentFailed;
            Ok((tx, order))
        });
    let gateway = MockGateway::new();
    let req = TestRequest::post()
        .uri("/payments/notify")
        .set_json(json!({ "transaction_id": "octo-1", "error": -20405, "errMessage": "Declined" }))
        .to_request();
    let (status, body) = send_request(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":true"#), "was: {body}");
}

//----------------------------------------------   Webhook HMAC  -----------------------------------------------------

fn configure_signed_webhook(db: MockPaymentManager, enabled: bool) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let hmac = OctoSignatureFactory::new(Secret::new("shop-secret".to_string()), enabled);
        cfg.app_data(web::Data::new(PaymentFlowApi::new(db)))
            .app_data(web::Data::new(ProxyConfig { use_x_forwarded_for: false }))
            .service(
                web::resource("/payments/notify")
                    .wrap(hmac)
                    .route(web::post().to(payment_notify::<MockPaymentManager>)),
            );
    }
}

#[actix_web::test]
async fn webhook_with_a_bad_signature_is_forbidden() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_transaction_by_gateway_id().times(0);
    let payload = r#"{"transaction_id":"octo-1","status":"success"}"#;
    let req = TestRequest::post()
        .uri("/payments/notify")
        .insert_header((OCTO_SIGNATURE_HEADER, "bm90IGEgcmVhbCBzaWduYXR1cmU="))
        .set_payload(payload)
        .to_request();
    let (status, _) = send_request(req, configure_signed_webhook(db, true)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn webhook_without_a_signature_is_forbidden() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_transaction_by_gateway_id().times(0);
    let payload = r#"{"transaction_id":"octo-1","status":"success"}"#;
    let req = TestRequest::post().uri("/payments/notify").set_payload(payload).to_request();
    let (status, _) = send_request(req, configure_signed_webhook(db, true)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn webhook_with_a_valid_signature_is_processed() {
    let mut db = MockPaymentManager::new();
    db.expect_fetch_transaction_by_gateway_id()
        .returning(|_| Ok(Some(sample_transaction(11, 5, PaymentStatus::Success))));
    let payload = r#"{"transaction_id":"octo-1","status":"success"}"#;
    let signature = calculate_hmac("shop-secret", payload.as_bytes());
    let req = TestRequest::post()
        .uri("/payments/notify")
        .insert_header((OCTO_SIGNATURE_HEADER, signature))
        .set_payload(payload)
        .to_request();
    let (status, body) = send_request(req, configure_signed_webhook(db, true)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("already finalized"), "was: {body}");
}

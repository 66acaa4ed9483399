use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use acham_engine::{
    db_types::{User, YesNo},
    AccountApi,
    OtpApi,
};
use serde_json::json;

use super::{
    helpers::{access_token, active_otp, germany, sample_user, send_request, test_auth_config, uzbekistan},
    mocks::{MockAccountManager, MockOtpManager},
};
use crate::{
    auth::TokenIssuer,
    integrations::SmsBackend,
    routes::{MeRoute, RegisterRoute, ResendOtpRoute, VerifyOtpRoute},
};

fn configure(accounts: MockAccountManager, otp: MockOtpManager) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(AccountApi::new(accounts)))
            .app_data(web::Data::new(OtpApi::new(otp)))
            .app_data(web::Data::new(TokenIssuer::new(&test_auth_config())))
            .app_data(web::Data::new(SmsBackend::Log))
            .service(RegisterRoute::<MockAccountManager, MockOtpManager>::new())
            .service(VerifyOtpRoute::<MockAccountManager, MockOtpManager>::new())
            .service(ResendOtpRoute::<MockAccountManager, MockOtpManager>::new())
            .service(MeRoute::<MockAccountManager>::new());
    }
}

fn created_user(new: acham_engine::db_types::NewUser) -> User {
    let mut user = sample_user(1);
    user.name = new.name;
    user.email = new.email;
    user.phone = new.phone;
    user.country_id = new.country_id;
    user.password_hash = new.password_hash;
    user
}

#[actix_web::test]
async fn register_with_verification_country_issues_otp() {
    let mut accounts = MockAccountManager::new();
    accounts.expect_fetch_country().returning(|_| Ok(Some(uzbekistan())));
    accounts.expect_create_user().returning(|new| Ok(created_user(new)));
    let mut otp = MockOtpManager::new();
    otp.expect_create_otp().returning(|user_id, purpose, code_hash, expires_at| {
        let mut code = active_otp(7, user_id, "000000");
        code.purpose = purpose;
        code.code_hash = code_hash.to_string();
        code.expires_at = expires_at;
        Ok(code)
    });
    let req = TestRequest::post()
        .uri("/users/register")
        .set_json(json!({
            "name": "Alice",
            "email": "alice@example.com",
            "password": "hunter2000",
            "country_id": 1,
            "phone": "+998901234567",
        }))
        .to_request();
    let (status, body) = send_request(req, configure(accounts, otp)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.contains(r#""requires_otp":true"#), "was: {body}");
    assert!(body.contains("OTP sent"), "was: {body}");
}

#[actix_web::test]
async fn register_without_verification_country_creates_no_otp() {
    let mut accounts = MockAccountManager::new();
    accounts.expect_fetch_country().returning(|_| Ok(Some(germany())));
    accounts.expect_create_user().returning(|new| Ok(created_user(new)));
    let mut otp = MockOtpManager::new();
    otp.expect_create_otp().times(0);
    let req = TestRequest::post()
        .uri("/users/register")
        .set_json(json!({
            "name": "Bob",
            "email": "bob@example.com",
            "password": "hunter2000",
            "country_id": 2,
        }))
        .to_request();
    let (status, body) = send_request(req, configure(accounts, otp)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.contains(r#""requires_otp":false"#), "was: {body}");
}

#[actix_web::test]
async fn register_rejects_garbage_email() {
    let accounts = MockAccountManager::new();
    let otp = MockOtpManager::new();
    let req = TestRequest::post()
        .uri("/users/register")
        .set_json(json!({ "name": "Eve", "email": "not-an-email", "password": "hunter2000" }))
        .to_request();
    let (status, body) = send_request(req, configure(accounts, otp)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains(r#""email""#), "was: {body}");
}

#[actix_web::test]
async fn verify_otp_with_wrong_code_returns_field_error() {
    let accounts = MockAccountManager::new();
    let mut otp = MockOtpManager::new();
    otp.expect_fetch_active_otp().returning(|user_id, _| Ok(Some(active_otp(7, user_id, "123456"))));
    otp.expect_record_failed_attempt().returning(|_| Ok(1));
    let req = TestRequest::post()
        .uri("/users/verify-otp/1")
        .set_json(json!({ "otp_code": "999999" }))
        .to_request();
    let (status, body) = send_request(req, configure(accounts, otp)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains(r#""otp_code""#), "was: {body}");
}

#[actix_web::test]
async fn verify_otp_success_logs_the_user_in() {
    let mut accounts = MockAccountManager::new();
    accounts.expect_fetch_user_by_id().returning(|id| {
        let mut user = sample_user(id);
        user.phone_verified = YesNo::Y;
        Ok(Some(user))
    });
    let mut otp = MockOtpManager::new();
    otp.expect_fetch_active_otp().returning(|user_id, _| Ok(Some(active_otp(7, user_id, "123456"))));
    otp.expect_consume_otp().returning(|_, _| Ok(()));
    let req = TestRequest::post()
        .uri("/users/verify-otp/1")
        .set_json(json!({ "otp_code": "123456" }))
        .to_request();
    let (status, body) = send_request(req, configure(accounts, otp)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""phone_verified":"Y""#), "was: {body}");
    assert!(body.contains(r#""access""#), "was: {body}");
    assert!(body.contains(r#""refresh""#), "was: {body}");
}

#[actix_web::test]
async fn expired_otp_is_rejected_and_deactivated() {
    let accounts = MockAccountManager::new();
    let mut otp = MockOtpManager::new();
    otp.expect_fetch_active_otp().returning(|user_id, _| {
        let mut code = active_otp(7, user_id, "123456");
        code.expires_at = code.created_at - chrono::Duration::minutes(1);
        Ok(Some(code))
    });
    otp.expect_deactivate_otp().returning(|_| Ok(()));
    let req = TestRequest::post()
        .uri("/users/verify-otp/1")
        .set_json(json!({ "otp_code": "123456" }))
        .to_request();
    let (status, body) = send_request(req, configure(accounts, otp)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains(r#""otp_code""#), "was: {body}");
}

#[actix_web::test]
async fn resend_otp_supersedes_the_old_code() {
    let mut accounts = MockAccountManager::new();
    accounts.expect_fetch_user_by_id().returning(|id| Ok(Some(sample_user(id))));
    let mut otp = MockOtpManager::new();
    otp.expect_create_otp().returning(|user_id, purpose, code_hash, expires_at| {
        let mut code = active_otp(8, user_id, "000000");
        code.purpose = purpose;
        code.code_hash = code_hash.to_string();
        code.expires_at = expires_at;
        Ok(code)
    });
    let req = TestRequest::post().uri("/users/resend-otp").set_json(json!({ "user_id": 1 })).to_request();
    let (status, body) = send_request(req, configure(accounts, otp)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":true"#), "was: {body}");
}

#[actix_web::test]
async fn profile_requires_a_bearer_token() {
    let accounts = MockAccountManager::new();
    let otp = MockOtpManager::new();
    let req = TestRequest::get().uri("/users/me").to_request();
    let (status, _) = send_request(req, configure(accounts, otp)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn profile_returns_the_caller() {
    let mut accounts = MockAccountManager::new();
    accounts.expect_fetch_user_by_id().returning(|id| Ok(Some(sample_user(id))));
    let otp = MockOtpManager::new();
    let token = access_token(&sample_user(1));
    let req = TestRequest::get()
        .uri("/users/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let (status, body) = send_request(req, configure(accounts, otp)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("alice@example.com"), "was: {body}");
    assert!(!body.contains("password_hash"), "password hash must never serialize: {body}");
}

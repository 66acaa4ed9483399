use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use acham_engine::{helpers::hash_secret, AccountApi, AuthApi};
use serde_json::json;

use super::{
    helpers::{access_token, refresh_token, sample_user, send_request, test_auth_config},
    mocks::MockAuthManager,
};
use crate::{
    auth::TokenIssuer,
    routes::{LoginRoute, MeRoute, RefreshRoute, VerifyTokenRoute},
};

fn configure(backend: MockAuthManager) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let signer = TokenIssuer::new(&test_auth_config());
        cfg.app_data(web::Data::new(AuthApi::new(backend)))
            .app_data(web::Data::new(signer))
            .service(LoginRoute::<MockAuthManager>::new())
            .service(VerifyTokenRoute::new());
    }
}

fn configure_accounts(backend: MockAuthManager) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let signer = TokenIssuer::new(&test_auth_config());
        cfg.app_data(web::Data::new(AccountApi::new(backend)))
            .app_data(web::Data::new(signer))
            .service(RefreshRoute::<MockAuthManager>::new())
            .service(MeRoute::<MockAuthManager>::new());
    }
}

fn user_with_password(password: &str) -> acham_engine::db_types::User {
    let mut user = sample_user(1);
    user.password_hash = Some(hash_secret(password).expect("Failed to hash test password"));
    user
}

#[actix_web::test]
async fn login_with_valid_password() {
    let mut backend = MockAuthManager::new();
    backend.expect_fetch_user_by_email().returning(|_| Ok(Some(user_with_password("hunter2000"))));
    let req = TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identifier": "alice@example.com", "password": "hunter2000" }))
        .to_request();
    let (status, body) = send_request(req, configure(backend)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""access""#), "was: {body}");
    assert!(body.contains(r#""refresh""#), "was: {body}");
}

#[actix_web::test]
async fn login_with_wrong_password() {
    let mut backend = MockAuthManager::new();
    backend.expect_fetch_user_by_email().returning(|_| Ok(Some(user_with_password("hunter2000"))));
    let req = TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identifier": "alice@example.com", "password": "wrong-password" }))
        .to_request();
    let (status, body) = send_request(req, configure(backend)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("credentials"), "was: {body}");
}

#[actix_web::test]
async fn login_with_phone_identifier() {
    let mut backend = MockAuthManager::new();
    backend.expect_fetch_user_by_phone().returning(|_| Ok(Some(user_with_password("hunter2000"))));
    let req = TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identifier": "+998901234567", "password": "hunter2000" }))
        .to_request();
    let (status, body) = send_request(req, configure(backend)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""access""#), "was: {body}");
}

#[actix_web::test]
async fn unknown_identifier_is_indistinguishable_from_bad_password() {
    let mut backend = MockAuthManager::new();
    backend.expect_fetch_user_by_email().returning(|_| Ok(None));
    let req = TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identifier": "nobody@example.com", "password": "hunter2000" }))
        .to_request();
    let (status, body) = send_request(req, configure(backend)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("credentials"), "was: {body}");
}

#[actix_web::test]
async fn refresh_spends_a_refresh_token() {
    let mut backend = MockAuthManager::new();
    backend.expect_fetch_user_by_id().returning(|id| Ok(Some(sample_user(id))));
    let token = refresh_token(&sample_user(1));
    let req = TestRequest::post().uri("/auth/refresh").set_json(json!({ "refresh": token })).to_request();
    let (status, body) = send_request(req, configure_accounts(backend)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""access""#), "was: {body}");
    assert!(body.contains(r#""refresh""#), "was: {body}");
}

#[actix_web::test]
async fn access_token_is_rejected_at_the_refresh_endpoint() {
    let backend = MockAuthManager::new();
    let token = access_token(&sample_user(1));
    let req = TestRequest::post().uri("/auth/refresh").set_json(json!({ "refresh": token })).to_request();
    let (status, body) = send_request(req, configure_accounts(backend)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Wrong token type"), "was: {body}");
}

#[actix_web::test]
async fn refresh_token_cannot_authenticate_a_protected_route() {
    let backend = MockAuthManager::new();
    let token = refresh_token(&sample_user(1));
    let req = TestRequest::get()
        .uri("/users/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let (status, body) = send_request(req, configure_accounts(backend)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Wrong token type"), "was: {body}");
}

#[actix_web::test]
async fn verify_echoes_the_claims() {
    let backend = MockAuthManager::new();
    let token = access_token(&sample_user(1));
    let req = TestRequest::post().uri("/auth/verify").set_json(json!({ "token": token })).to_request();
    let (status, body) = send_request(req, configure(backend)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("alice@example.com"), "was: {body}");
    assert!(body.contains(r#""token_type":"access""#), "was: {body}");
}

#[actix_web::test]
async fn tampered_token_is_rejected() {
    let backend = MockAuthManager::new();
    let mut token = access_token(&sample_user(1));
    let len = token.len();
    token.replace_range(len - 6..len, "AAAAAA");
    let req = TestRequest::post().uri("/auth/verify").set_json(json!({ "token": token })).to_request();
    let (status, body) = send_request(req, configure(backend)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("invalid or expired"), "was: {body}");
}

//! Integration tests for registration, OTP issue/verify and credential checks, against a real
//! (temporary) SQLite database.

use acham_engine::{
    api::accounts_api::RegistrationRequest,
    db_types::{OtpPurpose, YesNo},
    test_utils::{prepare_test_env, random_db_path},
    AccountApi,
    AccountApiError,
    AuthApi,
    AuthApiError,
    OtpApi,
    OtpApiError,
    SqliteDatabase,
};

async fn test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error connecting to test database")
}

fn uz_registration(email: &str, phone: &str) -> RegistrationRequest {
    RegistrationRequest {
        name: "Test User".to_string(),
        email: email.to_string(),
        phone: Some(phone.to_string()),
        country_id: Some(1),
        password: Some("hunter2hunter2".to_string()),
    }
}

#[tokio::test]
async fn registration_for_uzbekistan_requires_otp() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let registered =
        accounts.register(uz_registration("bobur@example.com", "+998901234567")).await.expect("Registration failed");
    assert!(registered.requires_otp);
    assert_eq!(registered.user.phone_verified, YesNo::N);
    assert_eq!(registered.user.email, "bobur@example.com");
}

#[tokio::test]
async fn registration_without_verification_country_creates_no_otp() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let otp_api = OtpApi::new(db.clone());
    // Country 5 (United States) does not require phone verification
    let request = RegistrationRequest {
        name: "Alex".to_string(),
        email: "alex@example.com".to_string(),
        phone: None,
        country_id: Some(5),
        password: Some("s3cret-pass".to_string()),
    };
    let registered = accounts.register(request).await.expect("Registration failed");
    assert!(!registered.requires_otp);
    // No code was ever issued, so verification has nothing to find
    let err = otp_api.verify_otp(registered.user.id, OtpPurpose::Registration, "123456").await.unwrap_err();
    assert!(matches!(err, OtpApiError::CodeNotFound));
}

#[tokio::test]
async fn registration_requires_phone_when_country_demands_it() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let request = RegistrationRequest { phone: None, ..uz_registration("nophone@example.com", "") };
    let err = accounts.register(request).await.unwrap_err();
    assert!(matches!(err, AccountApiError::PhoneRequired));
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    accounts.register(uz_registration("dup@example.com", "+998901110000")).await.expect("first registration");
    let err = accounts.register(uz_registration("dup@example.com", "+998901110001")).await.unwrap_err();
    assert!(matches!(err, AccountApiError::EmailTaken(_)));
}

#[tokio::test]
async fn otp_verifies_once_and_marks_phone_verified() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let otp_api = OtpApi::new(db.clone());
    let registered =
        accounts.register(uz_registration("otp@example.com", "+998905550001")).await.expect("registration");
    let user = registered.user;

    let issued = otp_api.request_otp(&user, OtpPurpose::Registration).await.expect("OTP issue failed");
    assert_eq!(issued.code.len(), 6);

    otp_api.verify_otp(user.id, OtpPurpose::Registration, &issued.code).await.expect("verification failed");
    let user = accounts.user_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(user.phone_verified, YesNo::Y);

    // The code is consumed; replaying it fails
    let err = otp_api.verify_otp(user.id, OtpPurpose::Registration, &issued.code).await.unwrap_err();
    assert!(matches!(err, OtpApiError::CodeNotFound));
}

#[tokio::test]
async fn wrong_code_is_a_validation_failure() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let otp_api = OtpApi::new(db.clone());
    let registered =
        accounts.register(uz_registration("wrong@example.com", "+998905550002")).await.expect("registration");
    let user = registered.user;
    let issued = otp_api.request_otp(&user, OtpPurpose::Registration).await.expect("OTP issue failed");
    let wrong = if issued.code == "000000" { "000001" } else { "000000" };
    let err = otp_api.verify_otp(user.id, OtpPurpose::Registration, wrong).await.unwrap_err();
    assert!(matches!(err, OtpApiError::CodeMismatch));
    assert!(err.is_validation());
    // The right code still works after one bad attempt
    otp_api.verify_otp(user.id, OtpPurpose::Registration, &issued.code).await.expect("verification failed");
}

#[tokio::test]
async fn new_code_supersedes_the_old_one() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let otp_api = OtpApi::new(db.clone());
    let registered =
        accounts.register(uz_registration("supersede@example.com", "+998905550003")).await.expect("registration");
    let user = registered.user;

    let first = otp_api.request_otp(&user, OtpPurpose::Registration).await.expect("first OTP");
    let second = otp_api.request_otp(&user, OtpPurpose::Registration).await.expect("second OTP");

    if first.code != second.code {
        let err = otp_api.verify_otp(user.id, OtpPurpose::Registration, &first.code).await.unwrap_err();
        assert!(matches!(err, OtpApiError::CodeMismatch));
    }
    otp_api.verify_otp(user.id, OtpPurpose::Registration, &second.code).await.expect("second code must verify");
}

#[tokio::test]
async fn five_wrong_attempts_deactivate_the_code() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let otp_api = OtpApi::new(db.clone());
    let registered =
        accounts.register(uz_registration("attempts@example.com", "+998905550004")).await.expect("registration");
    let user = registered.user;
    let issued = otp_api.request_otp(&user, OtpPurpose::Registration).await.expect("OTP issue failed");
    let wrong = if issued.code == "999999" { "999998" } else { "999999" };

    for _ in 0..5 {
        let err = otp_api.verify_otp(user.id, OtpPurpose::Registration, wrong).await.unwrap_err();
        assert!(matches!(err, OtpApiError::CodeMismatch));
    }
    // The code burned out; even the right one is rejected now
    let err = otp_api.verify_otp(user.id, OtpPurpose::Registration, &issued.code).await.unwrap_err();
    assert!(matches!(err, OtpApiError::CodeNotFound));
}

#[tokio::test]
async fn login_otp_does_not_satisfy_registration_verification() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let otp_api = OtpApi::new(db.clone());
    let registered =
        accounts.register(uz_registration("purpose@example.com", "+998905550005")).await.expect("registration");
    let user = registered.user;
    let issued = otp_api.request_otp(&user, OtpPurpose::Login).await.expect("OTP issue failed");
    let err = otp_api.verify_otp(user.id, OtpPurpose::Registration, &issued.code).await.unwrap_err();
    assert!(matches!(err, OtpApiError::CodeNotFound));
}

#[tokio::test]
async fn password_login_round_trip() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let auth = AuthApi::new(db.clone());
    accounts.register(uz_registration("login@example.com", "+998905550006")).await.expect("registration");

    let user = auth.login_with_password("login@example.com", "hunter2hunter2").await.expect("login failed");
    assert_eq!(user.email, "login@example.com");
    // Phone works as the identifier too
    let user = auth.login_with_password("+998905550006", "hunter2hunter2").await.expect("phone login failed");
    assert_eq!(user.email, "login@example.com");

    let err = auth.login_with_password("login@example.com", "wrong-password").await.unwrap_err();
    assert!(matches!(err, AuthApiError::InvalidCredentials));
    let err = auth.login_with_password("nobody@example.com", "hunter2hunter2").await.unwrap_err();
    assert!(matches!(err, AuthApiError::InvalidCredentials));
}

#[tokio::test]
async fn oauth_state_is_single_use() {
    let db = test_db().await;
    let auth = AuthApi::new(db.clone());
    auth.store_oauth_state("google", "state-abc123", "https://shop.example/cb").await.expect("store failed");
    let popped = auth.pop_oauth_state("google", "state-abc123").await.expect("pop failed");
    assert_eq!(popped.redirect_uri, "https://shop.example/cb");
    let err = auth.pop_oauth_state("google", "state-abc123").await.unwrap_err();
    assert!(matches!(err, AuthApiError::StateNotFound));
}

#[tokio::test]
async fn expired_oauth_state_cannot_be_redeemed() {
    use acham_engine::traits::{AuthManagement, NewOauthState};
    use chrono::{Duration, Utc};

    let db = test_db().await;
    db.store_oauth_state(NewOauthState {
        state: "state-stale".to_string(),
        provider: "google".to_string(),
        redirect_uri: "https://shop.example/cb".to_string(),
        expires_at: Utc::now() - Duration::minutes(1),
    })
    .await
    .expect("store failed");
    let auth = AuthApi::new(db.clone());
    let err = auth.pop_oauth_state("google", "state-stale").await.unwrap_err();
    assert!(matches!(err, AuthApiError::StateNotFound));
}

#[tokio::test]
async fn social_login_matches_by_uid_then_email() {
    let db = test_db().await;
    let accounts = AccountApi::new(db.clone());
    let profile = r#"{"id":"g-123","email":"social@example.com","name":"Social"}"#;
    let first = accounts
        .social_login("google", "g-123", Some("social@example.com"), Some("Social"), profile)
        .await
        .expect("social login failed");
    // Same identity again: no new account
    let second = accounts
        .social_login("google", "g-123", Some("social@example.com"), Some("Social"), profile)
        .await
        .expect("repeat social login failed");
    assert_eq!(first.id, second.id);
    // A profile with no email gets a generated placeholder address
    let anon = accounts.social_login("facebook", "fb-9", None, Some("Anon"), "{}").await.expect("fb login failed");
    assert_eq!(anon.email, "facebook-fb-9@facebook.oauth.local");
}

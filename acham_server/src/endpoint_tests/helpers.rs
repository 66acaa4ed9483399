use actix_http::Request;
use actix_web::{body::MessageBody, http::StatusCode, test, web::ServiceConfig, App};
use acham_common::{Money, Secret};
use acham_engine::db_types::{
    Country,
    Order,
    OrderStatusType,
    OtpCode,
    PaymentStatus,
    PaymentTransaction,
    User,
    YesNo,
};
use chrono::{DateTime, TimeZone, Utc};

use crate::{auth::TokenIssuer, config::AuthConfig};

// Creates a test `AuthConfig` for issuing tokens. DO NOT re-use this secret anywhere.
pub fn test_auth_config() -> AuthConfig {
    AuthConfig { jwt_secret: Secret::new("endpoint-test-signing-secret-0123456789abcdef".to_string()) }
}

pub fn access_token(user: &User) -> String {
    TokenIssuer::new(&test_auth_config()).issue_pair(user).expect("Failed to issue token pair").access
}

pub fn refresh_token(user: &User) -> String {
    TokenIssuer::new(&test_auth_config()).issue_pair(user).expect("Failed to issue token pair").refresh
}

pub fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn uzbekistan() -> Country {
    Country {
        id: 1,
        name: "Uzbekistan".to_string(),
        code: "UZ".to_string(),
        phone_code: "+998".to_string(),
        requires_phone_verification: YesNo::Y,
    }
}

pub fn germany() -> Country {
    Country {
        id: 2,
        name: "Germany".to_string(),
        code: "DE".to_string(),
        phone_code: "+49".to_string(),
        requires_phone_verification: YesNo::N,
    }
}

pub fn sample_user(id: i64) -> User {
    User {
        id,
        name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
        phone: Some("+998901234567".to_string()),
        country_id: Some(1),
        phone_verified: YesNo::N,
        password_hash: None,
        created_at: timestamp(),
        updated_at: timestamp(),
    }
}

pub fn sample_order(id: i64, user_id: i64) -> Order {
    Order {
        id,
        public_id: format!("pub-{id}"),
        number: format!("A-10{id}"),
        user_id,
        status: OrderStatusType::PendingPayment,
        currency: "UZS".to_string(),
        total_amount: Money::from(1_250_000),
        customer_email: Some("alice@example.com".to_string()),
        customer_phone: Some("+998901234567".to_string()),
        paid_at: None,
        created_at: timestamp(),
        updated_at: timestamp(),
    }
}

pub fn sample_transaction(id: i64, order_id: i64, status: PaymentStatus) -> PaymentTransaction {
    PaymentTransaction {
        id,
        order_id,
        shop_transaction_id: format!("A-10{order_id}-deadbeef"),
        octo_transaction_id: Some("octo-1".to_string()),
        octo_payment_id: None,
        status,
        amount: Money::from(1_250_000),
        currency: "UZS".to_string(),
        verification_url: None,
        seconds_left: None,
        error_code: None,
        error_message: None,
        request_payload: "{}".to_string(),
        response_payload: "{}".to_string(),
        created_at: timestamp(),
        updated_at: timestamp(),
        completed_at: None,
    }
}

pub fn active_otp(id: i64, user_id: i64, clear_code: &str) -> OtpCode {
    OtpCode {
        id,
        user_id,
        purpose: acham_engine::db_types::OtpPurpose::Registration,
        code_hash: acham_engine::helpers::hash_secret(clear_code).expect("Failed to hash test code"),
        attempts: 0,
        is_active: true,
        created_at: Utc::now(),
        expires_at: OtpCode::default_expiry(Utc::now()),
        verified_at: None,
    }
}

/// Spin up a service from the configure closure, fire the request, and hand back status + body.
pub async fn send_request<F>(req: Request, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let _ = env_logger::try_init().ok();
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    let (_, res) = test::call_service(&service, req).await.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}

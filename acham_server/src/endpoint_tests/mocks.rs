use chrono::{DateTime, Utc};
use acham_engine::{
    db_types::{
        Country,
        NewOrder,
        NewPaymentTransaction,
        NewUser,
        OauthState,
        Order,
        OrderStatusType,
        OtpCode,
        OtpPurpose,
        PaymentStatus,
        PaymentTransaction,
        SocialAccount,
        TransactionUpdate,
        User,
    },
    traits::{
        AccountApiError,
        AccountManagement,
        AuthApiError,
        AuthManagement,
        NewOauthState,
        OtpApiError,
        OtpManagement,
        PaymentGatewayDatabase,
        PaymentGatewayError,
    },
};
use mockall::mock;
use octo_tools::{CardData, OctoApiError, OctoGateway, OctoResponse, PrepareChargeRequest};

mock! {
    pub AccountManager {}
    impl AccountManagement for AccountManager {
        async fn fetch_user_by_id(&self, id: i64) -> Result<Option<User>, AccountApiError>;
        async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, AccountApiError>;
        async fn fetch_user_by_phone(&self, phone: &str) -> Result<Option<User>, AccountApiError>;
        async fn create_user(&self, user: NewUser) -> Result<User, AccountApiError>;
        async fn set_phone_verified(&self, user_id: i64) -> Result<User, AccountApiError>;
        async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<(), AccountApiError>;
        async fn fetch_countries(&self) -> Result<Vec<Country>, AccountApiError>;
        async fn fetch_country(&self, id: i64) -> Result<Option<Country>, AccountApiError>;
        async fn fetch_user_for_social(&self, provider: &str, uid: &str) -> Result<Option<User>, AccountApiError>;
        async fn upsert_social_account(
            &self,
            user_id: i64,
            provider: &str,
            uid: &str,
            extra_data: &str,
        ) -> Result<SocialAccount, AccountApiError>;
    }
}

// The credential and social-login routes are generic over AccountManagement + AuthManagement
// together, so this mock implements both.
mock! {
    pub AuthManager {}
    impl AccountManagement for AuthManager {
        async fn fetch_user_by_id(&self, id: i64) -> Result<Option<User>, AccountApiError>;
        async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, AccountApiError>;
        async fn fetch_user_by_phone(&self, phone: &str) -> Result<Option<User>, AccountApiError>;
        async fn create_user(&self, user: NewUser) -> Result<User, AccountApiError>;
        async fn set_phone_verified(&self, user_id: i64) -> Result<User, AccountApiError>;
        async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<(), AccountApiError>;
        async fn fetch_countries(&self) -> Result<Vec<Country>, AccountApiError>;
        async fn fetch_country(&self, id: i64) -> Result<Option<Country>, AccountApiError>;
        async fn fetch_user_for_social(&self, provider: &str, uid: &str) -> Result<Option<User>, AccountApiError>;
        async fn upsert_social_account(
            &self,
            user_id: i64,
            provider: &str,
            uid: &str,
            extra_data: &str,
        ) -> Result<SocialAccount, AccountApiError>;
    }
    impl AuthManagement for AuthManager {
        async fn store_oauth_state(&self, state: NewOauthState) -> Result<(), AuthApiError>;
        async fn pop_oauth_state(&self, provider: &str, state: &str) -> Result<Option<OauthState>, AuthApiError>;
    }
}

mock! {
    pub OtpManager {}
    impl OtpManagement for OtpManager {
        async fn create_otp(
            &self,
            user_id: i64,
            purpose: OtpPurpose,
            code_hash: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<OtpCode, OtpApiError>;
        async fn fetch_active_otp(&self, user_id: i64, purpose: OtpPurpose) -> Result<Option<OtpCode>, OtpApiError>;
        async fn record_failed_attempt(&self, otp_id: i64) -> Result<i64, OtpApiError>;
        async fn deactivate_otp(&self, otp_id: i64) -> Result<(), OtpApiError>;
        async fn consume_otp(&self, otp_id: i64, user_id: i64) -> Result<(), OtpApiError>;
    }
}

mock! {
    pub PaymentManager {}
    impl Clone for PaymentManager {
        fn clone(&self) -> Self;
    }
    impl PaymentGatewayDatabase for PaymentManager {
        async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;
        async fn fetch_order_for_user(
            &self,
            public_id: &str,
            user_id: i64,
        ) -> Result<Option<Order>, PaymentGatewayError>;
        async fn insert_transaction(
            &self,
            transaction: NewPaymentTransaction,
        ) -> Result<PaymentTransaction, PaymentGatewayError>;
        async fn fetch_live_transaction_for_order(
            &self,
            order_id: i64,
        ) -> Result<Option<PaymentTransaction>, PaymentGatewayError>;
        async fn fetch_latest_transaction_for_order(
            &self,
            order_id: i64,
        ) -> Result<Option<PaymentTransaction>, PaymentGatewayError>;
        async fn fetch_transaction_for_order(
            &self,
            order_id: i64,
            octo_transaction_id: &str,
        ) -> Result<Option<PaymentTransaction>, PaymentGatewayError>;
        async fn fetch_transaction_by_gateway_id(
            &self,
            gateway_id: &str,
        ) -> Result<Option<PaymentTransaction>, PaymentGatewayError>;
        async fn transition_transaction(
            &self,
            transaction_id: i64,
            expected_current: PaymentStatus,
            new_status: PaymentStatus,
            update: TransactionUpdate,
        ) -> Result<PaymentTransaction, PaymentGatewayError>;
        async fn record_exchange(
            &self,
            transaction_id: i64,
            update: TransactionUpdate,
        ) -> Result<PaymentTransaction, PaymentGatewayError>;
        async fn finalize_transaction(
            &self,
            transaction_id: i64,
            expected_current: PaymentStatus,
            final_status: PaymentStatus,
            order_status: OrderStatusType,
            update: TransactionUpdate,
        ) -> Result<(PaymentTransaction, Order), PaymentGatewayError>;
    }
}

mock! {
    pub Gateway {}
    impl OctoGateway for Gateway {
        async fn prepare_payment(&self, request: PrepareChargeRequest) -> Result<OctoResponse, OctoApiError>;
        async fn pay(&self, transaction_id: &str, card_data: CardData) -> Result<OctoResponse, OctoApiError>;
        async fn verification_info(&self, transaction_id: &str) -> Result<OctoResponse, OctoApiError>;
        async fn check_sms_key(&self, transaction_id: &str, sms_key: &str) -> Result<OctoResponse, OctoApiError>;
        async fn check_transaction(&self, transaction_id: &str) -> Result<OctoResponse, OctoApiError>;
    }
}

//! `SqliteDatabase` is a concrete implementation of an ACHAM engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{countries, db_url, new_pool, oauth_states, orders, otp_codes, transactions, users};
use crate::{
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

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new connection pool to the database at the URL in `ACHAM_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        debug!("🗃️ Connected to database at {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Runs the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_user_by_id(&self, id: i64) -> Result<Option<User>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(users::fetch_user_by_id(id, &mut conn).await?)
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<User>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(users::fetch_user_by_email(email, &mut conn).await?)
    }

    async fn fetch_user_by_phone(&self, phone: &str) -> Result<Option<User>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(users::fetch_user_by_phone(phone, &mut conn).await?)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        users::insert_user(user, &mut conn).await
    }

    async fn set_phone_verified(&self, user_id: i64) -> Result<User, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        users::set_phone_verified(user_id, &mut conn).await
    }

    async fn update_password_hash(&self, user_id: i64, password_hash: &str) -> Result<(), AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        users::update_password_hash(user_id, password_hash, &mut conn).await
    }

    async fn fetch_countries(&self) -> Result<Vec<Country>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(countries::fetch_countries(&mut conn).await?)
    }

    async fn fetch_country(&self, id: i64) -> Result<Option<Country>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(countries::fetch_country_by_id(id, &mut conn).await?)
    }

    async fn fetch_user_for_social(&self, provider: &str, uid: &str) -> Result<Option<User>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(users::fetch_user_for_social(provider, uid, &mut conn).await?)
    }

    async fn upsert_social_account(
        &self,
        user_id: i64,
        provider: &str,
        uid: &str,
        extra_data: &str,
    ) -> Result<SocialAccount, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(users::upsert_social_account(user_id, provider, uid, extra_data, &mut conn).await?)
    }
}

impl AuthManagement for SqliteDatabase {
    async fn store_oauth_state(&self, state: NewOauthState) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(oauth_states::insert_state(state, &mut conn).await?)
    }

    /// Redeeming a state also sweeps out any entries past their expiry, so abandoned
    /// authorizations don't accumulate.
    async fn pop_oauth_state(&self, provider: &str, state: &str) -> Result<Option<OauthState>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let purged = oauth_states::purge_expired(&mut conn).await?;
        if purged > 0 {
            trace!("🗃️ Purged {purged} expired oauth state entries");
        }
        Ok(oauth_states::pop_state(provider, state, &mut conn).await?)
    }
}

impl OtpManagement for SqliteDatabase {
    /// Supersession and insertion happen in one transaction, so there is never a window with
    /// two active codes.
    async fn create_otp(
        &self,
        user_id: i64,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<OtpCode, OtpApiError> {
        let mut tx = self.pool.begin().await?;
        let superseded = otp_codes::deactivate_active_codes(user_id, purpose, &mut tx).await?;
        if superseded > 0 {
            debug!("🗃️ Superseded {superseded} active OTP code(s) for user #{user_id}");
        }
        let code = otp_codes::insert_code(user_id, purpose, code_hash, expires_at, &mut tx).await?;
        tx.commit().await?;
        Ok(code)
    }

    async fn fetch_active_otp(&self, user_id: i64, purpose: OtpPurpose) -> Result<Option<OtpCode>, OtpApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(otp_codes::fetch_active_code(user_id, purpose, &mut conn).await?)
    }

    async fn record_failed_attempt(&self, otp_id: i64) -> Result<i64, OtpApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(otp_codes::record_failed_attempt(otp_id, &mut conn).await?)
    }

    async fn deactivate_otp(&self, otp_id: i64) -> Result<(), OtpApiError> {
        let mut conn = self.pool.acquire().await?;
        Ok(otp_codes::deactivate_code(otp_id, &mut conn).await?)
    }

    async fn consume_otp(&self, otp_id: i64, user_id: i64) -> Result<(), OtpApiError> {
        let mut tx = self.pool.begin().await?;
        otp_codes::consume_code(otp_id, &mut tx).await?;
        users::set_phone_verified(user_id, &mut tx)
            .await
            .map_err(|e| OtpApiError::DatabaseError(e.to_string()))?;
        tx.commit().await?;
        Ok(())
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    async fn fetch_order_for_user(
        &self,
        public_id: &str,
        user_id: i64,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_for_user(public_id, user_id, &mut conn).await?)
    }

    async fn insert_transaction(
        &self,
        transaction: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        transactions::insert_transaction(transaction, &mut conn).await
    }

    async fn fetch_live_transaction_for_order(
        &self,
        order_id: i64,
    ) -> Result<Option<PaymentTransaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_live_transaction_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_latest_transaction_for_order(
        &self,
        order_id: i64,
    ) -> Result<Option<PaymentTransaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_latest_transaction_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_transaction_for_order(
        &self,
        order_id: i64,
        octo_transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction_for_order(order_id, octo_transaction_id, &mut conn).await?)
    }

    async fn fetch_transaction_by_gateway_id(
        &self,
        gateway_id: &str,
    ) -> Result<Option<PaymentTransaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction_by_gateway_id(gateway_id, &mut conn).await?)
    }

    async fn transition_transaction(
        &self,
        transaction_id: i64,
        expected_current: PaymentStatus,
        new_status: PaymentStatus,
        update: TransactionUpdate,
    ) -> Result<PaymentTransaction, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        transactions::transition_transaction(transaction_id, expected_current, new_status, update, &mut conn).await
    }

    async fn record_exchange(
        &self,
        transaction_id: i64,
        update: TransactionUpdate,
    ) -> Result<PaymentTransaction, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        transactions::record_exchange(transaction_id, update, &mut conn).await
    }

    /// The terminal transaction write and the order-status update commit together or not at
    /// all.
    async fn finalize_transaction(
        &self,
        transaction_id: i64,
        expected_current: PaymentStatus,
        final_status: PaymentStatus,
        order_status: OrderStatusType,
        update: TransactionUpdate,
    ) -> Result<(PaymentTransaction, Order), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let transaction =
            transactions::transition_transaction(transaction_id, expected_current, final_status, update, &mut tx)
                .await?;
        let order = orders::update_order_status(transaction.order_id, order_status, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Transaction [{}] finalized as {final_status}; order {} moved to {order_status}",
            transaction.shop_transaction_id, order.number
        );
        Ok((transaction, order))
    }
}

use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use acham_engine::{AccountApi, AuthApi, OtpApi, PaymentFlowApi, SqliteDatabase};
use log::info;
use octo_tools::OctoApi;

use crate::{
    auth::TokenIssuer,
    config::{PaymentUrls, ProxyConfig, ServerConfig},
    errors::ServerError,
    integrations::{OauthClient, SmsBackend},
    middleware::OctoSignatureFactory,
    payment_routes::{
        payment_notify,
        ConfirmPaymentRoute,
        InitiatePaymentRoute,
        PaymentOtpRoute,
        PaymentStatusRoute,
    },
    routes::{
        health,
        AuthRegisterRoute,
        ChangePasswordRoute,
        CountriesRoute,
        LoginRoute,
        MeRoute,
        PhoneLoginRequestRoute,
        PhoneLoginVerifyRoute,
        RefreshRoute,
        RegisterRoute,
        ResendOtpRoute,
        SocialAuthorizeRoute,
        SocialCallbackRoute,
        VerifyOtpRoute,
        VerifyTokenRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Migrations failed. {e}")))?;
    info!("🚀️ Database migrations are up to date");
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let octo_api = OctoApi::new(config.octo.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let urls = PaymentUrls::from_config(&config);
    let proxy = ProxyConfig::from_config(&config);
    let sms = SmsBackend::from_config(&config.eskiz);
    let oauth = OauthClient::new(config.oauth.clone());
    let auth_config = config.auth.clone();
    let octo_secret = config.octo.shop_secret.clone();
    let notify_checks = config.octo_notify_checks;
    let srv = HttpServer::new(move || {
        let accounts_api = AccountApi::new(db.clone());
        let auth_api = AuthApi::new(db.clone());
        let otp_api = OtpApi::new(db.clone());
        let payments_api = PaymentFlowApi::new(db.clone());
        let jwt_signer = TokenIssuer::new(&auth_config);
        let hmac = OctoSignatureFactory::new(octo_secret.clone(), notify_checks);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("acham::access_log"))
            .app_data(web::Data::new(accounts_api))
            .app_data(web::Data::new(auth_api))
            .app_data(web::Data::new(otp_api))
            .app_data(web::Data::new(payments_api))
            .app_data(web::Data::new(jwt_signer))
            .app_data(web::Data::new(octo_api.clone()))
            .app_data(web::Data::new(sms.clone()))
            .app_data(web::Data::new(oauth.clone()))
            .app_data(web::Data::new(urls.clone()))
            .app_data(web::Data::new(proxy));
        let api_scope = web::scope("/api")
            .service(health)
            // The webhook is the one resource behind the HMAC check, so it's registered by hand
            // instead of via the route! macro.
            .service(
                web::resource("/payments/notify")
                    .wrap(hmac)
                    .route(web::post().to(payment_notify::<SqliteDatabase>)),
            )
            .service(CountriesRoute::<SqliteDatabase>::new())
            .service(RegisterRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(VerifyOtpRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(ResendOtpRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(MeRoute::<SqliteDatabase>::new())
            .service(ChangePasswordRoute::<SqliteDatabase>::new())
            .service(AuthRegisterRoute::<SqliteDatabase>::new())
            .service(LoginRoute::<SqliteDatabase>::new())
            .service(PhoneLoginRequestRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(PhoneLoginVerifyRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(RefreshRoute::<SqliteDatabase>::new())
            .service(VerifyTokenRoute::new())
            .service(SocialAuthorizeRoute::<SqliteDatabase>::new())
            .service(SocialCallbackRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(InitiatePaymentRoute::<SqliteDatabase, OctoApi>::new())
            .service(ConfirmPaymentRoute::<SqliteDatabase, OctoApi>::new())
            .service(PaymentOtpRoute::<SqliteDatabase, OctoApi>::new())
            .service(PaymentStatusRoute::<SqliteDatabase>::new());
        app.service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

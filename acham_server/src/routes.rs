//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any long, non-cpu-bound operation (I/O, database queries, gateway
//! calls) must therefore be expressed as futures or asynchronous functions, which get executed concurrently by worker
//! threads.
use actix_web::{get, web, HttpResponse, Responder};
use acham_engine::{
    api::accounts_api::RegistrationRequest,
    db_types::OtpPurpose,
    traits::{AccountManagement, AuthManagement, OtpManagement},
    AccountApi,
    AuthApi,
    OtpApi,
};
use log::*;

use crate::{
    auth::{JwtClaims, TokenIssuer},
    data_objects::{
        AuthorizeQuery,
        AuthorizeResponse,
        ChangePasswordRequest,
        JsonResponse,
        LoginRequest,
        OauthCallbackRequest,
        PhoneLoginRequest,
        PhoneVerifyRequest,
        RefreshRequest,
        RegisterRequest,
        RegisterResponse,
        ResendOtpRequest,
        TokenPairResponse,
        VerifyOtpRequest,
        VerifyTokenRequest,
    },
    errors::ServerError,
    integrations::{OauthClient, SmsBackend},
};

/// The combined backend contract the credential and social-login handlers need.
pub trait AuthDb: AccountManagement + AuthManagement {}
impl<T: AccountManagement + AuthManagement> AuthDb for T {}

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Countries  --------------------------------------------------
route!(countries => Get "/users/countries" impl AccountManagement);
pub async fn countries<A: AccountManagement>(
    api: web::Data<AccountApi<A>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET countries");
    let countries = api.countries().await?;
    Ok(HttpResponse::Ok().json(countries))
}

//----------------------------------------------   Registration  -----------------------------------------------
route!(register => Post "/users/register" impl AccountManagement, OtpManagement);
/// Register a new user with a country selection.
///
/// When the chosen country requires phone verification, a 6-digit code is issued and delivered
/// to the supplied phone number, and the response carries `requires_otp: true`. A delivery
/// failure is reported in the message, but the code stays valid for a resend.
pub async fn register<A: AccountManagement, O: OtpManagement>(
    body: web::Json<RegisterRequest>,
    accounts: web::Data<AccountApi<A>>,
    otp_api: web::Data<OtpApi<O>>,
    sms: web::Data<SmsBackend>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    trace!("💻️ Received registration request");
    validate_email(&request.email)?;
    if let Some(password) = &request.password {
        validate_password(password)?;
    }
    let registered = accounts
        .register(RegistrationRequest {
            name: request.name,
            email: request.email,
            phone: request.phone,
            country_id: request.country_id,
            password: request.password,
        })
        .await?;
    let mut message = "User registered successfully".to_string();
    if registered.requires_otp {
        let issued = otp_api.request_otp(&registered.user, OtpPurpose::Registration).await?;
        let phone = registered.user.phone.as_deref().unwrap_or_default();
        match sms.send_otp(phone, &issued.code).await {
            Ok(()) => message = "User registered successfully. OTP sent to your phone number.".to_string(),
            Err(e) => {
                warn!("💻️ Could not deliver registration OTP: {e}");
                message = "User registered successfully, but the OTP could not be delivered. Use resend-otp."
                    .to_string();
            },
        }
    }
    debug!("💻️ User #{} registered", registered.user.id);
    Ok(HttpResponse::Created().json(RegisterResponse {
        user: registered.user,
        requires_otp: registered.requires_otp,
        message,
    }))
}

route!(verify_otp => Post "/users/verify-otp/{user_id}" impl AccountManagement, OtpManagement);
/// Verify the registration OTP. On success the user's phone is marked verified and a token
/// pair is issued, logging the user in.
pub async fn verify_otp<A: AccountManagement, O: OtpManagement>(
    path: web::Path<i64>,
    body: web::Json<VerifyOtpRequest>,
    accounts: web::Data<AccountApi<A>>,
    otp_api: web::Data<OtpApi<O>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    trace!("💻️ OTP verification request for user #{user_id}");
    otp_api.verify_otp(user_id, OtpPurpose::Registration, &body.otp_code).await?;
    let user = accounts
        .user_by_id(user_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("User {user_id}")))?;
    let pair = signer.issue_pair(&user)?;
    Ok(HttpResponse::Ok().json(TokenPairResponse::new(pair, user)))
}

route!(resend_otp => Post "/users/resend-otp" impl AccountManagement, OtpManagement);
pub async fn resend_otp<A: AccountManagement, O: OtpManagement>(
    body: web::Json<ResendOtpRequest>,
    accounts: web::Data<AccountApi<A>>,
    otp_api: web::Data<OtpApi<O>>,
    sms: web::Data<SmsBackend>,
) -> Result<HttpResponse, ServerError> {
    let user_id = body.user_id;
    trace!("💻️ OTP resend request for user #{user_id}");
    let user = accounts
        .user_by_id(user_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("User {user_id}")))?;
    let issued = otp_api.request_otp(&user, OtpPurpose::Registration).await?;
    let phone = user.phone.as_deref().unwrap_or_default();
    let response = match sms.send_otp(phone, &issued.code).await {
        Ok(()) => JsonResponse::success("OTP sent successfully to your phone number"),
        Err(e) => {
            warn!("💻️ Could not deliver OTP resend: {e}");
            JsonResponse::failure("OTP issued, but delivery failed. Try again shortly.")
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

//----------------------------------------------   Profile  ----------------------------------------------------
route!(me => Get "/users/me" impl AccountManagement);
pub async fn me<A: AccountManagement>(
    claims: JwtClaims,
    api: web::Data<AccountApi<A>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET profile for user #{}", claims.user_id);
    let user = api
        .user_by_id(claims.user_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("User {}", claims.user_id)))?;
    Ok(HttpResponse::Ok().json(user))
}

route!(change_password => Post "/users/change-password" impl AccountManagement);
pub async fn change_password<A: AccountManagement>(
    claims: JwtClaims,
    body: web::Json<ChangePasswordRequest>,
    api: web::Data<AccountApi<A>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Password change request for user #{}", claims.user_id);
    validate_password(&body.new_password)?;
    api.change_password(claims.user_id, &body.current_password, &body.new_password).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Password updated successfully.")))
}

//----------------------------------------------   Auth  -------------------------------------------------------
route!(auth_register => Post "/auth/register" impl AccountManagement);
/// Email-only registration. No country selection, so no OTP round-trip; the token pair is
/// issued immediately.
pub async fn auth_register<A: AccountManagement>(
    body: web::Json<RegisterRequest>,
    accounts: web::Data<AccountApi<A>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    trace!("💻️ Received email registration request");
    validate_email(&request.email)?;
    let password = request.password.ok_or_else(|| ServerError::field("password", "This field is required."))?;
    validate_password(&password)?;
    let registered = accounts
        .register(RegistrationRequest {
            name: request.name,
            email: request.email,
            phone: request.phone,
            country_id: None,
            password: Some(password),
        })
        .await?;
    let pair = signer.issue_pair(&registered.user)?;
    Ok(HttpResponse::Created().json(TokenPairResponse::new(pair, registered.user)))
}

route!(login => Post "/auth/login" impl AuthDb);
/// Password login with an email address or phone number as the identifier.
pub async fn login<B: AuthDb>(
    body: web::Json<LoginRequest>,
    api: web::Data<AuthApi<B>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received login request");
    let user = api.login_with_password(&body.identifier, &body.password).await?;
    let pair = signer.issue_pair(&user)?;
    debug!("💻️ Issued token pair for user #{}", user.id);
    Ok(HttpResponse::Ok().json(TokenPairResponse::new(pair, user)))
}

route!(phone_login_request => Post "/auth/phone/request" impl AccountManagement, OtpManagement);
/// Request a login OTP for a phone number. Only phones attached to an existing account are
/// accepted.
pub async fn phone_login_request<A: AccountManagement, O: OtpManagement>(
    body: web::Json<PhoneLoginRequest>,
    accounts: web::Data<AccountApi<A>>,
    otp_api: web::Data<OtpApi<O>>,
    sms: web::Data<SmsBackend>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Phone login OTP request");
    let user = accounts
        .user_by_phone(&body.phone)
        .await?
        .ok_or_else(|| ServerError::field("phone", "No account with this phone number."))?;
    let issued = otp_api.request_otp(&user, OtpPurpose::Login).await?;
    match sms.send_otp(&body.phone, &issued.code).await {
        Ok(()) => Ok(HttpResponse::Ok().json(JsonResponse::success("OTP sent to phone number."))),
        Err(e) => {
            warn!("💻️ Could not deliver login OTP: {e}");
            Ok(HttpResponse::Ok().json(JsonResponse::failure("OTP issued, but delivery failed. Try again shortly.")))
        },
    }
}

route!(phone_login_verify => Post "/auth/phone/verify" impl AccountManagement, OtpManagement);
pub async fn phone_login_verify<A: AccountManagement, O: OtpManagement>(
    body: web::Json<PhoneVerifyRequest>,
    accounts: web::Data<AccountApi<A>>,
    otp_api: web::Data<OtpApi<O>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Phone login OTP verification");
    let user = accounts
        .user_by_phone(&body.phone)
        .await?
        .ok_or_else(|| ServerError::field("phone", "No account with this phone number."))?;
    otp_api.verify_otp(user.id, OtpPurpose::Login, &body.otp_code).await?;
    // verify_otp mutated the verification flag; re-read so the response reflects it
    let user = accounts.user_by_id(user.id).await?.unwrap_or(user);
    let pair = signer.issue_pair(&user)?;
    Ok(HttpResponse::Ok().json(TokenPairResponse::new(pair, user)))
}

route!(refresh => Post "/auth/refresh" impl AccountManagement);
/// Spend a refresh token for a fresh pair. Standard rotation: the response carries a new
/// refresh token and clients should discard the old one.
pub async fn refresh<A: AccountManagement>(
    body: web::Json<RefreshRequest>,
    accounts: web::Data<AccountApi<A>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received token refresh request");
    let claims = signer.verify_refresh(&body.refresh)?;
    let user = accounts
        .user_by_id(claims.user_id)
        .await?
        .ok_or_else(|| ServerError::AuthenticationError("Account no longer exists.".to_string()))?;
    let pair = signer.issue_pair(&user)?;
    Ok(HttpResponse::Ok().json(TokenPairResponse::new(pair, user)))
}

route!(verify_token => Post "/auth/verify");
pub async fn verify_token(
    body: web::Json<VerifyTokenRequest>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received token verification request");
    let claims = signer.verify_access(&body.token)?;
    Ok(HttpResponse::Ok().json(claims))
}

//----------------------------------------------   Social login  -----------------------------------------------
route!(social_authorize => Get "/auth/{provider}/authorize" impl AuthDb);
/// Build the provider redirect URL. The state parameter is persisted with a short TTL and must
/// come back unchanged on the callback.
pub async fn social_authorize<B: AuthDb>(
    path: web::Path<String>,
    query: web::Query<AuthorizeQuery>,
    api: web::Data<AuthApi<B>>,
    oauth: web::Data<OauthClient>,
) -> Result<HttpResponse, ServerError> {
    let provider = path.into_inner();
    if !OauthClient::is_known_provider(&provider) {
        return Err(ServerError::NoRecordFound(format!("Unknown provider: {provider}")));
    }
    debug!("💻️ Building authorization URL for {provider}");
    let state = crate::helpers::random_urlsafe_token(43);
    let authorization_url = oauth.build_authorization_url(&provider, &query.redirect_uri, &state)?;
    api.store_oauth_state(&provider, &state, &query.redirect_uri).await?;
    Ok(HttpResponse::Ok().json(AuthorizeResponse { authorization_url, state }))
}

route!(social_callback => Post "/auth/{provider}/callback" impl AuthDb, AccountManagement);
/// Complete the OAuth round-trip: redeem the state, exchange the code, fetch the profile,
/// create-or-match the local user and issue a token pair.
pub async fn social_callback<B: AuthDb, A: AccountManagement>(
    path: web::Path<String>,
    body: web::Json<OauthCallbackRequest>,
    auth_api: web::Data<AuthApi<B>>,
    accounts: web::Data<AccountApi<A>>,
    oauth: web::Data<OauthClient>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError> {
    let provider = path.into_inner();
    if !OauthClient::is_known_provider(&provider) {
        return Err(ServerError::NoRecordFound(format!("Unknown provider: {provider}")));
    }
    trace!("💻️ OAuth callback for {provider}");
    let stored = auth_api.pop_oauth_state(&provider, &body.state).await?;
    if stored.redirect_uri != body.redirect_uri {
        return Err(ServerError::field("redirect_uri", "redirect_uri mismatch."));
    }
    let tokens = oauth.exchange_code(&provider, &body.code, &body.redirect_uri).await?;
    let access_token = tokens["access_token"]
        .as_str()
        .ok_or_else(|| ServerError::field("code", "Access token not returned by the provider."))?;
    let profile = oauth.fetch_profile(&provider, access_token).await?;
    let user = accounts
        .social_login(&provider, &profile.uid, profile.email.as_deref(), profile.name.as_deref(), &profile.raw.to_string())
        .await?;
    let pair = signer.issue_pair(&user)?;
    info!("💻️ Social login via {provider} for user #{}", user.id);
    Ok(HttpResponse::Ok().json(TokenPairResponse::new(pair, user)))
}

//----------------------------------------------   Validation  -------------------------------------------------
pub(crate) fn validate_email(email: &str) -> Result<(), ServerError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ServerError::field("email", "This field is required."));
    }
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(ServerError::field("email", "Enter a valid email address."));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), ServerError> {
    if password.len() < 8 {
        return Err(ServerError::field("password", "Password must be at least 8 characters long."));
    }
    Ok(())
}

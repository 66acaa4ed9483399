//! Payment endpoints: driving an order's charge through the OCTO gateway, and the webhook that
//! finalizes it.
//!
//! The handlers orchestrate in a fixed order: resolve the order for the caller, check the
//! transaction is in the status the operation expects, call the gateway, persist the outcome,
//! respond. The status checks here are advisory (they produce friendly 409s); the engine's
//! compare-and-set transition is what actually enforces the state machine under concurrency.
use actix_web::{web, HttpRequest, HttpResponse};
use acham_engine::{
    db_types::PaymentStatus,
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
    NotificationOutcome,
    PaymentFlowApi,
};
use log::*;
use octo_tools::{
    BasketItem,
    CardData,
    ChargeAccepted,
    OctoGateway,
    PrepareChargeRequest,
    PreparedCharge,
    UserData,
    VerificationInfo,
};

use crate::{
    auth::JwtClaims,
    config::{PaymentUrls, ProxyConfig},
    data_objects::{
        ConfirmPaymentRequest,
        InitiateResponse,
        JsonResponse,
        OrderPaymentStatus,
        PaymentNotification,
        PaymentOtpRequest,
        PaymentStatusResponse,
    },
    errors::ServerError,
    helpers::get_remote_ip,
    route,
};

/// Minutes before a prepared charge expires gateway-side.
const PREPARED_CHARGE_TTL: u32 = 15;

//----------------------------------------------   Initiate  ---------------------------------------------------------
route!(initiate_payment => Post "/payments/{order_id}/initiate" impl PaymentGatewayDatabase, OctoGateway);
/// Start a charge for an order.
///
/// Creates (or reuses) the transaction record and registers the charge with the gateway.
/// Initiating twice is safe: an order with a live transaction gets the existing transaction
/// back instead of a new charge.
pub async fn initiate_payment<B: PaymentGatewayDatabase, G: OctoGateway>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<PaymentFlowApi<B>>,
    gateway: web::Data<G>,
    urls: web::Data<PaymentUrls>,
) -> Result<HttpResponse, ServerError> {
    let public_id = path.into_inner();
    trace!("💻️💳️ Payment initiation for order {public_id} by user #{}", claims.user_id);
    let order = api.order_for_user(&public_id, claims.user_id).await?;
    let (tx, fresh) = api.begin_charge(&order, "{}".to_string()).await?;
    if !fresh && tx.status != PaymentStatus::Pending {
        debug!("💻️💳️ Order {} already has a charge in flight [{}]", order.number, tx.shop_transaction_id);
        return Ok(HttpResponse::Ok().json(InitiateResponse::from(&tx)));
    }
    let request = PrepareChargeRequest {
        shop_transaction_id: tx.shop_transaction_id.clone(),
        total_sum: order.total_amount,
        currency: order.currency.clone(),
        description: format!("Payment for order {}", order.number),
        user_data: UserData {
            user_id: order.user_id.to_string(),
            phone: order.customer_phone.clone().unwrap_or_default(),
            email: order.customer_email.clone().unwrap_or_default(),
        },
        basket: vec![BasketItem {
            position_desc: format!("Order {}", order.number),
            count: 1,
            price: order.total_amount.to_major(),
            spic: String::new(),
            inn: String::new(),
            package_code: String::new(),
            nds: 0,
        }],
        return_url: urls.return_url(&order.public_id),
        notify_url: urls.notify_url(),
        language: "uz".to_string(),
        ttl: PREPARED_CHARGE_TTL,
    };
    let request_json = serde_json::to_string(&request).unwrap_or_default();
    api.record_exchange(tx.id, Some(request_json), None).await?;
    let response = match gateway.prepare_payment(request).await {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("💻️💳️ Gateway unreachable while preparing [{}]. {e}", tx.shop_transaction_id);
            let code = e.gateway_code().map(|c| c.to_string());
            api.mark_failed(tx.id, tx.status, code, Some(e.to_string()), "{}".to_string()).await?;
            return Err(e.into());
        },
    };
    let raw = serde_json::to_string(&response).unwrap_or_default();
    if !response.is_success() {
        let message = response.err_message.clone().unwrap_or_else(|| "Gateway rejected the charge".to_string());
        api.mark_failed(tx.id, tx.status, Some(response.error.to_string()), Some(message.clone()), raw).await?;
        return Err(ServerError::UpstreamError { code: response.error.to_string(), message });
    }
    let charge: PreparedCharge = response.typed_data()?;
    let tx = api.mark_prepared(tx.id, &charge.id, raw).await?;
    info!("💻️💳️ Charge [{}] prepared for order {}", tx.shop_transaction_id, order.number);
    Ok(HttpResponse::Ok().json(InitiateResponse::from(&tx)))
}

//----------------------------------------------   Confirm  ----------------------------------------------------------
route!(confirm_payment => Post "/payments/{order_id}/confirm" impl PaymentGatewayDatabase, OctoGateway);
/// Forward the shopper's card data for a prepared charge.
///
/// Depending on the card, the gateway either demands cardholder verification (SMS key, a
/// hosted OTP page with a time box) or approves immediately; the transaction moves to
/// `VerificationRequired` or `Processing` accordingly.
pub async fn confirm_payment<B: PaymentGatewayDatabase, G: OctoGateway>(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<ConfirmPaymentRequest>,
    api: web::Data<PaymentFlowApi<B>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError> {
    let public_id = path.into_inner();
    let request = body.into_inner();
    trace!("💻️💳️ Payment confirmation for order {public_id}");
    validate_card(&request)?;
    let order = api.order_for_user(&public_id, claims.user_id).await?;
    let tx = api.transaction_for_order(order.id, &request.transaction_id).await?;
    if tx.status != PaymentStatus::Prepared {
        return Err(ServerError::Conflict(format!(
            "Cannot confirm a transaction in status {}. Expected Prepared.",
            tx.status
        )));
    }
    let card = CardData {
        card_number: request.card_number,
        expire: request.expire,
        cardholder_name: request.cardholder_name,
    };
    let response = match gateway.pay(&request.transaction_id, card).await {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("💻️💳️ Gateway unreachable while confirming [{}]. {e}", tx.shop_transaction_id);
            let code = e.gateway_code().map(|c| c.to_string());
            api.mark_failed(tx.id, tx.status, code, Some(e.to_string()), "{}".to_string()).await?;
            return Err(e.into());
        },
    };
    let raw = serde_json::to_string(&response).unwrap_or_default();
    if !response.is_success() {
        let message = response.err_message.clone().unwrap_or_else(|| "Gateway rejected the card".to_string());
        api.mark_failed(tx.id, tx.status, Some(response.error.to_string()), Some(message.clone()), raw).await?;
        return Err(ServerError::UpstreamError { code: response.error.to_string(), message });
    }
    let accepted: ChargeAccepted = response.typed_data().unwrap_or_default();
    debug!(
        "💻️💳️ Card accepted for [{}]. Gateway reports: {}",
        tx.shop_transaction_id,
        accepted.status.as_deref().unwrap_or("no status")
    );
    // The card was accepted. Ask the gateway whether the cardholder must verify; when no
    // verification data comes back the charge is already on the immediate-approval path.
    let tx = match gateway.verification_info(&request.transaction_id).await {
        Ok(info_envelope) if info_envelope.is_success() => {
            let info_raw = serde_json::to_string(&info_envelope).unwrap_or_default();
            let info: VerificationInfo = info_envelope.typed_data()?;
            if info.verification_url.is_some() || info.seconds_left.is_some() {
                api.mark_verification_required(tx.id, info.id, info.verification_url, info.seconds_left, info_raw)
                    .await?
            } else {
                api.mark_processing(tx.id, PaymentStatus::Prepared, info_raw).await?
            }
        },
        Ok(_) | Err(_) => api.mark_processing(tx.id, PaymentStatus::Prepared, raw).await?,
    };
    info!("💻️💳️ Charge [{}] confirmed. Status: {}", tx.shop_transaction_id, tx.status);
    Ok(HttpResponse::Ok().json(PaymentStatusResponse::from(&tx)))
}

//----------------------------------------------   Verify OTP  -------------------------------------------------------
route!(payment_otp => Post "/payments/{order_id}/verify-otp" impl PaymentGatewayDatabase, OctoGateway);
/// Forward the SMS key the shopper received to complete cardholder verification. A rejected key
/// leaves the transaction where it is; the shopper can retry until the gateway's time box runs
/// out.
pub async fn payment_otp<B: PaymentGatewayDatabase, G: OctoGateway>(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<PaymentOtpRequest>,
    api: web::Data<PaymentFlowApi<B>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError> {
    let public_id = path.into_inner();
    trace!("💻️💳️ Payment OTP verification for order {public_id}");
    if body.sms_key.trim().is_empty() {
        return Err(ServerError::field("sms_key", "This field is required."));
    }
    let order = api.order_for_user(&public_id, claims.user_id).await?;
    let tx = api.transaction_for_order(order.id, &body.transaction_id).await?;
    if tx.status != PaymentStatus::VerificationRequired {
        return Err(ServerError::Conflict(format!(
            "Cannot verify a transaction in status {}. Expected VerificationRequired.",
            tx.status
        )));
    }
    let response = match gateway.check_sms_key(&body.transaction_id, &body.sms_key).await {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("💻️💳️ Gateway unreachable while checking SMS key for [{}]. {e}", tx.shop_transaction_id);
            return Err(e.into());
        },
    };
    let raw = serde_json::to_string(&response).unwrap_or_default();
    if !response.is_success() {
        let message = response.err_message.clone().unwrap_or_else(|| "The SMS key was rejected".to_string());
        debug!("💻️💳️ SMS key rejected for [{}]: {message}", tx.shop_transaction_id);
        api.record_exchange(tx.id, None, Some(raw)).await?;
        return Err(ServerError::UpstreamError { code: response.error.to_string(), message });
    }
    let tx = api.mark_processing(tx.id, PaymentStatus::VerificationRequired, raw).await?;
    info!("💻️💳️ Charge [{}] verified. Awaiting the gateway's final word.", tx.shop_transaction_id);
    Ok(HttpResponse::Ok().json(PaymentStatusResponse::from(&tx)))
}

//----------------------------------------------   Status  -----------------------------------------------------------
route!(payment_status => Get "/payments/{order_id}/status" impl PaymentGatewayDatabase);
pub async fn payment_status<B: PaymentGatewayDatabase>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let public_id = path.into_inner();
    trace!("💻️💳️ Payment status poll for order {public_id}");
    let order = api.order_for_user(&public_id, claims.user_id).await?;
    let payment = api.latest_transaction(order.id).await?;
    Ok(HttpResponse::Ok().json(OrderPaymentStatus {
        order_status: order.status,
        paid_at: order.paid_at,
        payment: payment.as_ref().map(PaymentStatusResponse::from),
    }))
}

//----------------------------------------------   Webhook  ----------------------------------------------------------
/// The gateway's webhook. Not registered through the `route!` macro because the HMAC middleware
/// wraps this one resource; see the server assembly.
///
/// Webhook responses must always be in the 200 range, otherwise the gateway keeps retrying —
/// problems are reported inside the JSON body and logged here.
pub async fn payment_notify<B: PaymentGatewayDatabase>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaymentFlowApi<B>>,
    proxy: web::Data<ProxyConfig>,
) -> HttpResponse {
    let peer = get_remote_ip(&req, proxy.use_x_forwarded_for);
    info!(
        "💻️💳️ Gateway notification received from {}",
        peer.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown peer".to_string())
    );
    let raw = String::from_utf8_lossy(&body).into_owned();
    let notification: PaymentNotification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            warn!("💻️💳️ Could not parse gateway notification. {e}");
            return HttpResponse::Ok().json(JsonResponse::failure("Could not parse notification payload."));
        },
    };
    let Some(gateway_id) = notification.gateway_id() else {
        warn!("💻️💳️ Gateway notification carries no transaction id. Ignoring.");
        return HttpResponse::Ok().json(JsonResponse::failure("No transaction id in notification."));
    };
    let Some(reported) = notification.reported_status() else {
        warn!("💻️💳️ Inconclusive gateway notification for {gateway_id}. Ignoring.");
        return HttpResponse::Ok().json(JsonResponse::failure("Inconclusive notification payload."));
    };
    let error_code = notification.error.filter(|code| *code != 0).map(|code| code.to_string());
    let result = api
        .apply_notification(gateway_id, reported, error_code, notification.err_message.clone(), raw)
        .await;
    let response = match result {
        Ok(NotificationOutcome::Finalized { transaction, order }) => {
            info!(
                "💻️💳️ Notification finalized [{}] as {}. Order {} is {}.",
                transaction.shop_transaction_id, transaction.status, order.number, order.status
            );
            JsonResponse::success("Notification processed.")
        },
        Ok(NotificationOutcome::AlreadyFinal(tx)) => {
            JsonResponse::success(format!("Transaction already finalized as {}.", tx.status))
        },
        Err(PaymentGatewayError::TransactionNotFound(id)) => {
            warn!("💻️💳️ Notification for unknown transaction {id}. Ignoring.");
            JsonResponse::failure(format!("Unknown transaction {id}."))
        },
        Err(PaymentGatewayError::IllegalStatusChange { current, requested }) => {
            warn!("💻️💳️ Notification would move {gateway_id} from {current} to {requested}. Refusing.");
            JsonResponse::failure(format!("Illegal status change from {current} to {requested}."))
        },
        Err(e) => {
            warn!("💻️💳️ Could not process gateway notification. {e}");
            JsonResponse::failure("Unexpected error processing notification.")
        },
    };
    HttpResponse::Ok().json(response)
}

//----------------------------------------------   Validation  -------------------------------------------------------
fn validate_card(request: &ConfirmPaymentRequest) -> Result<(), ServerError> {
    let digits = request.card_number.chars().filter(char::is_ascii_digit).count();
    if digits < 13 || digits > 19 {
        return Err(ServerError::field("card_number", "Enter a valid card number."));
    }
    if request.expire.len() != 4 || !request.expire.chars().all(|c| c.is_ascii_digit()) {
        return Err(ServerError::field("expire", "Expiry must be in MMYY format."));
    }
    Ok(())
}

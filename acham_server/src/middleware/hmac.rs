//! Webhook signature guard.
//!
//! OCTO signs every webhook notification it delivers: the `X-Octo-Signature` header carries
//! `base64(HMAC-SHA256(shop_secret, raw_body))`. This guard wraps the notify resource, checks
//! the signature against the configured shop secret before the handler runs, and replays the
//! body so the handler can still read it.
//!
//! Rejections go through the server's error taxonomy, so a bad or missing signature produces
//! the same structured 403 body as any other permission failure.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::HeaderValue,
    web,
    Error,
};
use acham_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::{errors::ServerError, helpers::calculate_hmac};

/// The header OCTO puts its webhook signature in.
pub const OCTO_SIGNATURE_HEADER: &str = "X-Octo-Signature";

/// Wraps the webhook notify resource. When `enabled` is false (local testing only), every
/// notification passes through unchecked.
pub struct OctoSignatureFactory {
    shop_secret: Secret<String>,
    enabled: bool,
}

impl OctoSignatureFactory {
    pub fn new(shop_secret: Secret<String>, enabled: bool) -> Self {
        Self { shop_secret, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for OctoSignatureFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = OctoSignatureMiddleware<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(OctoSignatureMiddleware {
            shop_secret: self.shop_secret.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct OctoSignatureMiddleware<S> {
    shop_secret: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for OctoSignatureMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.shop_secret.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            if !enabled {
                trace!("🔐️ Webhook signature checks are disabled. Passing the notification through.");
                return service.call(req).await;
            }
            let body = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Could not read the webhook body. {e:?}");
                Error::from(ServerError::InvalidRequestBody("Could not read the webhook body.".to_string()))
            })?;
            let provided = req.headers().get(OCTO_SIGNATURE_HEADER);
            if !signature_matches(secret.reveal(), provided, &body) {
                warn!("🔐️ Webhook notification failed the signature check. Rejecting.");
                return Err(
                    ServerError::InsufficientPermissions("Webhook signature is missing or invalid.".to_string())
                        .into(),
                );
            }
            trace!("🔐️ Webhook signature verified ✅️");
            req.set_payload(replay_payload(body));
            service.call(req).await
        })
    }
}

/// `base64(HMAC-SHA256(shop_secret, body))` must equal the header value. A missing or
/// non-ASCII header never matches.
fn signature_matches(secret: &str, provided: Option<&HeaderValue>, body: &[u8]) -> bool {
    let Some(provided) = provided.and_then(|v| v.to_str().ok()) else {
        return false;
    };
    provided == calculate_hmac(secret, body)
}

/// The signature check consumed the request body; hand the handler a fresh payload carrying the
/// same bytes.
fn replay_payload(body: web::Bytes) -> Payload {
    let (_, mut payload) = h1::Payload::create(true);
    payload.unread_data(body);
    Payload::from(payload)
}

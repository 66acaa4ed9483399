mod hmac;

pub use hmac::{OctoSignatureFactory, OctoSignatureMiddleware, OCTO_SIGNATURE_HEADER};

mod api;
mod config;
mod error;

mod data_objects;

pub use api::{OctoApi, OctoGateway};
pub use config::OctoConfig;
pub use data_objects::{
    BasketItem,
    CardData,
    ChargeAccepted,
    OctoResponse,
    PrepareChargeRequest,
    PreparedCharge,
    UserData,
    VerificationInfo,
};
pub use error::OctoApiError;

mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{Money, MoneyConversionError, UZS_CURRENCY_CODE, UZS_CURRENCY_CODE_LOWER};
pub use secret::Secret;

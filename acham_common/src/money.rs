use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const UZS_CURRENCY_CODE: &str = "UZS";
pub const UZS_CURRENCY_CODE_LOWER: &str = "uzs";

//--------------------------------------       Money        ----------------------------------------------------------
/// A monetary amount in minor currency units (tiyin for UZS, cents otherwise).
///
/// Amounts are stored and summed as integers. Conversion to the major unit only happens at the
/// payment-gateway wire boundary, which takes decimal totals.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {} is too large to convert to Money", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let major = self.0 as f64 / 100.0;
        write!(f, "{major:0.2}")
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// The amount expressed in major units, as the gateway wire format wants it.
    pub fn to_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn from_major(major: i64) -> Self {
        Self(major * 100)
    }
}

#[cfg(test)]
mod test {
    use super::Money;

    #[test]
    fn arithmetic() {
        let a = Money::from(1_500);
        let b = Money::from(2_500);
        assert_eq!(a + b, Money::from(4_000));
        assert_eq!(b - a, Money::from(1_000));
        assert_eq!(-a, Money::from(-1_500));
        assert_eq!(a * 3, Money::from(4_500));
        let total: Money = [a, b].into_iter().sum();
        assert_eq!(total, Money::from(4_000));
    }

    #[test]
    fn major_units() {
        let amount = Money::from_major(125_000);
        assert_eq!(amount.value(), 12_500_000);
        assert_eq!(amount.to_major(), 125_000.0);
        assert_eq!(Money::from(1_999).to_string(), "19.99");
    }
}

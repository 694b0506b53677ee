use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::{fmt_grouped, op};

pub const IDR_CURRENCY_CODE: &str = "IDR";
pub const RUB_CURRENCY_CODE: &str = "RUB";

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

//--------------------------------------        Idr         ---------------------------------------------------------
/// A signed amount of Indonesian rupiah, in whole rupiah. Negative amounts indicate the refund direction.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Idr(i64);

op!(binary Idr, Add, add);
op!(binary Idr, Sub, sub);
op!(inplace Idr, AddAssign, add_assign);
op!(inplace Idr, SubAssign, sub_assign);
op!(unary Idr, Neg, neg);

impl From<i64> for Idr {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Sum for Idr {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Display for Idr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {IDR_CURRENCY_CODE}", fmt_grouped(self.0))
    }
}

impl FromStr for Idr {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self).map_err(|e| MoneyConversionError(format!("{s}: {e}")))
    }
}

impl Idr {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn is_refund(&self) -> bool {
        self.0 < 0
    }
}

//--------------------------------------        Rub         ---------------------------------------------------------
/// A signed amount of Russian roubles, in whole roubles. Carries the same sign as the IDR amount it was quoted from.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Rub(i64);

op!(binary Rub, Add, add);
op!(binary Rub, Sub, sub);
op!(inplace Rub, AddAssign, add_assign);
op!(inplace Rub, SubAssign, sub_assign);
op!(unary Rub, Neg, neg);

impl From<i64> for Rub {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Sum for Rub {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Display for Rub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {RUB_CURRENCY_CODE}", fmt_grouped(self.0))
    }
}

impl Rub {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idr_arithmetic() {
        let a = Idr::from(700_000);
        let b = Idr::from(300_000);
        assert_eq!(a + b, Idr::from(1_000_000));
        assert_eq!(a - b, Idr::from(400_000));
        assert_eq!(-a, Idr::from(-700_000));
        assert!(Idr::from(-1).is_refund());
        assert!(!a.is_refund());
    }

    #[test]
    fn sums() {
        let total: Idr = [1_000_000i64, 2_000_000, -500_000].into_iter().map(Idr::from).sum();
        assert_eq!(total, Idr::from(2_500_000));
    }

    #[test]
    fn display_groups_thousands() {
        assert_eq!(Idr::from(1_234_567).to_string(), "1 234 567 IDR");
        assert_eq!(Rub::from(-47).to_string(), "-47 RUB");
    }
}

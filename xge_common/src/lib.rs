mod money;

pub mod op;

mod helpers;

pub use helpers::{fmt_grouped, parse_boolean_flag};
pub use money::{Idr, MoneyConversionError, Rub, IDR_CURRENCY_CODE, RUB_CURRENCY_CODE};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits every `Money` amount is normalised to.
pub const MONEY_SCALE: u32 = 2;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("different currencies: {left} and {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
    #[error("division by zero")]
    DivisionByZero,
    #[error("decimal overflow")]
    Overflow,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),
}

/// Currencies known to the calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Brl,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Brl => "BRL",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BRL" => Ok(Currency::Brl),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            _ => Err(MoneyError::UnknownCurrency(s.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An amount of a single currency, always held at two fractional digits.
///
/// Rounding happens once, when the value is built: every constructor and every
/// arithmetic result goes through [`Money::new`], which rounds half-up (midpoint
/// away from zero). Amounts too large to carry two fractional digits are
/// rejected with `MoneyError::Overflow`. Arithmetic between two values is only
/// defined when their currencies match, so the checked operations return
/// `MoneyError` rather than silently mixing currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Money {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        let mut amount =
            amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        // rescale stops short of the target scale when the mantissa would not fit
        amount.rescale(MONEY_SCALE);
        if amount.scale() != MONEY_SCALE {
            return Err(MoneyError::Overflow);
        }
        Ok(Money { amount, currency })
    }

    pub fn zero(currency: Currency) -> Self {
        Money {
            amount: Decimal::new(0, MONEY_SCALE),
            currency,
        }
    }

    /// Parse a decimal string such as `"10.00"` or `"1e3"`.
    pub fn parse(amount: &str, currency: Currency) -> Result<Self, MoneyError> {
        let trimmed = amount.trim();
        let decimal = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| MoneyError::InvalidAmount(amount.to_string()))?;
        Money::new(decimal, currency)
    }

    /// Build from a float using its exact binary value before rounding.
    pub fn from_f64(amount: f64, currency: Currency) -> Result<Self, MoneyError> {
        let decimal = Decimal::from_f64_retain(amount)
            .ok_or_else(|| MoneyError::InvalidAmount(amount.to_string()))?;
        Money::new(decimal, currency)
    }

    /// Build from an integer mantissa and a decimal scale: `(1099, 2)` is `10.99`.
    pub fn from_scaled(mantissa: i64, scale: u32, currency: Currency) -> Result<Self, MoneyError> {
        let decimal = Decimal::try_from_i128_with_scale(mantissa as i128, scale)
            .map_err(|_| MoneyError::InvalidAmount(format!("{}e-{}", mantissa, scale)))?;
        Money::new(decimal, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn checked_add(self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency_as(&other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Money::new(amount, self.currency)
    }

    pub fn checked_sub(self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency_as(&other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Money::new(amount, self.currency)
    }

    /// Multiply by a dimensionless scalar (a quantity or a rate).
    pub fn checked_mul(self, scalar: impl Into<Decimal>) -> Result<Money, MoneyError> {
        let amount = self
            .amount
            .checked_mul(scalar.into())
            .ok_or(MoneyError::Overflow)?;
        Money::new(amount, self.currency)
    }

    pub fn checked_div(self, scalar: impl Into<Decimal>) -> Result<Money, MoneyError> {
        let scalar = scalar.into();
        if scalar.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }
        let amount = self
            .amount
            .checked_div(scalar)
            .ok_or(MoneyError::Overflow)?;
        Money::new(amount, self.currency)
    }

    /// Compare two amounts of the same currency.
    pub fn try_cmp(&self, other: &Money) -> Result<Ordering, MoneyError> {
        self.same_currency_as(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    pub fn max(self, other: Money) -> Result<Money, MoneyError> {
        match self.try_cmp(&other)? {
            Ordering::Less => Ok(other),
            _ => Ok(self),
        }
    }

    fn same_currency_as(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero(Currency::default())
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl std::ops::Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money {
            amount: -self.amount,
            currency: self.currency,
        }
    }
}

/// Parses an amount in the default currency.
impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s, Currency::default())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.amount)
    }
}

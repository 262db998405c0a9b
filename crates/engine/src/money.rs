use std::{
    fmt,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Number of minor units per major unit (4 fractional digits).
const SCALE: i64 = 10_000;

/// Signed money amount represented as **integer minor units** at 1/10,000 of
/// a major unit.
///
/// Use this type for **all** monetary values in the engine (balances, gross
/// amounts, fees) to avoid floating-point drift. Internal arithmetic keeps 4
/// fractional digits; only [`Display`] rounds, to the 2 digits used for
/// currency display.
///
/// With integer storage, `amount - fee = net` holds exactly and summing `net`
/// back with `fee` reproduces `amount` with no drift.
///
/// # Examples
///
/// ```rust
/// use engine::Amount;
///
/// let gross = "1000.00".parse::<Amount>().unwrap();
/// let fee = "50.00".parse::<Amount>().unwrap();
/// let net = gross.checked_sub(fee).unwrap();
/// assert_eq!(net.checked_add(fee), Some(gross));
/// assert_eq!(net.to_string(), "950.00");
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Creates a new amount from integer minor units (1/10,000).
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates a new amount from whole major units.
    #[must_use]
    pub const fn from_major(major: i64) -> Self {
        Self(major * SCALE)
    }

    /// Returns the raw value in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is 0.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the amount is positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns `true` if the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Subtraction floored at zero.
    ///
    /// Returns the floored result and whether flooring kicked in. A clamped
    /// result is a recoverable bookkeeping inconsistency: the caller logs it
    /// and flags the account for reconciliation instead of failing the
    /// request.
    #[must_use]
    pub fn sub_clamped(self, rhs: Amount) -> (Amount, bool) {
        let raw = self.0 - rhs.0;
        if raw < 0 {
            (Amount::ZERO, true)
        } else {
            (Amount(raw), false)
        }
    }

    /// Normalizes a raw float into an amount, rounding half away from zero to
    /// 4 fractional digits.
    ///
    /// Rejects non-finite input with [`EngineError::InvalidAmount`].
    pub fn from_f64(value: f64) -> Result<Self, EngineError> {
        if !value.is_finite() {
            return Err(EngineError::InvalidAmount(
                "amount must be a finite number".to_string(),
            ));
        }
        let scaled = (value * SCALE as f64).round();
        if scaled.abs() > i64::MAX as f64 {
            return Err(EngineError::InvalidAmount("amount too large".to_string()));
        }
        Ok(Amount(scaled as i64))
    }

    /// Rounded to 2 fractional digits, as minor units.
    ///
    /// Used only at the display boundary; ledger arithmetic never rounds.
    #[must_use]
    pub fn display_minor(self) -> i64 {
        // Round half away from zero on the dropped 2 digits, working on the
        // magnitude so negative halves round down, not toward zero.
        let abs = self.0.unsigned_abs();
        let rem = abs % 100;
        let base = abs - rem;
        let rounded = if rem >= 50 { base + 100 } else { base } as i64;
        if self.0 < 0 { -rounded } else { rounded }
    }
}

impl fmt::Display for Amount {
    /// Formats with 2 fractional digits (currency display precision).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display = self.display_minor();
        let sign = if display < 0 { "-" } else { "" };
        let abs = display.unsigned_abs();
        let major = abs / SCALE as u64;
        let cents = (abs % SCALE as u64) / 100;
        write!(f, "{sign}{major}.{cents:02}")
    }
}

impl From<i64> for Amount {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        Amount(-self.0)
    }
}

impl FromStr for Amount {
    type Err = EngineError;

    /// Parses a decimal string into minor units.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading
    /// `+`/`-`.
    ///
    /// Validation rules:
    /// - max 4 fractional digits (rejects `12.34567`)
    /// - rejects empty/invalid strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || EngineError::InvalidAmount("empty amount".to_string());
        let invalid = || EngineError::InvalidAmount("invalid amount".to_string());
        let overflow = || EngineError::InvalidAmount("amount too large".to_string());

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(empty());
        }

        let (sign, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (-1i64, stripped)
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (1i64, stripped)
        } else {
            (1i64, trimmed)
        };

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(empty());
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let major_str = parts.next().ok_or_else(invalid)?;
        let frac_str = parts.next();

        if parts.next().is_some() {
            return Err(invalid());
        }

        if major_str.is_empty() || !major_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let major: i64 = major_str.parse().map_err(|_| invalid())?;

        let frac: i64 = match frac_str {
            None | Some("") => 0,
            Some(frac) => {
                if frac.len() > 4 || !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(EngineError::InvalidAmount(
                        "too many decimals (max 4)".to_string(),
                    ));
                }
                let digits: i64 = frac.parse().map_err(|_| invalid())?;
                digits * 10i64.pow(4 - frac.len() as u32)
            }
        };

        let total = major
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(overflow)?;

        let signed = if sign < 0 {
            total.checked_neg().ok_or_else(overflow)?
        } else {
            total
        };

        Ok(Amount(signed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_rounds_to_two_decimals() {
        assert_eq!(Amount::from_minor(0).to_string(), "0.00");
        assert_eq!(Amount::from_minor(100).to_string(), "0.01");
        assert_eq!(Amount::from_minor(10_500_000).to_string(), "1050.00");
        assert_eq!(Amount::from_minor(12_3456).to_string(), "12.35");
        assert_eq!(Amount::from_minor(-10_5000).to_string(), "-10.50");
    }

    #[test]
    fn display_rounds_halves_away_from_zero() {
        assert_eq!(Amount::from_minor(12_3450).display_minor(), 12_3500);
        assert_eq!(Amount::from_minor(-12_3450).display_minor(), -12_3500);
        assert_eq!(Amount::from_minor(-12_3449).display_minor(), -12_3400);
        assert_eq!(Amount::from_minor(-12_3450).to_string(), "-12.35");
    }

    #[test]
    fn parse_accepts_up_to_four_decimals() {
        assert_eq!("10".parse::<Amount>().unwrap().minor(), 100_000);
        assert_eq!("10.5".parse::<Amount>().unwrap().minor(), 105_000);
        assert_eq!("10,5025".parse::<Amount>().unwrap().minor(), 105_025);
        assert_eq!("-0.0001".parse::<Amount>().unwrap().minor(), -1);
        assert_eq!("+1.00".parse::<Amount>().unwrap().minor(), 10_000);
        assert_eq!("  2.30 ".parse::<Amount>().unwrap().minor(), 23_000);
    }

    #[test]
    fn parse_rejects_more_than_four_decimals() {
        assert!("12.34567".parse::<Amount>().is_err());
        assert!("0.00001".parse::<Amount>().is_err());
    }

    #[test]
    fn from_f64_rejects_non_finite() {
        assert!(Amount::from_f64(f64::NAN).is_err());
        assert!(Amount::from_f64(f64::INFINITY).is_err());
        assert_eq!(Amount::from_f64(12.3456).unwrap().minor(), 123_456);
    }

    #[test]
    fn net_plus_fee_reproduces_gross_exactly() {
        let gross = "999.9999".parse::<Amount>().unwrap();
        let fee = "33.3333".parse::<Amount>().unwrap();
        let net = gross.checked_sub(fee).unwrap();
        assert_eq!(net.checked_add(fee), Some(gross));
    }

    #[test]
    fn sub_clamped_floors_at_zero() {
        let (v, clamped) = Amount::from_minor(100).sub_clamped(Amount::from_minor(300));
        assert_eq!(v, Amount::ZERO);
        assert!(clamped);

        let (v, clamped) = Amount::from_minor(300).sub_clamped(Amount::from_minor(100));
        assert_eq!(v.minor(), 200);
        assert!(!clamped);
    }
}

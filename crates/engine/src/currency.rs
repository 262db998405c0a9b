use serde::{Deserialize, Serialize};

use crate::EngineError;

/// ISO-like 3-letter currency code attached to accounts and transactions.
///
/// Each transaction settles in a single currency; conversion happens outside
/// the engine. The code is validated at the boundary (exactly 3 ASCII
/// letters, stored uppercase) rather than checked against a whitelist, since
/// the set of settlement currencies is owned by the payment rails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// Canonical uppercase code.
    #[must_use]
    pub fn code(&self) -> &str {
        // Always valid: constructed from validated ASCII letters.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency(*b"USD")
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<&str> for Currency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(EngineError::Validation(format!(
                "invalid currency code: {value:?} (expected 3 letters)"
            )));
        }
        let upper = trimmed.to_ascii_uppercase();
        let bytes = upper.as_bytes();
        Ok(Currency([bytes[0], bytes[1], bytes[2]]))
    }
}

impl TryFrom<String> for Currency {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::try_from(value.as_str())
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_three_letters_and_uppercases() {
        assert_eq!(Currency::try_from("usd").unwrap().code(), "USD");
        assert_eq!(Currency::try_from(" EUR ").unwrap().code(), "EUR");
    }

    #[test]
    fn rejects_bad_codes() {
        assert!(Currency::try_from("").is_err());
        assert!(Currency::try_from("US").is_err());
        assert!(Currency::try_from("USDT").is_err());
        assert!(Currency::try_from("U5D").is_err());
    }
}

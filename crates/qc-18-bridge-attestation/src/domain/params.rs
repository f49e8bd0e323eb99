//! Governance parameters.

use crate::domain::errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;

/// Fractional digits carried by [`Decimal`].
pub const DECIMAL_PRECISION: u32 = 18;

const DECIMAL_SCALE: u128 = 10u128.pow(DECIMAL_PRECISION);

/// Smallest accepted rate-limit window.
pub const MIN_RATE_LIMIT_WINDOW_MS: u64 = 1_000;

/// Default evidence rate-limit window (10 minutes).
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 10 * 60 * 1_000;

/// Fixed-point decimal with 18 fractional digits, serialized as a decimal string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, SerializeDisplay, DeserializeFromStr,
)]
pub struct Decimal(u128);

impl Decimal {
    pub const ZERO: Decimal = Decimal(0);
    pub const ONE: Decimal = Decimal(DECIMAL_SCALE);

    /// `numerator / 10^scale`, e.g. `from_scaled(1, 2)` is 0.01.
    pub const fn from_scaled(numerator: u128, scale: u32) -> Self {
        Self(numerator * 10u128.pow(DECIMAL_PRECISION - scale))
    }

    /// `floor(value × self)`.
    pub fn mul_floor_u64(&self, value: u64) -> u64 {
        let product = u128::from(value) * self.0 / DECIMAL_SCALE;
        u64::try_from(product).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:0width$}",
            self.0 / DECIMAL_SCALE,
            self.0 % DECIMAL_SCALE,
            width = DECIMAL_PRECISION as usize
        )
    }
}

impl FromStr for Decimal {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::InvalidParams(format!("invalid decimal: {s:?}"));
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if int_part.is_empty()
            || frac_part.len() > DECIMAL_PRECISION as usize
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let int: u128 = int_part.parse().map_err(|_| invalid())?;
        let mut frac: u128 = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse().map_err(|_| invalid())?
        };
        frac *= 10u128.pow(DECIMAL_PRECISION - frac_part.len() as u32);

        int.checked_mul(DECIMAL_SCALE)
            .and_then(|v| v.checked_add(frac))
            .map(Decimal)
            .ok_or_else(invalid)
    }
}

/// Tunables of the evidence engine and domain separation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    pub attest_slash_percentage: Decimal,
    pub attest_rate_limit_window: u64,
    pub valset_slash_percentage: Decimal,
    pub valset_rate_limit_window: u64,
    /// Valset evidence older than this is never slashed; 0 disables the check.
    pub attest_penalty_time_cutoff: u64,
    pub mainnet_chain_id: String,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            attest_slash_percentage: Decimal::from_scaled(1, 2),
            attest_rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW_MS,
            valset_slash_percentage: Decimal::from_scaled(1, 2),
            valset_rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW_MS,
            attest_penalty_time_cutoff: 0,
            mainnet_chain_id: "tellor-1".to_string(),
        }
    }
}

impl Params {
    /// Reject params that could never be applied safely.
    pub fn validate(&self) -> BridgeResult<()> {
        validate_percentage("attest_slash_percentage", self.attest_slash_percentage)?;
        validate_percentage("valset_slash_percentage", self.valset_slash_percentage)?;
        validate_window("attest_rate_limit_window", self.attest_rate_limit_window)?;
        validate_window("valset_rate_limit_window", self.valset_rate_limit_window)?;
        if self.mainnet_chain_id.trim().is_empty() {
            return Err(BridgeError::InvalidParams(
                "mainnet_chain_id cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn validate_percentage(name: &str, value: Decimal) -> BridgeResult<()> {
    if value > Decimal::ONE {
        return Err(BridgeError::InvalidParams(format!(
            "{name} must be between 0 and 1, got {value}"
        )));
    }
    Ok(())
}

fn validate_window(name: &str, value: u64) -> BridgeResult<()> {
    if value < MIN_RATE_LIMIT_WINDOW_MS {
        return Err(BridgeError::InvalidParams(format!(
            "{name} must be at least {MIN_RATE_LIMIT_WINDOW_MS} ms, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        let params = Params::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.attest_slash_percentage.to_string(), "0.010000000000000000");
    }

    #[test]
    fn test_decimal_parse() {
        assert_eq!("0.01".parse::<Decimal>().unwrap(), Decimal::from_scaled(1, 2));
        assert_eq!("1".parse::<Decimal>().unwrap(), Decimal::ONE);
        assert!("".parse::<Decimal>().is_err());
        assert!("-0.1".parse::<Decimal>().is_err());
        assert!("0.1234567890123456789".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_mul_floor() {
        let one_percent = Decimal::from_scaled(1, 2);
        assert_eq!(one_percent.mul_floor_u64(1_000), 10);
        assert_eq!(one_percent.mul_floor_u64(99), 0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut params = Params::default();
        params.valset_slash_percentage = "1.5".parse().unwrap();
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.attest_rate_limit_window = 999;
        assert!(params.validate().is_err());

        let mut params = Params::default();
        params.mainnet_chain_id = " ".into();
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_params_json_uses_decimal_strings() {
        let json = serde_json::to_string(&Params::default()).unwrap();
        assert!(json.contains("\"attest_slash_percentage\":\"0.010000000000000000\""));
        let back: Params = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Params::default());
    }
}

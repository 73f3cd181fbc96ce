//! Kubernetes resource quantity parsing
//!
//! Quantities follow the apimachinery grammar: an unsigned decimal number with
//! an optional binary suffix (`Ki`..`Ei`), decimal suffix (`n`..`E`), or
//! decimal exponent (`e9`, `E3`). Resolving a quantity to whole base units
//! rounds up, matching how the API server reports `Value()`.

use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a quantity string
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    /// The quantity string was empty
    #[error("quantity is empty")]
    Empty,

    /// The numeric part is not a decimal number
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    /// The suffix is not a known binary, decimal, or exponent suffix
    #[error("unknown suffix '{0}'")]
    UnknownSuffix(String),

    /// Resource quantities must not be negative
    #[error("quantity must not be negative")]
    Negative,

    /// The value does not fit in 64 bits of base units
    #[error("quantity out of range")]
    Overflow,
}

/// A parsed quantity, kept exact until it is resolved to base units.
///
/// The value is `mantissa * 10^scale10 * 2^exp2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quantity {
    mantissa: u128,
    scale10: i32,
    exp2: u32,
}

/// Longest digit string that always fits in a u128
const MAX_DIGITS: usize = 38;

impl Quantity {
    /// Resolve to whole base units (bytes, cores), rounding up.
    pub fn ceil_units(&self) -> Result<u64, QuantityError> {
        let shifted = 1u128
            .checked_shl(self.exp2)
            .and_then(|factor| self.mantissa.checked_mul(factor))
            .ok_or(QuantityError::Overflow)?;

        let units = if self.scale10 >= 0 {
            10u128
                .checked_pow(self.scale10.unsigned_abs())
                .and_then(|factor| shifted.checked_mul(factor))
                .ok_or(QuantityError::Overflow)?
        } else {
            match 10u128.checked_pow(self.scale10.unsigned_abs()) {
                Some(divisor) => shifted.div_ceil(divisor),
                // Divisor exceeds any representable mantissa, so the value is below one unit
                None => u128::from(shifted > 0),
            }
        };

        u64::try_from(units).map_err(|_| QuantityError::Overflow)
    }

    /// Returns true if the quantity is zero
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let unsigned = match s.as_bytes()[0] {
            b'-' => return Err(QuantityError::Negative),
            b'+' => &s[1..],
            _ => s,
        };

        let number_end = unsigned
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_end);

        let (int_part, frac_part) = match number.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (number, ""),
        };
        if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
            return Err(QuantityError::InvalidNumber(number.to_string()));
        }

        let digits = format!("{int_part}{frac_part}");
        let significant = digits.trim_start_matches('0');
        if significant.len() > MAX_DIGITS {
            return Err(QuantityError::Overflow);
        }
        let mantissa = if significant.is_empty() {
            0
        } else {
            significant
                .parse::<u128>()
                .map_err(|_| QuantityError::InvalidNumber(number.to_string()))?
        };

        let (exp10, exp2) = parse_suffix(suffix)?;
        let frac_len = i32::try_from(frac_part.len()).map_err(|_| QuantityError::Overflow)?;

        Ok(Self {
            mantissa,
            scale10: exp10.checked_sub(frac_len).ok_or(QuantityError::Overflow)?,
            exp2,
        })
    }
}

/// Map a suffix to its (decimal exponent, binary exponent) pair
fn parse_suffix(suffix: &str) -> Result<(i32, u32), QuantityError> {
    let scale = match suffix {
        "" => (0, 0),
        "Ki" => (0, 10),
        "Mi" => (0, 20),
        "Gi" => (0, 30),
        "Ti" => (0, 40),
        "Pi" => (0, 50),
        "Ei" => (0, 60),
        "n" => (-9, 0),
        "u" => (-6, 0),
        "m" => (-3, 0),
        "k" => (3, 0),
        "M" => (6, 0),
        "G" => (9, 0),
        "T" => (12, 0),
        "P" => (15, 0),
        "E" => (18, 0),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))
                .ok_or_else(|| QuantityError::UnknownSuffix(suffix.to_string()))?;
            let exp10 = exponent
                .parse::<i32>()
                .map_err(|_| QuantityError::UnknownSuffix(suffix.to_string()))?;
            (exp10, 0)
        }
    };
    Ok(scale)
}

/// Parse a quantity string and resolve it to whole base units.
pub fn parse_units(s: &str) -> Result<u64, QuantityError> {
    s.parse::<Quantity>()?.ceil_units()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_suffixes() {
        assert_eq!(parse_units("1G").unwrap(), 1_000_000_000);
        assert_eq!(parse_units("64M").unwrap(), 64_000_000);
        assert_eq!(parse_units("2k").unwrap(), 2_000);
        assert_eq!(parse_units("1E").unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn binary_suffixes() {
        assert_eq!(parse_units("1Ki").unwrap(), 1024);
        assert_eq!(parse_units("8Mi").unwrap(), 8 * 1024 * 1024);
        assert_eq!(parse_units("1Gi").unwrap(), 1_073_741_824);
    }

    #[test]
    fn fractions_and_exponents() {
        assert_eq!(parse_units("1.5Gi").unwrap(), 1_610_612_736);
        assert_eq!(parse_units("0.5G").unwrap(), 500_000_000);
        assert_eq!(parse_units("1e9").unwrap(), 1_000_000_000);
        assert_eq!(parse_units("1E3").unwrap(), 1_000);
        assert_eq!(parse_units("+128").unwrap(), 128);
        assert_eq!(parse_units(".5k").unwrap(), 500);
    }

    #[test]
    fn sub_unit_values_round_up() {
        assert_eq!(parse_units("1m").unwrap(), 1);
        assert_eq!(parse_units("1500m").unwrap(), 2);
        assert_eq!(parse_units("0.1").unwrap(), 1);
        assert_eq!(parse_units("1e-50").unwrap(), 1);
        assert_eq!(parse_units("0m").unwrap(), 0);
    }

    #[test]
    fn zero_detection() {
        assert!("0".parse::<Quantity>().unwrap().is_zero());
        assert!("0.000Gi".parse::<Quantity>().unwrap().is_zero());
        assert!(!"1m".parse::<Quantity>().unwrap().is_zero());
    }

    #[test]
    fn rejects_malformed_quantities() {
        assert_eq!(parse_units(""), Err(QuantityError::Empty));
        assert_eq!(parse_units("-1G"), Err(QuantityError::Negative));
        assert!(matches!(
            parse_units("abc"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            parse_units("1.2.3"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            parse_units("12XB"),
            Err(QuantityError::UnknownSuffix(s)) if s == "XB"
        ));
        assert!(matches!(
            parse_units("1 G"),
            Err(QuantityError::UnknownSuffix(_))
        ));
    }

    #[test]
    fn rejects_values_beyond_u64() {
        assert_eq!(parse_units("100Ei"), Err(QuantityError::Overflow));
        assert_eq!(parse_units("1e40"), Err(QuantityError::Overflow));
    }
}

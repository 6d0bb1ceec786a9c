//! Kubernetes resource quantity parsing
//!
//! Quantities are kept as exact rationals so `100m` is exactly a tenth and
//! rounding happens once, upward, the way the API server does it.

use crate::error::SourceError;
use std::str::FromStr;

/// A parsed quantity, `numerator / denominator` in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity {
    numerator: i128,
    denominator: i128,
}

impl Quantity {
    /// Value in thousandths of a base unit, rounded up
    pub fn milli_value(&self) -> i64 {
        self.scaled_ceil(1000)
    }

    /// Value in base units, rounded up
    pub fn value(&self) -> i64 {
        self.scaled_ceil(1)
    }

    fn scaled_ceil(&self, factor: i128) -> i64 {
        let Some(scaled) = self.numerator.checked_mul(factor) else {
            return if self.numerator < 0 { i64::MIN } else { i64::MAX };
        };
        let ceil = -((-scaled).div_euclid(self.denominator));
        i64::try_from(ceil).unwrap_or(if ceil < 0 { i64::MIN } else { i64::MAX })
    }
}

impl FromStr for Quantity {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SourceError::Malformed(format!("invalid quantity: {:?}", s));

        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
            .unwrap_or(s.len());
        let (mantissa, suffix) = s.split_at(split);

        let (digits, scale) = parse_mantissa(mantissa).ok_or_else(malformed)?;
        let (mult_num, mult_den) = parse_suffix(suffix).ok_or_else(malformed)?;

        let numerator = digits.checked_mul(mult_num).ok_or_else(malformed)?;
        let denominator = 10i128
            .checked_pow(scale)
            .and_then(|d| d.checked_mul(mult_den))
            .ok_or_else(malformed)?;

        Ok(Quantity {
            numerator,
            denominator,
        })
    }
}

/// Signed decimal digits and the count of fractional digits
fn parse_mantissa(m: &str) -> Option<(i128, u32)> {
    let (negative, unsigned) = match m.as_bytes().first() {
        Some(b'-') => (true, &m[1..]),
        Some(b'+') => (false, &m[1..]),
        _ => (false, m),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut value: i128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as i128)?;
    }

    let scale = u32::try_from(frac_part.len()).ok()?;
    Some((if negative { -value } else { value }, scale))
}

/// Multiplier for a suffix as `(numerator, denominator)`
fn parse_suffix(suffix: &str) -> Option<(i128, i128)> {
    let binary = |power: u32| Some((1024i128.pow(power), 1));

    match suffix {
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        "n" => decimal(-9),
        "u" => decimal(-6),
        "m" => decimal(-3),
        "" => decimal(0),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            decimal(exponent.parse().ok()?)
        }
    }
}

fn decimal(exponent: i32) -> Option<(i128, i128)> {
    let magnitude = 10i128.checked_pow(exponent.unsigned_abs())?;
    if exponent >= 0 {
        Some((magnitude, 1))
    } else {
        Some((1, magnitude))
    }
}

/// CPU quantity in fractional cores, rounded up to whole millicores
pub fn cpu_cores(quantity: &str) -> Result<f64, SourceError> {
    Ok(quantity.parse::<Quantity>()?.milli_value() as f64 / 1000.0)
}

/// Memory quantity in bytes, rounded up
pub fn memory_bytes(quantity: &str) -> Result<i64, SourceError> {
    Ok(quantity.parse::<Quantity>()?.value())
}

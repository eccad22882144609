use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::SqlMiddlewareDbError;

/// Largest number of significant digits a `Decimal` carries (fits an `i128` mantissa).
pub const MAX_PRECISION: u32 = 38;

/// Exact fixed-point number: `mantissa * 10^-scale`.
///
/// Decimal and identity columns round-trip through this type without passing through `f64`,
/// so a key such as `1234567891234` or an amount such as `0.10` stays exact.
///
/// ```rust
/// use remote_sql_middleware::types::Decimal;
///
/// let d: Decimal = "-12.50".parse().unwrap();
/// assert_eq!(d.to_string(), "-12.50");
/// assert_eq!(d, "-12.5".parse().unwrap());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    /// Build from an unscaled integer and a scale. Scales above 38 are clamped.
    #[must_use]
    pub const fn new(mantissa: i128, scale: u32) -> Self {
        let scale = if scale > MAX_PRECISION {
            MAX_PRECISION
        } else {
            scale
        };
        Self { mantissa, scale }
    }

    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        Self {
            mantissa: value as i128,
            scale: 0,
        }
    }

    #[must_use]
    pub const fn mantissa(&self) -> i128 {
        self.mantissa
    }

    #[must_use]
    pub const fn scale(&self) -> u32 {
        self.scale
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Re-express at `scale` without losing information.
    ///
    /// Returns `None` if that would drop non-zero fractional digits or overflow the mantissa.
    #[must_use]
    pub fn rescale(&self, scale: u32) -> Option<Self> {
        match scale.cmp(&self.scale) {
            Ordering::Equal => Some(*self),
            Ordering::Greater => {
                let factor = pow10(scale - self.scale)?;
                let mantissa = self.mantissa.checked_mul(factor)?;
                Some(Self { mantissa, scale })
            }
            Ordering::Less => {
                let factor = pow10(self.scale - scale)?;
                if self.mantissa % factor != 0 {
                    return None;
                }
                Some(Self {
                    mantissa: self.mantissa / factor,
                    scale,
                })
            }
        }
    }

    /// Drop trailing fractional zeros.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let mut out = *self;
        while out.scale > 0 && out.mantissa % 10 == 0 {
            out.mantissa /= 10;
            out.scale -= 1;
        }
        out
    }

    /// The value as an `i64` when it is integral and in range.
    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        let normalized = self.normalize();
        if normalized.scale != 0 {
            return None;
        }
        i64::try_from(normalized.mantissa).ok()
    }

    /// Lossy conversion, for display or arithmetic the caller opts into.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        // Display/parse keeps the conversion correctly rounded.
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Quantise a binary float at a declared scale, e.g. a `DECIMAL(15,2)` value that an engine
    /// handed back as a double.
    #[must_use]
    pub fn from_f64_at_scale(value: f64, scale: u32) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scale = scale.min(MAX_PRECISION);
        format!("{value:.prec$}", prec = scale as usize).parse().ok()
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10_i128.checked_pow(exp)
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.normalize(), other.normalize());
        a.mantissa == b.mantissa && a.scale == b.scale
    }
}

impl Eq for Decimal {}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        if self.scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl FromStr for Decimal {
    type Err = SqlMiddlewareDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SqlMiddlewareDbError::ConversionError(format!("invalid decimal '{s}'"));
        let trimmed = s.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let significant = int_part.trim_start_matches('0').len() + frac_part.len();
        if significant > MAX_PRECISION as usize {
            return Err(SqlMiddlewareDbError::ConversionError(format!(
                "decimal '{s}' exceeds {MAX_PRECISION} digits"
            )));
        }
        let mut mantissa: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(b - b'0')))
                .ok_or_else(invalid)?;
        }
        if negative {
            mantissa = -mantissa;
        }
        let scale = u32::try_from(frac_part.len()).map_err(|_| invalid())?;
        Ok(Decimal::new(mantissa, scale))
    }
}

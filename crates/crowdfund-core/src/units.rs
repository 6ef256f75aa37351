//! Conversion between the ledger's smallest monetary unit and the unit shown
//! to people.
//!
//! Amounts are held as integers end to end; the display form is produced and
//! parsed digit by digit so no floating point rounding can creep in.

use thiserror::Error;

/// Amount expressed in the ledger's smallest indivisible unit.
pub type Wei = u128;

/// Returned when a display amount is not a non-negative decimal that fits the
/// unit's precision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid amount {input:?}: {reason}")]
pub struct InvalidAmount {
    pub input: String,
    pub reason: &'static str,
}

/// Fixed-point converter for one denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitConverter {
    decimals: u32,
    symbol: &'static str,
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::ETHER
    }
}

impl UnitConverter {
    /// 1 ETH = 10^18 wei.
    pub const ETHER: UnitConverter = UnitConverter {
        decimals: 18,
        symbol: "ETH",
    };

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    fn scale(&self) -> u128 {
        10u128.pow(self.decimals)
    }

    /// Parse a display amount such as `"1.25"` into base units.
    ///
    /// Accepts an integer part, optionally followed by `.` and between one
    /// and `decimals` fractional digits. Signs, exponents and bare `".5"` or
    /// `"5."` forms are rejected.
    ///
    /// Surrounding whitespace, leading zeros and trailing fractional zeros
    /// are accepted, so `"01"`, `" 2"` and `"1.50"` parse to the same amounts
    /// as `"1"`, `"2"` and `"1.5"`. Only canonical strings, as produced by
    /// [`to_display_unit`](Self::to_display_unit), survive a round trip
    /// unchanged.
    pub fn to_base_unit(&self, display: &str) -> Result<Wei, InvalidAmount> {
        let invalid = |reason| InvalidAmount {
            input: display.to_string(),
            reason,
        };

        let trimmed = display.trim();
        if trimmed.is_empty() {
            return Err(invalid("amount is empty"));
        }
        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (trimmed, None),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a non-negative decimal number"));
        }

        let mut base = parse_digits(whole)
            .and_then(|w| w.checked_mul(self.scale()))
            .ok_or_else(|| invalid("amount out of range"))?;

        if let Some(fraction) = fraction {
            if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("not a non-negative decimal number"));
            }
            let digits = fraction.len() as u32;
            if digits > self.decimals {
                return Err(invalid("more fractional digits than the unit supports"));
            }
            let fractional = parse_digits(fraction)
                .and_then(|f| f.checked_mul(10u128.pow(self.decimals - digits)))
                .ok_or_else(|| invalid("amount out of range"))?;
            base = base
                .checked_add(fractional)
                .ok_or_else(|| invalid("amount out of range"))?;
        }
        Ok(base)
    }

    /// Render base units in the display denomination, without trailing
    /// fractional zeros (`1500000000000000000` → `"1.5"`).
    pub fn to_display_unit(&self, base: Wei) -> String {
        let scale = self.scale();
        let whole = base / scale;
        let fraction = base % scale;
        if fraction == 0 {
            return whole.to_string();
        }
        let digits = format!("{:0width$}", fraction, width = self.decimals as usize);
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }

    /// Display amount followed by the unit symbol.
    pub fn format(&self, base: Wei) -> String {
        format!("{} {}", self.to_display_unit(base), self.symbol)
    }
}

fn parse_digits(digits: &str) -> Option<u128> {
    digits.bytes().try_fold(0u128, |acc, b| {
        acc.checked_mul(10)?.checked_add(u128::from(b - b'0'))
    })
}

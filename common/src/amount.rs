// Big-integer amount handling (spec §9: "parsing via double-precision float
// is imprecise for high-decimal tokens; parse as arbitrary-precision integer
// and divide by 10^decimals to a decimal").

use alloy_primitives::U256;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Decodes the 32-byte big-endian `data` field of a `Transfer` log into its
/// raw integer amount.
pub fn decode_amount_be(data: &[u8]) -> U256 {
    U256::from_be_slice(data)
}

/// Converts a raw on-chain integer amount to a human-readable decimal given
/// the token's `decimals`. `Decimal`'s mantissa is only 96 bits, narrower
/// than `i128`, so values above `2^96` go through `Decimal::from_str` on the
/// full base-10 string instead of the panicking `from_i128_with_scale`.
pub fn raw_to_decimal(raw: U256, decimals: u8) -> Option<Decimal> {
    let from_i128 = i128::try_from(raw)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, 0).ok());

    let mut value = match from_i128 {
        Some(v) => v,
        None => Decimal::from_str(&raw.to_string()).ok()?,
    };
    value.set_scale(decimals as u32).ok()?;
    Some(value)
}

/// `amount * price`, both as decimals to avoid float drift on the threshold
/// comparison in spec §4.8.1.
pub fn usd_value(amount: Decimal, price: f64) -> Decimal {
    let price = Decimal::from_f64(price).unwrap_or(Decimal::ZERO);
    amount * price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_amount_from_32_byte_word() {
        let mut data = [0u8; 32];
        data[31] = 5;
        assert_eq!(decode_amount_be(&data), U256::from(5u64));
    }

    #[test]
    fn raw_to_decimal_applies_scale() {
        let raw = U256::from(5_000_000_000_000_000_000u128); // 5 * 10^18
        let d = raw_to_decimal(raw, 18).unwrap();
        assert_eq!(d, Decimal::from(5));
    }

    #[test]
    fn raw_to_decimal_handles_zero_decimals() {
        let raw = U256::from(42u64);
        let d = raw_to_decimal(raw, 0).unwrap();
        assert_eq!(d, Decimal::from(42));
    }

    #[test]
    fn usd_value_multiplies_amount_by_price() {
        let amount = Decimal::from(5);
        let value = usd_value(amount, 2.0);
        assert_eq!(value, Decimal::from(10));
    }

    #[test]
    fn raw_to_decimal_handles_values_above_96_bit_mantissa() {
        // 2^96 overflows Decimal's mantissa even though it fits in an i128;
        // from_i128_with_scale would panic here, so this must take the
        // from_str fallback.
        let raw = U256::from(1u128) << 96;
        let d = raw_to_decimal(raw, 18).unwrap();
        assert_eq!(d, Decimal::from_str("79228162514.264337593543950336").unwrap());
    }
}

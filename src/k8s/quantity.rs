//! Kubernetes resource quantity parsing for memory values

use anyhow::{anyhow, Result};

const MI: u64 = 1024 * 1024;

/// Parse a memory quantity ("512Mi", "1Gi", "128974848", "129e6", "1.5G")
/// into bytes. Fractional bytes are rounded up, as Kubernetes does.
///
/// Arithmetic is exact: the quantity is kept as an integer ratio, so large
/// values do not lose precision, and values beyond `u64` are an error.
pub fn parse_memory_quantity(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);

    let invalid = || anyhow!("invalid quantity '{}'", raw);
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(invalid());
    }

    // value = mantissa * numerator / denominator
    let mantissa: u128 = format!("{whole}{fraction}").parse().map_err(|_| invalid())?;
    let mut denominator = pow(10, fraction.len() as u32, raw)?;
    let mut numerator: u128 = 1;

    match suffix {
        "" => {}
        "Ki" => numerator = pow(1024, 1, raw)?,
        "Mi" => numerator = pow(1024, 2, raw)?,
        "Gi" => numerator = pow(1024, 3, raw)?,
        "Ti" => numerator = pow(1024, 4, raw)?,
        "Pi" => numerator = pow(1024, 5, raw)?,
        "Ei" => numerator = pow(1024, 6, raw)?,
        "m" => denominator = checked(denominator.checked_mul(1000), raw)?,
        "k" => numerator = pow(1000, 1, raw)?,
        "M" => numerator = pow(1000, 2, raw)?,
        "G" => numerator = pow(1000, 3, raw)?,
        "T" => numerator = pow(1000, 4, raw)?,
        "P" => numerator = pow(1000, 5, raw)?,
        "E" => numerator = pow(1000, 6, raw)?,
        s if s.starts_with('e') || s.starts_with('E') => {
            let exponent: i32 = s[1..]
                .parse()
                .map_err(|_| anyhow!("invalid quantity exponent '{}'", raw))?;
            let scale = pow(10, exponent.unsigned_abs(), raw)?;
            if exponent >= 0 {
                numerator = scale;
            } else {
                denominator = checked(denominator.checked_mul(scale), raw)?;
            }
        }
        _ => return Err(anyhow!("unknown quantity suffix in '{}'", raw)),
    };

    let scaled = checked(mantissa.checked_mul(numerator), raw)?;
    let bytes = scaled.div_ceil(denominator);
    u64::try_from(bytes).map_err(|_| anyhow!("quantity '{}' out of range", raw))
}

fn pow(base: u128, exponent: u32, raw: &str) -> Result<u128> {
    checked(base.checked_pow(exponent), raw)
}

fn checked(value: Option<u128>, raw: &str) -> Result<u128> {
    value.ok_or_else(|| anyhow!("quantity '{}' out of range", raw))
}

/// Whole mebibytes in a byte count
pub fn bytes_to_mi(bytes: u64) -> i64 {
    (bytes / MI) as i64
}

//! Id parsing for request bodies
//!
//! Ids travel as strings: decimal, or hex with a `0x` prefix. Id lists are
//! comma-separated.

use crate::error::ApiError;

/// Parse a decimal or `0x`-prefixed hex number into `T`
pub fn parse_id<T>(field: &str, raw: &str) -> Result<T, ApiError>
where
    T: TryFrom<u64>,
{
    let trimmed = raw.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    let value =
        parsed.map_err(|_| ApiError::BadRequest(format!("Invalid {}: {:?}", field, raw)))?;
    T::try_from(value)
        .map_err(|_| ApiError::BadRequest(format!("{} out of range: {}", field, raw)))
}

/// Parse a comma-separated id list; empty entries are rejected
pub fn parse_id_list<T>(field: &str, raw: &str) -> Result<Vec<T>, ApiError>
where
    T: TryFrom<u64>,
{
    raw.split(',')
        .map(|part| {
            if part.trim().is_empty() {
                Err(ApiError::BadRequest(format!("Empty entry in {}: {:?}", field, raw)))
            } else {
                parse_id(field, part)
            }
        })
        .collect()
}

/// Parse a hex string into bytes
pub fn parse_hex(field: &str, raw: &str) -> Result<Vec<u8>, ApiError> {
    hex::decode(raw.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid {} - must be hex string: {}", field, e)))
}

/// Treat zero as absent, as the timed-interaction fields do
pub fn nonzero<T: Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.filter(|v| *v != T::default())
}

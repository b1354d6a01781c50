use std::str::FromStr;

use rust_decimal::Decimal;

use crate::currency::CurrencyCode;
use crate::error::DecodeError;

/// One currency and its rate, as found in a feed description.
#[derive(Debug, Clone, PartialEq)]
pub struct RatePair {
    pub code: CurrencyCode,
    pub value: Decimal,
}

/// Splits a description like `"AUD 1.6150 BGN 1.9558"` into rate pairs.
///
/// Tokens are taken two at a time as code/value. An odd token count is an
/// error rather than a silently dropped tail.
pub fn decode_rate_line(raw: &str) -> Result<Vec<RatePair>, DecodeError> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let mut pairs = Vec::with_capacity(tokens.len() / 2);

    for chunk in tokens.chunks(2) {
        let [code, value] = chunk else {
            return Err(DecodeError::DanglingToken {
                token: chunk[0].to_string(),
            });
        };

        let code = CurrencyCode::parse(code)?;
        let value = Decimal::from_str(value).map_err(|_| DecodeError::InvalidValue {
            code: code.to_string(),
            value: value.to_string(),
        })?;

        pairs.push(RatePair { code, value });
    }

    Ok(pairs)
}

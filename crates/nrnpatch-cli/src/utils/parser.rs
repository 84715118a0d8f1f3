use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid format: '{0}'. Expected KEY=VALUE.")]
    MissingSeparator(String),

    #[error("Key cannot be empty in '{0}'.")]
    EmptyKey(String),

    #[error("Invalid number for '{key}': '{value}'.")]
    InvalidNumber { key: String, value: String },
}

/// Splits `key=value` at the first `=`. Whitespace around both parts is dropped.
pub fn parse_key_value(pair: &str) -> Result<(&str, &str), ParseError> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| ParseError::MissingSeparator(pair.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::EmptyKey(pair.to_string()));
    }
    Ok((key, value.trim()))
}

pub fn parse_number(key: &str, value: &str) -> Result<f64, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_at_the_first_separator() {
        assert_eq!(parse_key_value("object=NetCon").unwrap(), ("object", "NetCon"));
        assert_eq!(parse_key_value(" a = b=c ").unwrap(), ("a", "b=c"));
        assert_eq!(parse_key_value("empty=").unwrap(), ("empty", ""));
    }

    #[test]
    fn malformed_pairs_are_rejected() {
        assert_eq!(
            parse_key_value("novalue"),
            Err(ParseError::MissingSeparator("novalue".to_string()))
        );
        assert_eq!(parse_key_value("=1"), Err(ParseError::EmptyKey("=1".to_string())));
    }

    #[test]
    fn numbers_are_parsed_with_their_key_in_errors() {
        assert_eq!(parse_number("celsius", "6.3").unwrap(), 6.3);
        assert_eq!(
            parse_number("celsius", "warm"),
            Err(ParseError::InvalidNumber {
                key: "celsius".to_string(),
                value: "warm".to_string()
            })
        );
    }
}

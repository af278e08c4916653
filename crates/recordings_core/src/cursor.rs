//! Continuation cursors as they cross the HTTP boundary: URL-safe base64 of
//! the scan service's `LastEvaluatedKey` JSON.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;

use crate::RecordingsError;

pub fn encode_cursor(key: &Value) -> String {
    URL_SAFE_NO_PAD.encode(key.to_string())
}

pub fn decode_cursor(token: &str) -> Result<Value, RecordingsError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim().trim_end_matches('='))
        .map_err(|e| RecordingsError::InvalidCursor(e.to_string()))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| RecordingsError::InvalidCursor(e.to_string()))?;
    if !value.is_object() {
        return Err(RecordingsError::InvalidCursor(
            "cursor must be a JSON object".into(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cursor_survives_encoding() {
        let key = json!({"id": {"S": "rec-0042"}});
        let token = encode_cursor(&key);
        assert!(!token.contains('/') && !token.contains('+'));
        assert_eq!(decode_cursor(&token).unwrap(), key);
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(matches!(
            decode_cursor("%%%"),
            Err(RecordingsError::InvalidCursor(_))
        ));
        let not_object = URL_SAFE_NO_PAD.encode("[1,2]");
        assert!(decode_cursor(&not_object).is_err());
    }
}

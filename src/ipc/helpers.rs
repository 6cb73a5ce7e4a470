use super::types::Request;

pub fn param_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Week numbers arrive as JSON integers; anything outside u8 cannot be a
/// valid week, so it maps to None here and range checks happen later.
pub fn param_week(req: &Request, key: &str) -> Option<u8> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .and_then(|w| u8::try_from(w).ok())
}

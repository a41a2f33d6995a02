use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Decoded payload of an access token.
///
/// Only `exp` drives renewal; everything else is kept in `extra` so callers
/// can inspect it.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessClaims {
    pub exp: Option<i64>,
    pub extra: Map<String, Value>,
}

impl AccessClaims {
    /// A non-numeric `exp` is treated as missing. Fractional values are
    /// truncated to whole seconds.
    pub fn from_payload(mut payload: Map<String, Value>) -> Self {
        let exp = payload
            .remove("exp")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));
        Self { exp, extra: payload }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// Delay until the renewal should fire, or `None` when there is no
    /// expiry or `now` is already inside the lead window.
    pub fn renewal_delay(&self, now: DateTime<Utc>, lead: Duration) -> Option<Duration> {
        let exp = self.exp?;
        let lead_ms = i64::try_from(lead.as_millis()).ok()?;
        let fire_in_ms = exp
            .checked_mul(1000)?
            .checked_sub(now.timestamp_millis())?
            .checked_sub(lead_ms)?;
        if fire_in_ms > 0 {
            Some(Duration::from_millis(fire_in_ms as u64))
        } else {
            None
        }
    }
}

/// Decode the middle segment of a `header.payload.signature` token.
///
/// Returns `None` for anything that is not exactly three segments with a
/// base64url JSON object in the middle. The signature is not verified.
pub fn decode_claims(token: &str) -> Option<AccessClaims> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(AccessClaims::from_payload(map)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn token_with_payload(payload: &str) -> String {
        format!("eyJhbGciOiJIUzI1NiJ9.{}.c2ln", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn test_decode_valid_token() {
        let token = token_with_payload(r#"{"exp":1700000000,"user_id":7}"#);
        let claims = decode_claims(&token).expect("claims should decode");
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.extra.get("user_id"), Some(&Value::from(7)));
    }

    #[test]
    fn test_decode_accepts_padding() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":12}"#);
        assert!(payload.ends_with('='));
        let token = format!("h.{}.s", payload);
        assert_eq!(decode_claims(&token).and_then(|c| c.exp), Some(12));
    }

    #[test]
    fn test_decode_without_exp() {
        let token = token_with_payload(r#"{"sub":"alice"}"#);
        let claims = decode_claims(&token).expect("claims should decode");
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn test_decode_wrong_segment_count() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"exp":1}"#);
        assert!(decode_claims("").is_none());
        assert!(decode_claims("single").is_none());
        assert!(decode_claims(&format!("h.{}", payload)).is_none());
        assert!(decode_claims(&format!("h.{}.s.extra", payload)).is_none());
    }

    #[test]
    fn test_decode_invalid_payload() {
        assert!(decode_claims("h.!!not-base64!!.s").is_none());
        assert!(decode_claims(&token_with_payload("not json")).is_none());
        assert!(decode_claims(&token_with_payload("[1,2,3]")).is_none());
    }

    #[test]
    fn test_decode_non_numeric_exp() {
        let claims = decode_claims(&token_with_payload(r#"{"exp":"soon"}"#))
            .expect("object payload should decode");
        assert_eq!(claims.exp, None);

        let claims = decode_claims(&token_with_payload(r#"{"exp":1700000000.9}"#))
            .expect("object payload should decode");
        assert_eq!(claims.exp, Some(1_700_000_000));
    }

    #[test]
    fn test_renewal_delay() {
        let now = Utc.timestamp_opt(1_000_000, 0).unwrap();
        let lead = Duration::from_secs(300);
        let claims = |exp| AccessClaims { exp: Some(exp), extra: Map::new() };

        assert_eq!(
            claims(1_000_600).renewal_delay(now, lead),
            Some(Duration::from_secs(300))
        );
        // Exactly at the window edge and inside it: nothing to schedule
        assert_eq!(claims(1_000_300).renewal_delay(now, lead), None);
        assert_eq!(claims(1_000_100).renewal_delay(now, lead), None);
        assert_eq!(claims(999_000).renewal_delay(now, lead), None);

        let no_exp = AccessClaims { exp: None, extra: Map::new() };
        assert_eq!(no_exp.renewal_delay(now, lead), None);
    }

    #[test]
    fn test_expires_at() {
        let claims = AccessClaims { exp: Some(1_700_000_000), extra: Map::new() };
        assert_eq!(claims.expires_at().map(|d| d.timestamp()), Some(1_700_000_000));
    }
}

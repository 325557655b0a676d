//! Fail-closed expiry checks over the `exp` claim of JWT-shaped tokens.
//!
//! Only the payload segment is decoded and only the `exp` claim is read; signatures are the
//! server's concern. Anything that cannot be decoded is treated as expired.

// crates.io
use base64::{
	Engine, alphabet,
	engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
// self
use crate::_prelude::*;

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Deserialize)]
struct ExpiryClaim {
	exp: serde_json::Number,
}

/// Pure expiry predicate with an optional clock-skew leeway.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpiryChecker {
	leeway: Duration,
}
impl ExpiryChecker {
	/// Creates a checker that treats tokens as expired `leeway` before their claim.
	///
	/// Negative leeways are clamped to zero.
	pub fn with_leeway(leeway: Duration) -> Self {
		Self { leeway: if leeway.is_negative() { Duration::ZERO } else { leeway } }
	}

	/// Returns the configured leeway.
	pub fn leeway(&self) -> Duration {
		self.leeway
	}

	/// Returns `true` when the token is absent, undecodable, or expired now.
	pub fn is_expired(&self, token: Option<&str>) -> bool {
		self.is_expired_at(token, OffsetDateTime::now_utc())
	}

	/// Returns `true` only when the token carries an `exp` claim that has passed.
	///
	/// Unlike [`is_expired`](Self::is_expired) this does not fail closed: opaque tokens are
	/// reported as live.
	pub fn is_known_expired(&self, token: &str) -> bool {
		expiry_claim(token).is_some() && self.is_expired(Some(token))
	}

	/// Returns `true` when the token is absent, undecodable, or expired at `now`.
	pub fn is_expired_at(&self, token: Option<&str>, now: OffsetDateTime) -> bool {
		let Some(expires_at) = token.and_then(expiry_claim) else {
			return true;
		};

		now.unix_timestamp()
			.checked_add(self.leeway.whole_seconds())
			.is_none_or(|deadline| expires_at <= deadline)
	}
}

/// Zero-leeway expiry check; see [`ExpiryChecker::is_expired`].
pub fn is_expired(token: Option<&str>) -> bool {
	ExpiryChecker::default().is_expired(token)
}

/// Extracts the `exp` claim (unix seconds) from a JWT-shaped token.
pub fn expiry_claim(token: &str) -> Option<i64> {
	let mut segments = token.split('.');
	let (Some(_header), Some(payload), Some(_signature), None) =
		(segments.next(), segments.next(), segments.next(), segments.next())
	else {
		return None;
	};
	let bytes = PAYLOAD_ENGINE.decode(payload).ok()?;
	let claim = serde_json::from_slice::<ExpiryClaim>(&bytes).ok()?;

	match claim.exp.as_i64() {
		Some(exp) => Some(exp),
		// Fractional timestamps round down; out-of-range values fail closed.
		None => claim.exp.as_f64().filter(|v| v.is_finite() && v.abs() < 1e15).map(|v| v as i64),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
	use time::macros;
	// self
	use super::*;

	fn token_with_payload(payload: &str) -> String {
		format!("eyJhbGciOiJub25lIn0.{}.sig", URL_SAFE_NO_PAD.encode(payload))
	}

	#[test]
	fn absent_and_malformed_tokens_are_expired() {
		let checker = ExpiryChecker::default();

		assert!(checker.is_expired(None));
		assert!(checker.is_expired(Some("")));
		assert!(checker.is_expired(Some("not-a-jwt")));
		assert!(checker.is_expired(Some("a.b")));
		assert!(checker.is_expired(Some("a.b.c.d")));
		assert!(checker.is_expired(Some("a.%%%.c")));
		assert!(checker.is_expired(Some(&token_with_payload("not json"))));
		assert!(checker.is_expired(Some(&token_with_payload(r#"{"sub":"no-exp"}"#))));
		assert!(checker.is_expired(Some(&token_with_payload(r#"{"exp":"soon"}"#))));
		assert!(is_expired(None));
	}

	#[test]
	fn expiry_boundary_is_inclusive() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let at = now.unix_timestamp();
		let checker = ExpiryChecker::default();

		assert!(checker.is_expired_at(Some(&token_with_payload(&format!(r#"{{"exp":{at}}}"#))), now));
		assert!(
			checker.is_expired_at(Some(&token_with_payload(&format!(r#"{{"exp":{}}}"#, at - 1))), now)
		);
		assert!(
			!checker
				.is_expired_at(Some(&token_with_payload(&format!(r#"{{"exp":{}}}"#, at + 1))), now)
		);
	}

	#[test]
	fn leeway_expires_tokens_early() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let token = token_with_payload(&format!(r#"{{"exp":{}}}"#, now.unix_timestamp() + 30));

		assert!(!ExpiryChecker::default().is_expired_at(Some(&token), now));
		assert!(ExpiryChecker::with_leeway(Duration::seconds(30)).is_expired_at(Some(&token), now));
		assert_eq!(ExpiryChecker::with_leeway(Duration::seconds(-5)).leeway(), Duration::ZERO);
	}

	#[test]
	fn opaque_tokens_are_not_known_expired() {
		let checker = ExpiryChecker::default();
		let past = token_with_payload(r#"{"exp":1}"#);
		let future = token_with_payload(r#"{"exp":99999999999}"#);

		assert!(!checker.is_known_expired("T2"));
		assert!(checker.is_expired(Some("T2")));
		assert!(checker.is_known_expired(&past));
		assert!(!checker.is_known_expired(&future));
	}

	#[test]
	fn oversized_leeway_fails_closed() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let token = token_with_payload(&format!(r#"{{"exp":{}}}"#, now.unix_timestamp() + 3_600));
		let checker = ExpiryChecker::with_leeway(Duration::MAX);

		assert_eq!(checker.leeway(), Duration::MAX);
		assert!(checker.is_expired_at(Some(&token), now));
		assert!(checker.is_expired(Some(&token)));
	}

	#[test]
	fn claim_decoding_tolerates_padding_and_fractions() {
		let padded = format!("h.{}.s", URL_SAFE.encode(r#"{"exp": 1700000000}"#));

		assert_eq!(expiry_claim(&padded), Some(1_700_000_000));
		assert_eq!(expiry_claim(&token_with_payload(r#"{"exp":1700000000.75}"#)), Some(1_700_000_000));
		assert_eq!(expiry_claim(&token_with_payload(r#"{"exp":1e300}"#)), None);
	}
}

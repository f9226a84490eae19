//! Header mutator (§4.6): applies a configured `{set, remove}` policy on the
//! first attempt, and restores a retried attempt to the captured original
//! headers before re-applying the same policy. Pseudo-headers (`:path`,
//! `:method`, …) and the gateway-internal header prefix are never touched.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::HeaderMutationPolicy;

/// Headers under this prefix are never emitted in a mutation, matching the
/// "gateway-internal prefix" carve-out in §4.6.
pub const INTERNAL_HEADER_PREFIX: &str = "x-gateway-internal-";

fn is_pseudo_or_internal(name: &str) -> bool {
	name.starts_with(':') || name.starts_with(INTERNAL_HEADER_PREFIX)
}

/// Applies `remove` then `set` to `headers` in place, skipping pseudo and
/// internal-prefixed names.
pub fn apply_first_attempt(headers: &mut HeaderMap, policy: &HeaderMutationPolicy) {
	for name in &policy.remove {
		if is_pseudo_or_internal(name) {
			continue;
		}
		if let Ok(header_name) = HeaderName::try_from(name.as_str()) {
			headers.remove(&header_name);
		}
	}
	for (name, value) in &policy.set {
		if is_pseudo_or_internal(name) {
			continue;
		}
		if let (Ok(header_name), Ok(header_value)) =
			(HeaderName::try_from(name.as_str()), HeaderValue::from_str(value))
		{
			headers.insert(header_name, header_value);
		}
	}
}

/// Restores `headers` (the current, already-mutated request) to the
/// `original` snapshot for any header not named by `set` or `remove`, then
/// re-applies the policy. Matches §8's retry invariant: any header present
/// in `original` and not overridden by `set` and not listed in `remove` is
/// restored to its original value.
pub fn apply_retry(headers: &mut HeaderMap, original: &HeaderMap, policy: &HeaderMutationPolicy) {
	let set_names: Vec<&str> = policy.set.iter().map(|(n, _)| n.as_str()).collect();
	let remove_names: Vec<&str> = policy.remove.iter().map(|s| s.as_str()).collect();

	let current_names: Vec<HeaderName> = headers.keys().cloned().collect();
	for name in current_names {
		let key = name.as_str();
		if is_pseudo_or_internal(key) {
			continue;
		}
		if set_names.contains(&key) || remove_names.contains(&key) {
			continue;
		}
		if !original.contains_key(&name) {
			headers.remove(&name);
		}
	}

	for (name, value) in original {
		let key = name.as_str();
		if is_pseudo_or_internal(key) {
			continue;
		}
		if set_names.contains(&key) || remove_names.contains(&key) {
			continue;
		}
		headers.insert(name.clone(), value.clone());
	}

	apply_first_attempt(headers, policy);
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy(set: &[(&str, &str)], remove: &[&str]) -> HeaderMutationPolicy {
		HeaderMutationPolicy {
			set: set.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect(),
			remove: remove.iter().map(|s| s.to_string()).collect(),
		}
	}

	#[test]
	fn first_attempt_applies_set_and_remove() {
		let mut headers = HeaderMap::new();
		headers.insert("authorization", "Bearer old".parse().unwrap());
		headers.insert("x-keep", "v".parse().unwrap());
		let policy = policy(&[("authorization", "Bearer A")], &["x-keep"]);
		apply_first_attempt(&mut headers, &policy);
		assert_eq!(headers.get("authorization").unwrap(), "Bearer A");
		assert!(!headers.contains_key("x-keep"));
	}

	#[test]
	fn retry_restores_originals_not_in_set_or_remove() {
		let mut original = HeaderMap::new();
		original.insert("authorization", "Bearer A".parse().unwrap());
		original.insert("x-trace", "trace-1".parse().unwrap());

		let mut headers = original.clone();
		let first_policy = policy(&[("authorization", "Bearer A")], &[]);
		apply_first_attempt(&mut headers, &first_policy);
		headers.insert("x-added-by-first-attempt", "yes".parse().unwrap());

		let retry_policy = policy(&[], &["authorization"]);
		apply_retry(&mut headers, &original, &retry_policy);

		assert!(!headers.contains_key("authorization"));
		assert_eq!(headers.get("x-trace").unwrap(), "trace-1");
		assert!(!headers.contains_key("x-added-by-first-attempt"));
	}

	#[test]
	fn never_touches_internal_prefix() {
		let mut headers = HeaderMap::new();
		headers.insert("x-gateway-internal-epoch", "1".parse().unwrap());
		let policy = policy(&[], &["x-gateway-internal-epoch"]);
		apply_first_attempt(&mut headers, &policy);
		assert!(headers.contains_key("x-gateway-internal-epoch"));
	}
}

//! AWS SigV4 request signing for the Bedrock translator. Grounded on the
//! `aws` signing module found alongside the teacher's Bedrock provider,
//! which builds a `SignableRequest` from method/uri/headers/body and
//! applies the resulting signature to an `http::Request`.

use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4::SigningParams;
use secrecy::ExposeSecret;

use crate::config::BackendAuth;
use crate::error::TranslateError;

/// The headers SigV4 signing adds or overwrites, computed against a
/// synthetic `http::Request` built purely to host the signature — the
/// translator itself never issues the request.
pub fn sign_headers(
	method: &str,
	uri: &str,
	headers: &[(String, String)],
	body: &[u8],
	auth: &BackendAuth,
) -> Result<Vec<(String, String)>, TranslateError> {
	let (access_key_id, secret_access_key, session_token, region) = match auth {
		BackendAuth::Aws {
			access_key_id,
			secret_access_key,
			session_token,
			region,
		} => (
			access_key_id.expose_secret().to_string(),
			secret_access_key.expose_secret().to_string(),
			session_token.as_ref().map(|t| t.expose_secret().to_string()),
			region.clone(),
		),
		_ => return Err(TranslateError::Signing("backend auth is not AWS".to_string())),
	};

	let mut credentials_builder = Credentials::builder()
		.access_key_id(access_key_id)
		.secret_access_key(secret_access_key)
		.provider_name("bedrock");
	if let Some(token) = session_token {
		credentials_builder = credentials_builder.session_token(token);
	}
	let credentials = credentials_builder.build();

	let signing_params = SigningParams::builder()
		.identity(&credentials.into())
		.region(&region)
		.name("bedrock")
		.time(SystemTime::now())
		.settings(SigningSettings::default())
		.build()
		.map_err(|e| TranslateError::Signing(e.to_string()))?
		.into();

	let signable_request = SignableRequest::new(
		method,
		uri,
		headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
		SignableBody::Bytes(body),
	)
	.map_err(|e| TranslateError::Signing(e.to_string()))?;

	let (signature, _) = sign(signable_request, &signing_params)
		.map_err(|e| TranslateError::Signing(e.to_string()))?
		.into_parts();

	let mut request = http::Request::builder()
		.method(method)
		.uri(uri)
		.body(())
		.map_err(|e| TranslateError::Signing(e.to_string()))?;
	for (name, value) in headers {
		if let (Ok(name), Ok(value)) = (
			http::HeaderName::from_bytes(name.as_bytes()),
			http::HeaderValue::from_str(value),
		) {
			request.headers_mut().insert(name, value);
		}
	}
	signature.apply_to_request_http1x(&mut request);

	Ok(
		request
			.headers()
			.iter()
			.filter_map(|(name, value)| {
				value
					.to_str()
					.ok()
					.map(|v| (name.as_str().to_string(), v.to_string()))
			})
			.collect(),
	)
}

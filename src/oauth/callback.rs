//! Redirect callback parsing.

use std::collections::BTreeMap;

use super::AuthorizationError;

/// A callback that carried an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    /// The `code` parameter.
    pub code: String,
    /// The `state` parameter, when present.
    pub state: Option<String>,
    /// Every decoded query parameter.
    pub params: BTreeMap<String, String>,
}

/// Parse the query string of a callback URL.
///
/// Pairs are `&`-delimited; the first `=` splits key from value; a pair
/// without `=` has an empty value. Values are percent-decoded. The fragment
/// is ignored.
///
/// # Errors
///
/// [`AuthorizationError::MalformedCallback`] for a value that does not decode
/// to UTF-8 or a repeated key.
pub fn parse_query(callback: &str) -> Result<BTreeMap<String, String>, AuthorizationError> {
    let without_fragment = callback.split('#').next().unwrap_or_default();
    let query = without_fragment
        .split_once('?')
        .map(|(_, q)| q)
        .unwrap_or_default();

    let mut params = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(raw).map_err(|e| {
            AuthorizationError::MalformedCallback(format!("parameter {key:?}: {e}"))
        })?;
        if params.insert(key.to_owned(), value.into_owned()).is_some() {
            return Err(AuthorizationError::MalformedCallback(format!(
                "parameter {key:?} repeated"
            )));
        }
    }
    Ok(params)
}

/// Decide what a callback means.
///
/// `code` wins over `error`. Neither present is malformed.
///
/// # Errors
///
/// [`AuthorizationError::OAuthDenied`] or
/// [`AuthorizationError::MalformedCallback`].
pub fn classify(callback: &str) -> Result<AuthorizationCode, AuthorizationError> {
    let mut params = parse_query(callback)?;
    if let Some(code) = params.get("code").cloned() {
        return Ok(AuthorizationCode {
            code,
            state: params.get("state").cloned(),
            params,
        });
    }
    match params.remove("error") {
        Some(error) => Err(AuthorizationError::OAuthDenied {
            error,
            description: params.remove("error_description"),
        }),
        None => Err(AuthorizationError::MalformedCallback(
            "callback has neither code nor error".to_owned(),
        )),
    }
}

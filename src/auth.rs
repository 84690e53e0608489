//! OAuth 2.0 implicit grant: authorization URL construction and redirect
//! validation against a persisted CSRF state value.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    consts::CSRF_FILE_SUFFIX,
    error::{Error, Result},
    settings::Settings,
    util::{redact_access_token, write_private_file},
};

/// Authenticated API session. The token's expiry is enforced by the server.
#[derive(Clone)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("token", &"***").finish()
    }
}

/// File-backed store for the per-login CSRF state, keyed by client id.
#[derive(Debug, Clone)]
pub struct CsrfStore {
    path: PathBuf,
}

impl CsrfStore {
    pub fn new(dir: &Path, client_id: &str) -> Self {
        Self {
            path: dir.join(format!("{client_id}{CSRF_FILE_SUFFIX}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, state: &str) -> Result<()> {
        write_private_file(&self.path, state)?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let value = fs::read_to_string(&self.path)?;
        let value = value.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Builds the authorization redirect and persists its fresh `state`.
pub fn begin(settings: &Settings, store: &CsrfStore) -> Result<AuthorizationRequest> {
    let state = uuid::Uuid::new_v4().to_string();
    let request = authorization_request(settings, state)?;
    store.save(&request.state)?;
    debug!("auth: stored CSRF state in {:?}", store.path());
    Ok(request)
}

pub fn authorization_request(settings: &Settings, state: String) -> Result<AuthorizationRequest> {
    let mut url = reqwest::Url::parse(&settings.authorization_endpoint).map_err(|error| {
        Error::Config(format!("Invalid authorization endpoint: {error}"))
    })?;
    url.query_pairs_mut()
        .append_pair("response_type", "token")
        .append_pair("client_id", &settings.client_id)
        .append_pair("scope", &settings.scopes)
        .append_pair("redirect_uri", &settings.redirect_uri)
        .append_pair("state", &state);

    Ok(AuthorizationRequest {
        url: url.into(),
        state,
    })
}

/// Validates the redirect the authorization server sent back.
///
/// `redirect` may be the full redirect URL or only its fragment. The stored
/// state is cleared only when it matches; on mismatch nothing is touched.
pub fn complete(redirect: &str, store: &CsrfStore) -> Result<Session> {
    debug!("auth: completing from {}", redact_access_token(redirect));
    let fragment = fragment_of(redirect);
    let token = extract_from_fragment("access_token", fragment).ok_or(Error::MissingToken)?;

    let returned = extract_from_fragment("state", fragment);
    let expected = store.load()?;
    match (returned, expected.as_deref()) {
        (Some(returned), Some(expected)) if returned == expected => {}
        _ => {
            warn!("auth: CSRF state mismatch, aborting login");
            return Err(Error::CsrfMismatch);
        }
    }

    store.clear()?;
    Ok(Session::new(token))
}

fn fragment_of(redirect: &str) -> &str {
    match redirect.split_once('#') {
        Some((_, fragment)) => fragment,
        None => redirect,
    }
}

/// Value of `name` in an `a=1&b=2` style fragment.
pub fn extract_from_fragment<'a>(name: &str, fragment: &'a str) -> Option<&'a str> {
    fragment
        .trim_start_matches('#')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

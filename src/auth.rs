//! htpasswd credentials and the basic-auth middleware.
//!
//! Only bcrypt hashes are supported.  Entries with another hash format still
//! count as present (so probing cannot distinguish them from wrong
//! passwords), but never authenticate, and a warning is logged for them.

use std::collections::HashMap;
use std::io;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use camino::Utf8Path;
use tracing::warn;

use crate::api::ApiError;
use crate::server::AppState;

//----------- Htpasswd ---------------------------------------------------------

/// The outcome of an authentication attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// The credentials check out.
    Granted,

    /// The user exists but the password (or the stored hash) does not verify.
    Denied,

    /// No such user.
    UnknownUser,
}

/// An htpasswd-style credential set.
#[derive(Clone, Debug, Default)]
pub struct Htpasswd {
    users: HashMap<String, String>,
}

impl Htpasswd {
    /// Load `user:hash` lines from a file.  Lines without a `:` are skipped.
    pub fn from_file(path: &Utf8Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_lines(&text))
    }

    fn from_lines(text: &str) -> Self {
        let mut users = HashMap::new();
        for line in text.lines() {
            if let Some((user, hash)) = line.split_once(':') {
                users.insert(user.to_string(), hash.to_string());
            }
        }
        Self { users }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check a username/password pair.
    pub fn authenticate(&self, user: &str, password: &str) -> Access {
        let Some(hash) = self.users.get(user) else {
            return Access::UnknownUser;
        };
        match bcrypt::verify(password, hash) {
            Ok(true) => Access::Granted,
            Ok(false) => Access::Denied,
            Err(_) => {
                warn!(user, "htpasswd hash is not bcrypt");
                Access::Denied
            }
        }
    }
}

//----------- Middleware -------------------------------------------------------

/// Axum middleware rejecting requests without valid basic-auth credentials.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some((user, password)) = basic_credentials(&request) {
        if state.htpasswd.authenticate(&user, &password) == Access::Granted {
            return next.run(request).await;
        }
    }

    let mut response = ApiError::unauthorized().into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"Restricted\""),
    );
    response
}

/// Extract the username and password from an `Authorization: Basic` header.
fn basic_credentials(request: &Request) -> Option<(String, String)> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(BASE64.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

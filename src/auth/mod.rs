// Authentication strategies. Both end with a bearer value that the API
// client attaches to every REST call; the credential flow additionally
// leaves session cookies in the transport.

pub mod oauth2;
pub mod user_password;

use std::fmt;

pub use oauth2::OAuth2Authenticator;
pub use user_password::UserPasswordAuthenticator;

use crate::error::{Result, SharepointError};
use crate::http::HttpTransport;

/// How to log in, chosen once when the client is set up.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Account login through the federation STS and cookie sign-in.
    UserPassword { username: String, password: String },
    /// App-only OAuth2 client credentials grant.
    ClientSecret {
        client_id: String,
        client_secret: String,
    },
}

impl Credentials {
    pub fn user_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::UserPassword {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn client_secret(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Credentials::ClientSecret {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Run the matching handshake and return the bearer token.
    pub fn authenticate<T: HttpTransport>(
        &self,
        transport: &T,
        base_url: &str,
        site_url: &str,
    ) -> Result<String> {
        match self {
            Credentials::UserPassword { username, password } => {
                UserPasswordAuthenticator::new(transport, base_url).authenticate(username, password)
            }
            Credentials::ClientSecret {
                client_id,
                client_secret,
            } => OAuth2Authenticator::new(transport, base_url, site_url)
                .authenticate(client_id, client_secret),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::ClientSecret { client_id, .. } => f
                .debug_struct("ClientSecret")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Fold a failure from one handshake step into an `Auth` error.
pub(crate) fn step_failed(step: &str, error: SharepointError) -> SharepointError {
    match error {
        SharepointError::Auth(_) => error,
        other => SharepointError::Auth(format!("{step}: {other}")),
    }
}

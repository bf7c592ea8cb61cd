// Library root
// -----------
// A blocking SharePoint client: two login flows, folder/file REST calls
// and a resumable chunked upload for large files. The binary (`main.rs`)
// drives these modules through the `ui` command-line surface.
//
// Module responsibilities:
// - `api`: the authenticated session and its REST operations.
// - `auth`: credential (STS + cookies + form digest) and OAuth2 logins.
// - `upload`: the start/continue/finish chunk protocol.
// - `http`: the transport seam and its reqwest implementation.
// - `xml`, `path`: small encoding helpers used by the above.
// - `config`, `logging`, `error`: ambient plumbing.
// - `ui`: argument parsing, progress display and exit statuses.
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod path;
pub mod ui;
pub mod upload;
pub mod xml;

pub use api::{Session, SharepointClient};
pub use auth::Credentials;
pub use config::ClientConfig;
pub use error::{Result, SharepointError};

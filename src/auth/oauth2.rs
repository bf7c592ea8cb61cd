// App-only login with a client id/secret. The tenant and resource ids
// are discovered from the bearer challenge the site returns to an
// anonymous probe, then exchanged at the ACS token endpoint.

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::step_failed;
use crate::error::{Result, SharepointError};
use crate::http::{HttpRequest, HttpTransport};

const TOKEN_HOST: &str = "https://accounts.accesscontrol.windows.net";

/// OAuth2 client-credentials authenticator for one site.
pub struct OAuth2Authenticator<'a, T> {
    transport: &'a T,
    base_url: &'a str,
    site_url: &'a str,
}

impl<'a, T: HttpTransport> OAuth2Authenticator<'a, T> {
    pub fn new(transport: &'a T, base_url: &'a str, site_url: &'a str) -> Self {
        Self {
            transport,
            base_url,
            site_url,
        }
    }

    pub fn authenticate(&self, client_id: &str, client_secret: &str) -> Result<String> {
        info!(client_id, "Authenticating with OAuth2 client credentials");

        let host = Url::parse(self.base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .ok_or_else(|| SharepointError::Auth(format!("invalid base URL: {}", self.base_url)))?;

        let challenge = self
            .challenge_header()
            .map_err(|e| step_failed("challenge probe", e))?;
        let tenant_id = extract_header_attribute(&challenge, "realm")?;
        let resource_id = extract_header_attribute(&challenge, "client_id")?;
        debug!(%tenant_id, %resource_id, "Discovered tenant");

        let client_at_tenant = format!("{client_id}@{tenant_id}");
        let resource = format!("{resource_id}/{host}@{tenant_id}");
        let form = serde_urlencoded::to_string([
            ("grant_type", "client_credentials"),
            ("client_id", client_at_tenant.as_str()),
            ("client_secret", client_secret),
            ("resource", resource.as_str()),
        ])
        .map_err(|e| SharepointError::Auth(format!("cannot encode token request: {e}")))?;

        self.request_token(&tenant_id, form)
            .map_err(|e| step_failed("token request", e))
    }

    fn challenge_header(&self) -> Result<String> {
        let url = format!("{}/_vti_bin/client.svc/", self.site_url);
        let response = self
            .transport
            .send(HttpRequest::get(url).header("Authorization", "Bearer"))?;
        debug!(status = response.status, "Challenge probe answered");

        response
            .header("WWW-Authenticate")
            .map(str::to_string)
            .ok_or_else(|| SharepointError::Auth("no challenge header".to_string()))
    }

    fn request_token(&self, tenant_id: &str, form: String) -> Result<String> {
        let url = token_url(tenant_id);
        let response = self.transport.send(
            HttpRequest::post(url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(form),
        )?;

        let json: Value = serde_json::from_slice(&response.body)
            .map_err(|e| SharepointError::Auth(format!("invalid token response: {e}")))?;

        if let Some(token) = json.get("access_token").and_then(Value::as_str) {
            return Ok(token.to_string());
        }
        let reason = json
            .get("error_description")
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("missing access_token");
        Err(SharepointError::Auth(reason.to_string()))
    }
}

/// ACS token endpoint for a tenant.
pub fn token_url(tenant_id: &str) -> String {
    format!("{TOKEN_HOST}/{tenant_id}/tokens/OAuth/2")
}

/// Value of `attribute="..."` inside a `WWW-Authenticate` header.
pub fn extract_header_attribute(header: &str, attribute: &str) -> Result<String> {
    let marker = format!("{attribute}=\"");
    header
        .find(&marker)
        .map(|start| start + marker.len())
        .and_then(|start| {
            header[start..]
                .find('"')
                .map(|len| header[start..start + len].to_string())
        })
        .ok_or_else(|| SharepointError::Auth(format!("unable to extract {attribute}: {header}")))
}

// Login with an account name and password:
//   1. ask the federation STS for a SAML security token (SOAP),
//   2. trade the token for session cookies on the tenant,
//   3. trade the cookie session for a form digest used as bearer value.

use serde_json::Value;
use tracing::{debug, info};

use super::step_failed;
use crate::error::{Result, SharepointError};
use crate::http::{HttpRequest, HttpTransport};
use crate::xml::{extract_tag, XmlBuilder};

/// Federation endpoint issuing security tokens.
pub const STS_URL: &str = "https://login.microsoftonline.com/extSTS.srf";

const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const ADDRESSING_NS: &str = "http://www.w3.org/2005/08/addressing";
const UTILITY_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const SECEXT_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const TRUST_NS: &str = "http://schemas.xmlsoap.org/ws/2005/02/trust";
const POLICY_NS: &str = "http://schemas.xmlsoap.org/ws/2004/09/policy";

/// Credential-based authenticator bound to one transport and tenant.
pub struct UserPasswordAuthenticator<'a, T> {
    transport: &'a T,
    base_url: &'a str,
}

impl<'a, T: HttpTransport> UserPasswordAuthenticator<'a, T> {
    pub fn new(transport: &'a T, base_url: &'a str) -> Self {
        Self {
            transport,
            base_url,
        }
    }

    /// Run the three round-trips and return the form digest.
    ///
    /// The transport's cookie store is populated as a side effect and
    /// must be reused for every later request of this session.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        info!(username, "Authenticating with user credentials");

        let token = self
            .security_token(username, password)
            .map_err(|e| step_failed("security token request", e))?;
        self.sign_in(&token).map_err(|e| step_failed("sign-in", e))?;
        self.form_digest()
            .map_err(|e| step_failed("context info request", e))
    }

    fn security_token(&self, username: &str, password: &str) -> Result<String> {
        let envelope = security_token_request(username, password, self.base_url)?;
        let request = HttpRequest::post(STS_URL)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(envelope);

        let response = self.transport.send(request)?;
        debug!(status = response.status, "Security token response");

        extract_tag(&response.text(), "BinarySecurityToken")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SharepointError::Auth("security token extraction failed".to_string()))
    }

    fn sign_in(&self, security_token: &str) -> Result<()> {
        let url = format!("{}/_forms/default.aspx?wa=wsignin1.0", self.base_url);
        // only the Set-Cookie side effect matters
        let response = self
            .transport
            .send(HttpRequest::post(url).body(security_token))?;
        debug!(status = response.status, "Signed in");
        Ok(())
    }

    fn form_digest(&self) -> Result<String> {
        let url = format!("{}/_api/contextinfo", self.base_url);
        let response = self
            .transport
            .send(HttpRequest::post(url).accept_json().body(" "))?;

        let json: Value = serde_json::from_slice(&response.body).map_err(|e| {
            SharepointError::Auth(format!("invalid context info response: {e}"))
        })?;

        json.get("FormDigestValue")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SharepointError::Auth("missing digest".to_string()))
    }
}

/// SOAP `RequestSecurityToken` envelope for `username`/`password`,
/// applying to `endpoint`. All values are XML-escaped.
pub fn security_token_request(username: &str, password: &str, endpoint: &str) -> Result<String> {
    let must_understand = [("s:mustUnderstand", "1")];

    let mut xml = XmlBuilder::new();
    xml.open(
        "s:Envelope",
        &[
            ("xmlns:s", SOAP_NS),
            ("xmlns:a", ADDRESSING_NS),
            ("xmlns:u", UTILITY_NS),
        ],
    )?;

    xml.open("s:Header", &[])?
        .leaf(
            "a:Action",
            &must_understand,
            "http://schemas.xmlsoap.org/ws/2005/02/trust/RST/Issue",
        )?
        .open("a:ReplyTo", &[])?
        .leaf("a:Address", &[], "http://www.w3.org/2005/08/addressing/anonymous")?
        .close("a:ReplyTo")?
        .leaf("a:To", &must_understand, STS_URL)?
        .open(
            "o:Security",
            &[("s:mustUnderstand", "1"), ("xmlns:o", SECEXT_NS)],
        )?
        .open("o:UsernameToken", &[])?
        .leaf("o:Username", &[], username)?
        .leaf("o:Password", &[], password)?
        .close("o:UsernameToken")?
        .close("o:Security")?
        .close("s:Header")?;

    xml.open("s:Body", &[])?
        .open("t:RequestSecurityToken", &[("xmlns:t", TRUST_NS)])?
        .open("wsp:AppliesTo", &[("xmlns:wsp", POLICY_NS)])?
        .open("a:EndpointReference", &[])?
        .leaf("a:Address", &[], endpoint)?
        .close("a:EndpointReference")?
        .close("wsp:AppliesTo")?
        .leaf(
            "t:KeyType",
            &[],
            "http://schemas.xmlsoap.org/ws/2005/05/identity/NoProofKey",
        )?
        .leaf(
            "t:RequestType",
            &[],
            "http://schemas.xmlsoap.org/ws/2005/02/trust/Issue",
        )?
        .leaf("t:TokenType", &[], "urn:oasis:names:tc:SAML:1.0:assertion")?
        .close("t:RequestSecurityToken")?
        .close("s:Body")?;

    xml.close("s:Envelope")?;
    xml.finish()
}

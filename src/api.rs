// API client module: holds the authenticated session and issues the
// SharePoint REST calls (list, create, delete, upload, download). It is
// synchronous on purpose: every call is one blocking round-trip and the
// next one never starts before the previous response is in.

use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::auth::Credentials;
use crate::config::ClientConfig;
use crate::error::{Result, SharepointError};
use crate::http::{check_for_error, HttpRequest, HttpTransport, ReqwestTransport};
use crate::path::encode_path;

/// Base and site URLs plus the bearer value attached to REST calls.
#[derive(Clone, Default)]
pub struct Session {
    pub base_url: String,
    pub site_url: String,
    bearer_token: String,
}

impl Session {
    /// `base_url` is the tenant root (`https://xxx.sharepoint.com`),
    /// `site` the site name under `/sites/`.
    pub fn new(base_url: &str, site: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let site_url = format!("{}/sites/{}", base_url, site.trim_matches('/'));
        Self {
            base_url,
            site_url,
            bearer_token: String::new(),
        }
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    pub fn is_authenticated(&self) -> bool {
        !self.bearer_token.is_empty()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("site_url", &self.site_url)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[derive(Deserialize)]
struct Listing {
    value: Vec<ListEntry>,
}

#[derive(Deserialize)]
struct ListEntry {
    #[serde(rename = "Name")]
    name: String,
}

/// SharePoint client bound to one site. Owns its transport, and with it
/// the cookie store of the session.
pub struct SharepointClient<T = ReqwestTransport> {
    transport: T,
    session: Session,
    chunk_size: usize,
}

impl SharepointClient<ReqwestTransport> {
    /// Create a client talking to the real service through reqwest.
    pub fn new(base_url: &str, site: &str, config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::with_transport(transport, base_url, site).with_chunk_size(config.chunk_size))
    }
}

impl<T: HttpTransport> SharepointClient<T> {
    pub fn with_transport(transport: T, base_url: &str, site: &str) -> Self {
        Self {
            transport,
            session: Session::new(base_url, site),
            chunk_size: ClientConfig::default().chunk_size,
        }
    }

    /// Bytes per request in chunked uploads.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub(crate) fn site_url(&self) -> &str {
        &self.session.site_url
    }

    /// Run the selected login flow and keep the resulting bearer token.
    pub fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let token = credentials.authenticate(
            &self.transport,
            &self.session.base_url,
            &self.session.site_url,
        )?;
        info!(site = %self.session.site_url, "Authenticated");
        self.set_token(&token);
        Ok(())
    }

    /// Use an already obtained bearer token.
    pub fn set_token(&mut self, token: &str) {
        self.session.bearer_token = token.to_string();
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request.bearer_token(&self.session.bearer_token).accept_json()
    }

    fn folder_url(&self, path: &str) -> String {
        format!(
            "{}/_api/web/GetFolderByServerRelativeUrl('{}')",
            self.session.site_url,
            encode_path(path)
        )
    }

    fn file_url(&self, folder: &str, filename: &str) -> String {
        format!("{}/Files('{}')", self.folder_url(folder), encode_path(filename))
    }

    /// Authorized POST whose response body is checked for service errors.
    pub(crate) fn post_checked(&self, url: String, body: Vec<u8>) -> Result<()> {
        let response = self
            .transport
            .send(self.authorized(HttpRequest::post(url).body(body)))?;
        check_for_error(&response.body)
    }

    fn list_names(&self, path: &str, kind: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}", self.folder_url(path), kind);
        let response = self.transport.send(self.authorized(HttpRequest::get(url)))?;
        check_for_error(&response.body)?;

        // Bodies that pass the error check but do not list entries are still unexpected
        let listing: Listing = serde_json::from_slice(&response.body)
            .map_err(|_| SharepointError::UnknownService(response.text()))?;
        Ok(listing.value.into_iter().map(|entry| entry.name).collect())
    }

    /// Names of the sub-folders of `path`.
    pub fn list_folders(&self, path: &str) -> Result<Vec<String>> {
        self.list_names(path, "Folders")
    }

    /// Names of the files directly inside `path`.
    pub fn list_files(&self, path: &str) -> Result<Vec<String>> {
        self.list_names(path, "Files")
    }

    pub fn create_folder(&self, parent: &str, folder_name: &str) -> Result<()> {
        info!(parent, folder_name, "Creating folder");
        let body = json!({ "ServerRelativeUrl": format!("{}/{}", parent, folder_name) });
        let request = HttpRequest::post(format!("{}/_api/web/folders", self.session.site_url))
            .header("Content-Type", "application/json")
            .body(body.to_string());

        let response = self.transport.send(self.authorized(request))?;
        check_for_error(&response.body)
    }

    pub fn delete_folder(&self, path: &str) -> Result<()> {
        info!(path, "Deleting folder");
        let request = HttpRequest::delete(self.folder_url(path)).header("If-Match", "*");
        let response = self.transport.send(self.authorized(request))?;
        check_for_error(&response.body)
    }

    pub fn delete_file(&self, folder: &str, filename: &str) -> Result<()> {
        info!(folder, filename, "Deleting file");
        let request = HttpRequest::delete(self.file_url(folder, filename)).header("If-Match", "*");
        let response = self.transport.send(self.authorized(request))?;
        check_for_error(&response.body)
    }

    /// Single-shot upload, overwriting any existing file.
    pub fn upload_file(&self, folder: &str, filename: &str, data: &[u8]) -> Result<()> {
        let url = format!(
            "{}/Files/Add(url='{}',overwrite=true)",
            self.folder_url(folder),
            encode_path(filename)
        );
        debug!(folder, filename, bytes = data.len(), "Uploading file");
        self.post_checked(url, data.to_vec())
    }

    /// Single-shot upload of a local file's content.
    pub fn upload_file_from_path(&self, folder: &str, filename: &str, path: &Path) -> Result<()> {
        let data = std::fs::read(path)?;
        self.upload_file(folder, filename, &data)
    }

    /// Stream the content of `folder/filename`.
    pub fn download(&self, folder: &str, filename: &str) -> Result<Box<dyn Read + Send>> {
        let url = format!("{}/$value", self.file_url(folder, filename));
        // Raw content, so no JSON Accept header
        let request = HttpRequest::get(url).bearer_token(&self.session.bearer_token);

        let response = self.transport.open(request)?;
        if response.status != 200 {
            return Err(SharepointError::HttpStatus(response.status));
        }
        Ok(response.reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{MockTransport, RecordingTransport};
    use crate::http::{HttpMethod, HttpResponse};

    const BASE: &str = "https://contoso.sharepoint.com";

    fn client(transport: RecordingTransport) -> SharepointClient<RecordingTransport> {
        let mut client = SharepointClient::with_transport(transport, BASE, "Dev");
        client.set_token("tok");
        client
    }

    #[test]
    fn test_session_urls() {
        let session = Session::new("https://contoso.sharepoint.com/", "/Dev/");
        assert_eq!(session.base_url, "https://contoso.sharepoint.com");
        assert_eq!(session.site_url, "https://contoso.sharepoint.com/sites/Dev");
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_session_debug_hides_token() {
        let mut client = SharepointClient::with_transport(RecordingTransport::default(), BASE, "Dev");
        client.set_token("very-secret-digest");
        let debug = format!("{:?}", client.session());
        assert!(!debug.contains("very-secret-digest"));
        assert!(debug.contains("authenticated: true"));
    }

    #[test]
    fn test_authenticate_stores_token() {
        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(HttpResponse::new(401, Vec::new())
                    .with_header("WWW-Authenticate", r#"Bearer realm="t",client_id="r""#))
            });
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"access_token":"abc"}"#)));

        let mut client = SharepointClient::with_transport(transport, BASE, "Dev");
        client
            .authenticate(&Credentials::client_secret("id", "secret"))
            .unwrap();
        assert_eq!(client.session().bearer_token(), "abc");
    }

    #[test]
    fn test_failed_authentication_keeps_session_unauthenticated() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(HttpResponse::new(200, "nope")));

        let mut client = SharepointClient::with_transport(transport, BASE, "Dev");
        let result = client.authenticate(&Credentials::user_password("u", "p"));
        assert!(matches!(result, Err(SharepointError::Auth(_))));
        assert!(!client.session().is_authenticated());
    }

    #[test]
    fn test_list_folders() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(
            200,
            r#"{"value":[{"Name":"Forms","ItemCount":0},{"Name":"Reports","ItemCount":3}]}"#,
        )]);
        let client = client(transport);

        let folders = client.list_folders("Shared Documents").unwrap();
        assert_eq!(folders, vec!["Forms", "Reports"]);

        let requests = client.transport().requests.borrow();
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(
            requests[0].url,
            "https://contoso.sharepoint.com/sites/Dev/_api/web/GetFolderByServerRelativeUrl('Shared%20Documents')/Folders"
        );
        assert_eq!(requests[0].headers.get("Authorization").unwrap(), "Bearer tok");
        assert_eq!(requests[0].headers.get("Accept").unwrap(), "application/json");
    }

    #[test]
    fn test_list_files_reports_remote_error() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(
            404,
            r#"{"odata.error":{"code":"-2147024894","message":{"lang":"en-US","value":"File Not Found."}}}"#,
        )]);
        let client = client(transport);

        let err = client.list_files("missing").unwrap_err();
        assert!(matches!(err, SharepointError::Remote(ref m) if m == "File Not Found."));
        assert!(client.transport().urls()[0].ends_with("('missing')/Files"));
    }

    #[test]
    fn test_list_with_unexpected_body() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(200, r#"{"d":[]}"#)]);
        let client = client(transport);
        assert!(matches!(
            client.list_files("x"),
            Err(SharepointError::UnknownService(_))
        ));
    }

    #[test]
    fn test_create_folder_body() {
        let client = client(RecordingTransport::default());
        client.create_folder("Shared Documents/Temp", "New \"One\"").unwrap();

        let requests = client.transport().requests.borrow();
        assert_eq!(requests[0].url, "https://contoso.sharepoint.com/sites/Dev/_api/web/folders");
        assert_eq!(requests[0].headers.get("Content-Type").unwrap(), "application/json");
        let body: serde_json::Value = serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["ServerRelativeUrl"], "Shared Documents/Temp/New \"One\"");
    }

    #[test]
    fn test_create_existing_folder_fails() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(
            500,
            r#"{"odata.error":{"message":{"value":"Folder already exists"}}}"#,
        )]);
        let client = client(transport);
        let err = client.create_folder("a", "b").unwrap_err();
        assert_eq!(err.to_string(), "Folder already exists");
    }

    #[test]
    fn test_delete_requests() {
        let client = client(RecordingTransport::default());
        client.delete_folder("Shared Documents/Old").unwrap();
        client.delete_file("Shared Documents", "a b.txt").unwrap();

        let requests = client.transport().requests.borrow();
        assert!(requests.iter().all(|r| r.method == HttpMethod::Delete));
        assert!(requests.iter().all(|r| r.headers.get("If-Match").map(String::as_str) == Some("*")));
        assert!(requests[0].url.ends_with("GetFolderByServerRelativeUrl('Shared%20Documents%2FOld')"));
        assert!(requests[1].url.ends_with("('Shared%20Documents')/Files('a%20b.txt')"));
    }

    #[test]
    fn test_upload_file_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"report body").unwrap();

        let client = client(RecordingTransport::default());
        client
            .upload_file_from_path("Shared Documents", "report.txt", file.path())
            .unwrap();

        let requests = client.transport().requests.borrow();
        assert!(requests[0]
            .url
            .ends_with("('Shared%20Documents')/Files/Add(url='report.txt',overwrite=true)"));
        assert_eq!(requests[0].body.as_deref(), Some(&b"report body"[..]));
    }

    #[test]
    fn test_upload_rejected_with_unknown_body() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(503, "Service Unavailable")]);
        let client = client(transport);
        let err = client.upload_file("x", "y", b"z").unwrap_err();
        assert_eq!(err.to_string(), "Unknown error: Service Unavailable");
    }

    #[test]
    fn test_download_streams_body() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(200, "file content")]);
        let client = client(transport);

        let mut content = String::new();
        client
            .download("Shared Documents", "a.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "file content");
        assert!(client.transport().urls()[0].ends_with("/Files('a.txt')/$value"));
    }

    #[test]
    fn test_download_rejects_non_200() {
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(404, "")]);
        let client = client(transport);
        assert!(matches!(
            client.download("x", "y"),
            Err(SharepointError::HttpStatus(404))
        ));
    }
}

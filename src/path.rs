// Encoding for server-relative paths and file names embedded in REST URLs.

use url::form_urlencoded;

/// Form-encode `path` for use inside a `'...'` URL literal, with spaces
/// rendered as `%20` instead of `+`. Slashes are encoded too; SharePoint
/// decodes them back before resolving the path.
pub fn encode_path(path: &str) -> String {
    form_urlencoded::byte_serialize(path.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

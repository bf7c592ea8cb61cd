// UI layer: the command-line surface. Parses the positional arguments,
// logs in with the selected method, runs one action and reports progress
// on the terminal. Usage mistakes and operation failures are kept apart
// so `main` can exit with distinct statuses.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tracing::debug;

use crate::api::SharepointClient;
use crate::auth::Credentials;
use crate::config::ClientConfig;
use crate::http::HttpTransport;

pub const UPLOAD_FOLDER: &str = "upload-folder";
pub const UPLOAD_FILE: &str = "upload-file";
pub const DELETE_FOLDER: &str = "delete-folder";
pub const DELETE_FILE: &str = "delete-file";
pub const LIST_FOLDERS: &str = "list-folders";
pub const LIST_FILES: &str = "list-files";
pub const DOWNLOAD: &str = "download";

/// Why the CLI stopped.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad arguments; the usage text should be shown.
    #[error("{0}")]
    Usage(String),
    /// The requested operation failed.
    #[error(transparent)]
    Failure(#[from] anyhow::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage(_) => 1,
            CliError::Failure(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Login and password.
    User,
    /// OAuth2 client id and secret.
    Api,
}

impl AuthMethod {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Some(AuthMethod::User),
            "api" => Some(AuthMethod::Api),
            _ => None,
        }
    }
}

/// One CLI action with its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    UploadFolder {
        local_path: PathBuf,
        remote_parent: String,
        folder_name: String,
    },
    UploadFile {
        local_path: PathBuf,
        remote_folder: String,
    },
    DeleteFolder { path: String },
    DeleteFile { folder: String, filename: String },
    ListFolders { path: String },
    ListFiles { path: String },
    Download { folder: String, filename: String },
}

impl Action {
    pub fn parse(name: &str, options: &[String]) -> std::result::Result<Self, CliError> {
        let expect = |count: usize, help: &str| {
            if options.len() == count {
                Ok(())
            } else {
                Err(CliError::Usage(format!("{} options are: {}", name, help)))
            }
        };

        let action = match name {
            UPLOAD_FOLDER => {
                expect(3, "<local-path> <remote-parent> <new-folder-name>")?;
                Action::UploadFolder {
                    local_path: PathBuf::from(&options[0]),
                    remote_parent: options[1].clone(),
                    folder_name: options[2].clone(),
                }
            }
            UPLOAD_FILE => {
                expect(2, "<local-file> <remote-folder>")?;
                Action::UploadFile {
                    local_path: PathBuf::from(&options[0]),
                    remote_folder: options[1].clone(),
                }
            }
            DELETE_FOLDER => {
                expect(1, "<remote-path>")?;
                Action::DeleteFolder {
                    path: options[0].clone(),
                }
            }
            DELETE_FILE => {
                expect(2, "<remote-folder> <file-name>")?;
                Action::DeleteFile {
                    folder: options[0].clone(),
                    filename: options[1].clone(),
                }
            }
            LIST_FOLDERS => {
                expect(1, "<remote-path>")?;
                Action::ListFolders {
                    path: options[0].clone(),
                }
            }
            LIST_FILES => {
                expect(1, "<remote-path>")?;
                Action::ListFiles {
                    path: options[0].clone(),
                }
            }
            DOWNLOAD => {
                expect(2, "<remote-folder> <file-name>")?;
                Action::Download {
                    folder: options[0].clone(),
                    filename: options[1].clone(),
                }
            }
            other => return Err(CliError::Usage(format!("Unknown action: {}", other))),
        };
        Ok(action)
    }
}

/// Everything parsed from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub base_url: String,
    pub site: String,
    pub auth_method: AuthMethod,
    pub login: String,
    /// `-` means: ask interactively.
    pub secret: String,
    pub action: Action,
}

/// Parse the arguments following the program name.
pub fn parse_args(args: &[String]) -> std::result::Result<Invocation, CliError> {
    if args.len() < 6 {
        return Err(CliError::Usage("Missing arguments".to_string()));
    }

    let auth_method = AuthMethod::parse(&args[2])
        .ok_or_else(|| CliError::Usage(format!("Unknown authentication method: {}", args[2])))?;

    Ok(Invocation {
        base_url: args[0].clone(),
        site: args[1].clone(),
        auth_method,
        login: args[3].clone(),
        secret: args[4].clone(),
        action: Action::parse(&args[5], &args[6..])?,
    })
}

pub fn usage() -> String {
    let mut text = String::new();
    text.push_str("usage: sharepoint-client <url> <site> <auth_method> <login|client_id> <password|client_secret> <action> [options]\n");
    text.push_str("Authentication methods are:\n");
    text.push_str(" - user: uses login and password access\n");
    text.push_str(" - api: uses OAuth2 with client id and client secret\n");
    text.push_str("Pass - as password or secret to be prompted for it.\n");
    text.push_str("Possible actions are:\n");
    for line in [
        format!(" - {} <local-path> <remote-parent> <new-folder-name>", UPLOAD_FOLDER),
        format!(" - {} <local-file> <remote-folder>", UPLOAD_FILE),
        format!(" - {} <remote-path>", DELETE_FOLDER),
        format!(" - {} <remote-folder> <file-name>", DELETE_FILE),
        format!(" - {} <remote-path>", LIST_FOLDERS),
        format!(" - {} <remote-path>", LIST_FILES),
        format!(" - {} <remote-folder> <file-name>", DOWNLOAD),
    ] {
        text.push_str(&line);
        text.push('\n');
    }
    text.push_str("\nexamples:\n");
    text.push_str(&format!(
        "> sharepoint-client https://xxx.sharepoint.com ProductDevelopment user you@company.com - {} /tmp/folder \"Shared Documents/Software/Temporary\" \"NewFolder\"\n",
        UPLOAD_FOLDER
    ));
    text.push_str(&format!(
        "> sharepoint-client https://xxx.sharepoint.com ProductDevelopment api someid somesecret {} \"Shared Documents/Software/Temporary/NewFolder\"",
        DELETE_FOLDER
    ));
    text
}

/// Full CLI flow: parse, log in, run the action.
pub fn run(args: &[String], config: &ClientConfig) -> std::result::Result<(), CliError> {
    let invocation = parse_args(args)?;

    let secret = if invocation.secret == "-" {
        let prompt = match invocation.auth_method {
            AuthMethod::User => "Password",
            AuthMethod::Api => "Client secret",
        };
        Password::new()
            .with_prompt(prompt)
            .interact()
            .context("Failed to read secret")?
    } else {
        invocation.secret.clone()
    };

    let credentials = match invocation.auth_method {
        AuthMethod::User => Credentials::user_password(&invocation.login, secret),
        AuthMethod::Api => Credentials::client_secret(&invocation.login, secret),
    };

    let mut client = SharepointClient::new(&invocation.base_url, &invocation.site, config)
        .context("Failed to set up the HTTP client")?;
    client
        .authenticate(&credentials)
        .map_err(anyhow::Error::from)?;

    execute(&client, &invocation.action, config.chunked_upload_threshold, Path::new("."))?;
    Ok(())
}

/// Run one action against an authenticated client. Downloads land in
/// `download_dir`.
pub fn execute<T: HttpTransport>(
    client: &SharepointClient<T>,
    action: &Action,
    chunk_threshold: u64,
    download_dir: &Path,
) -> Result<()> {
    match action {
        Action::UploadFolder {
            local_path,
            remote_parent,
            folder_name,
        } => upload_folder(client, local_path, remote_parent, folder_name, chunk_threshold),
        Action::UploadFile {
            local_path,
            remote_folder,
        } => upload_one(client, local_path, remote_folder, chunk_threshold),
        Action::DeleteFolder { path } => {
            println!("Deleting folder: {}", path);
            client.delete_folder(path)?;
            Ok(())
        }
        Action::DeleteFile { folder, filename } => {
            println!("Deleting file: {}/{}", folder, filename);
            client.delete_file(folder, filename)?;
            Ok(())
        }
        Action::ListFolders { path } => {
            for name in client.list_folders(path)? {
                println!("{}", name);
            }
            Ok(())
        }
        Action::ListFiles { path } => {
            for name in client.list_files(path)? {
                println!("{}", name);
            }
            Ok(())
        }
        Action::Download { folder, filename } => download(client, folder, filename, download_dir),
    }
}

fn upload_folder<T: HttpTransport>(
    client: &SharepointClient<T>,
    local: &Path,
    remote_parent: &str,
    folder_name: &str,
    chunk_threshold: u64,
) -> Result<()> {
    if !local.is_dir() {
        bail!("Not a valid local directory: {}", local.display());
    }

    // Only plain files at the top level, uploaded in name order
    let mut files = Vec::new();
    for entry in fs::read_dir(local)
        .with_context(|| format!("Unable to list files in {}", local.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    // Remote folder must exist before anything lands in it
    let remote = format!("{}/{}", remote_parent, folder_name);
    println!("Creating folder: {}", remote);
    client.create_folder(remote_parent, folder_name)?;

    for file in &files {
        upload_one(client, file, &remote, chunk_threshold)?;
    }
    Ok(())
}

fn upload_one<T: HttpTransport>(
    client: &SharepointClient<T>,
    local: &Path,
    remote_folder: &str,
    chunk_threshold: u64,
) -> Result<()> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid file name: {}", local.display()))?;
    let size = fs::metadata(local)
        .with_context(|| format!("Unable to read {}", local.display()))?
        .len();

    println!("Uploading: {}", name);

    // Small files go in one request
    if size < chunk_threshold {
        client.upload_file_from_path(remote_folder, name, local)?;
        return Ok(());
    }

    // Large files: chunked upload with a progress bar
    debug!(name, size, "Using chunked upload");
    let file = File::open(local).with_context(|| format!("Unable to open {}", local.display()))?;
    let bar = progress_bar(name)?;
    let result = client.upload_big_file(remote_folder, name, size, file, |percent| {
        bar.set_position(percent.round() as u64)
    });
    match &result {
        Ok(()) => bar.finish(),
        Err(_) => bar.abandon(),
    }
    result.with_context(|| format!("Upload of {} failed", name))
}

fn progress_bar(name: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::with_template("{msg} [{bar:40}] {pos:>3}%")?.progress_chars("=> "));
    bar.set_message(name.to_string());
    Ok(bar)
}

fn download<T: HttpTransport>(
    client: &SharepointClient<T>,
    folder: &str,
    filename: &str,
    download_dir: &Path,
) -> Result<()> {
    // Keep only the base name so the file lands in download_dir
    let local_name = Path::new(filename)
        .file_name()
        .ok_or_else(|| anyhow!("Invalid file name: {}", filename))?;
    let target = download_dir.join(local_name);

    println!("Downloading file: {}", filename);
    // Stream straight to disk
    let mut input = client.download(folder, filename)?;
    let mut output =
        File::create(&target).with_context(|| format!("Unable to create {}", target.display()))?;
    io::copy(&mut input, &mut output)
        .with_context(|| format!("Unable to write {}", target.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::RecordingTransport;
    use crate::http::{HttpMethod, HttpResponse};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn client(transport: RecordingTransport) -> SharepointClient<RecordingTransport> {
        let mut client =
            SharepointClient::with_transport(transport, "https://contoso.sharepoint.com", "Dev")
                .with_chunk_size(4);
        client.set_token("tok");
        client
    }

    #[test]
    fn test_parse_full_invocation() {
        let invocation = parse_args(&args(&[
            "https://contoso.sharepoint.com",
            "Dev",
            "API",
            "client",
            "secret",
            "download",
            "Shared Documents",
            "a.txt",
        ]))
        .unwrap();

        assert_eq!(invocation.auth_method, AuthMethod::Api);
        assert_eq!(invocation.login, "client");
        assert_eq!(
            invocation.action,
            Action::Download {
                folder: "Shared Documents".to_string(),
                filename: "a.txt".to_string()
            }
        );
    }

    #[test]
    fn test_usage_errors() {
        let too_few = parse_args(&args(&["url", "site", "user"])).unwrap_err();
        assert_eq!(too_few.exit_code(), 1);

        let bad_method = parse_args(&args(&["u", "s", "kerberos", "l", "p", "list-files", "x"])).unwrap_err();
        assert!(bad_method.to_string().contains("kerberos"));
        assert_eq!(bad_method.exit_code(), 1);

        let bad_action = parse_args(&args(&["u", "s", "user", "l", "p", "rename", "x"])).unwrap_err();
        assert_eq!(bad_action.to_string(), "Unknown action: rename");

        let bad_count = parse_args(&args(&["u", "s", "user", "l", "p", "upload-folder", "x"])).unwrap_err();
        assert!(bad_count.to_string().starts_with("upload-folder options are:"));
        assert_eq!(bad_count.exit_code(), 1);
    }

    #[test]
    fn test_failure_exit_code() {
        let err = CliError::from(anyhow!("boom"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_usage_lists_every_action() {
        let text = usage();
        for action in [UPLOAD_FOLDER, UPLOAD_FILE, DELETE_FOLDER, DELETE_FILE, LIST_FOLDERS, LIST_FILES, DOWNLOAD] {
            assert!(text.contains(action));
        }
    }

    #[test]
    fn test_upload_folder_picks_transfer_by_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("small.txt"), b"abc").unwrap();
        fs::write(dir.path().join("large.bin"), b"0123456789").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let client = client(RecordingTransport::default());
        let action = Action::UploadFolder {
            local_path: dir.path().to_path_buf(),
            remote_parent: "Shared Documents".to_string(),
            folder_name: "Batch".to_string(),
        };
        execute(&client, &action, 8, dir.path()).unwrap();

        let urls = client.transport().urls();
        assert!(urls[0].ends_with("/_api/web/folders"));
        // large.bin sorts first: placeholder, start, continue, finish
        assert!(urls[1].ends_with("Files/Add(url='large.bin',overwrite=true)"));
        assert!(urls[2].contains("Files('large.bin')/StartUpload("));
        assert!(urls[3].contains("ContinueUpload(") && urls[3].ends_with("fileOffset=4)"));
        assert!(urls[4].contains("FinishUpload(") && urls[4].ends_with("fileOffset=8)"));
        assert!(urls[5].ends_with("GetFolderByServerRelativeUrl('Shared%20Documents%2FBatch')/Files/Add(url='small.txt',overwrite=true)"));
        assert_eq!(urls.len(), 6);
    }

    #[test]
    fn test_upload_folder_requires_directory() {
        let client = client(RecordingTransport::default());
        let action = Action::UploadFolder {
            local_path: PathBuf::from("/definitely/not/here"),
            remote_parent: "a".to_string(),
            folder_name: "b".to_string(),
        };
        let err = execute(&client, &action, 8, Path::new(".")).unwrap_err();
        assert!(err.to_string().starts_with("Not a valid local directory"));
        assert!(client.transport().requests.borrow().is_empty());
    }

    #[test]
    fn test_upload_folder_stops_on_remote_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(
            500,
            r#"{"odata.error":{"message":{"value":"Folder already exists"}}}"#,
        )]);
        let client = client(transport);
        let action = Action::UploadFolder {
            local_path: dir.path().to_path_buf(),
            remote_parent: "a".to_string(),
            folder_name: "b".to_string(),
        };

        let err = execute(&client, &action, 8, dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Folder already exists");
        assert_eq!(client.transport().requests.borrow().len(), 1);
    }

    #[test]
    fn test_download_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::with_responses(vec![HttpResponse::new(200, "downloaded")]);
        let client = client(transport);

        let action = Action::Download {
            folder: "Shared Documents".to_string(),
            filename: "notes.txt".to_string(),
        };
        execute(&client, &action, 8, dir.path()).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("notes.txt")).unwrap(), "downloaded");
        let requests = client.transport().requests.borrow();
        assert_eq!(requests[0].method, HttpMethod::Get);
    }

    #[test]
    fn test_delete_file_action() {
        let client = client(RecordingTransport::default());
        let action = Action::DeleteFile {
            folder: "Shared Documents".to_string(),
            filename: "old.txt".to_string(),
        };
        execute(&client, &action, 8, Path::new(".")).unwrap();

        let requests = client.transport().requests.borrow();
        assert_eq!(requests[0].method, HttpMethod::Delete);
        assert!(requests[0].url.ends_with("Files('old.txt')"));
    }
}

// Resumable chunked upload. The REST API caps the size of a single
// request, so large files are sent as a StartUpload / ContinueUpload /
// FinishUpload sequence bound together by a fresh upload id.

use std::io::{self, ErrorKind, Read};

use tracing::{debug, info};
use uuid::Uuid;

use crate::api::SharepointClient;
use crate::error::{Result, SharepointError};
use crate::http::HttpTransport;
use crate::path::encode_path;

/// Content of the file created before the first chunk is sent. The
/// finished upload replaces it.
pub const PLACEHOLDER: &[u8] = b"PLACEHOLDER";

/// Consecutive zero-byte reads tolerated before the source is
/// considered truncated.
const MAX_EMPTY_READS: usize = 16;

/// Which chunk endpoint a piece of the file goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPosition {
    Start,
    Continue,
    Finish,
}

/// Pure position rule: the chunk at offset 0 starts the session, a chunk
/// that stays short of `total_size` continues it, anything reaching or
/// passing `total_size` finishes it.
pub fn classify(offset: u64, bytes_read: u64, total_size: u64) -> ChunkPosition {
    if offset == 0 {
        ChunkPosition::Start
    } else if offset + bytes_read < total_size {
        ChunkPosition::Continue
    } else {
        ChunkPosition::Finish
    }
}

/// Server-side upload state for one file. Never reused across files.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: Uuid,
    pub file_offset: u64,
    pub total_size: u64,
    pub folder: String,
    pub filename: String,
}

impl UploadSession {
    pub fn new(folder: &str, filename: &str, total_size: u64) -> Self {
        Self {
            upload_id: Uuid::new_v4(),
            file_offset: 0,
            total_size,
            folder: folder.to_string(),
            filename: filename.to_string(),
        }
    }

    pub fn position(&self, bytes_read: u64) -> ChunkPosition {
        classify(self.file_offset, bytes_read, self.total_size)
    }

    /// Endpoint receiving the chunk at the current offset.
    pub fn endpoint(&self, site_url: &str, position: ChunkPosition) -> String {
        let file = format!(
            "{}/_api/web/GetFolderByServerRelativeUrl('{}')/Files('{}')",
            site_url,
            encode_path(&self.folder),
            encode_path(&self.filename)
        );
        match position {
            ChunkPosition::Start => format!("{}/StartUpload(uploadID='{}')", file, self.upload_id),
            ChunkPosition::Continue => format!(
                "{}/ContinueUpload(uploadID='{}',fileOffset={})",
                file, self.upload_id, self.file_offset
            ),
            ChunkPosition::Finish => format!(
                "{}/FinishUpload(uploadID='{}',fileOffset={})",
                file, self.upload_id, self.file_offset
            ),
        }
    }

    pub fn advance(&mut self, bytes: u64) {
        self.file_offset += bytes;
    }

    pub fn is_complete(&self) -> bool {
        self.file_offset >= self.total_size
    }

    /// Percentage of `total_size` sent so far.
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return 100.0;
        }
        100.0 * self.file_offset as f64 / self.total_size as f64
    }
}

impl<T: HttpTransport> SharepointClient<T> {
    /// Upload `total_size` bytes from `source` into `folder/filename`.
    ///
    /// Payloads no larger than one chunk are sent as a single upload.
    /// Anything bigger goes through the chunk protocol: a placeholder is
    /// created, then each read from `source` is posted to the start,
    /// continue or finish endpoint. `on_progress` receives the percentage
    /// sent after every chunk.
    ///
    /// Any failed chunk aborts the transfer and leaves the placeholder
    /// behind; a new call starts over with a new upload id.
    pub fn upload_big_file<R, F>(
        &self,
        folder: &str,
        filename: &str,
        total_size: u64,
        mut source: R,
        mut on_progress: F,
    ) -> Result<()>
    where
        R: Read,
        F: FnMut(f64),
    {
        let chunk_size = self.chunk_size();

        if total_size <= chunk_size as u64 {
            debug!(total_size, "Payload fits in one chunk, using single upload");
            let mut data = vec![0u8; total_size as usize];
            let mut filled = 0;
            while filled < data.len() {
                let read = read_skipping_empty(&mut source, &mut data[filled..])?;
                if read == 0 {
                    return Err(truncated(filled as u64, total_size));
                }
                filled += read;
            }
            self.upload_file(folder, filename, &data)?;
            on_progress(100.0);
            return Ok(());
        }

        self.upload_file(folder, filename, PLACEHOLDER)?;

        let mut session = UploadSession::new(folder, filename, total_size);
        info!(upload_id = %session.upload_id, filename, total_size, "Starting chunked upload");

        let mut buffer = vec![0u8; chunk_size];

        while !session.is_complete() {
            let read = read_skipping_empty(&mut source, &mut buffer)?;
            if read == 0 {
                return Err(truncated(session.file_offset, total_size));
            }

            let position = session.position(read as u64);
            let url = session.endpoint(self.site_url(), position);
            debug!(?position, offset = session.file_offset, bytes = read, "Sending chunk");

            self.post_checked(url, buffer[..read].to_vec())
                .map_err(|e| SharepointError::Transfer {
                    offset: session.file_offset,
                    source: Box::new(e),
                })?;

            session.advance(read as u64);
            on_progress(session.progress());
        }

        info!(upload_id = %session.upload_id, filename, "Chunked upload finished");
        Ok(())
    }
}

/// Read into `buf`, skipping zero-byte reads and retrying interrupted ones.
/// Returns 0 only once more than `MAX_EMPTY_READS` empty reads arrive in a
/// row.
fn read_skipping_empty<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut empty_reads = 0;
    loop {
        match source.read(buf) {
            Ok(0) => {
                empty_reads += 1;
                if empty_reads > MAX_EMPTY_READS {
                    return Ok(0);
                }
            }
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn truncated(offset: u64, total_size: u64) -> SharepointError {
    SharepointError::Io(io::Error::new(
        ErrorKind::UnexpectedEof,
        format!("source ended after {offset} of {total_size} bytes"),
    ))
}

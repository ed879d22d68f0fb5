//! Append-only command log.

use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::warn;

use crate::{input::drain_frames, resp::RespValue};

#[derive(Debug)]
pub struct AppendOnlyFile {
    path: PathBuf,
    file: File,
}

impl AppendOnlyFile {
    pub async fn open(path: &Path) -> tokio::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one encoded command frame and flushes it.
    pub async fn append(&mut self, frame: &[u8]) -> tokio::io::Result<()> {
        self.file.write_all(frame).await?;
        self.file.flush().await
    }

    /// Empties the log once a snapshot covers its commands.
    pub async fn truncate(&mut self) -> tokio::io::Result<()> {
        self.file.set_len(0).await?;
        self.file.sync_all().await
    }
}

/// Reads every complete command in the log at `path`, in order.
///
/// A missing log is empty. A frame cut short at the end of the file, or a
/// frame that is not a command, stops the replay with a warning.
pub async fn replay(path: &Path) -> tokio::io::Result<Vec<(String, Vec<String>)>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == tokio::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut buffer = BytesMut::from(&bytes[..]);
    let (frames, error) = drain_frames(&mut buffer);

    let mut commands = Vec::with_capacity(frames.len());

    for (frame, _) in frames {
        match command_parts(frame) {
            Some(command) => commands.push(command),
            None => {
                warn!(path = %path.display(), "append log holds a frame that is not a command");
                return Ok(commands);
            }
        }
    }

    if let Some(error) = error {
        warn!(path = %path.display(), %error, "append log is corrupt, replay stopped early");
    } else if !buffer.is_empty() {
        warn!(
            path = %path.display(),
            ignored_bytes = buffer.len(),
            "append log ends with a truncated command"
        );
    }

    Ok(commands)
}

fn command_parts(frame: RespValue) -> Option<(String, Vec<String>)> {
    let RespValue::Array(elements) = frame else {
        return None;
    };

    let mut parts = elements.into_iter().map(|element| match element {
        RespValue::BulkString(part) => Some(part),
        _ => None,
    });

    let name = parts.next()??;
    let arguments = parts.collect::<Option<Vec<String>>>()?;

    Some((name, arguments))
}

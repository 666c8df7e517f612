// ABOUTME: Streams a child process pipe into an append-only log file
// ABOUTME: Bounded buffering; output is never held in memory beyond one read block

use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const READ_BLOCK: usize = 4096;

/// Drain `stream` into `path`, appending. Returns when the pipe closes.
pub async fn stream_to_file<R>(stream: Option<R>, path: PathBuf) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;

    let mut buf = [0u8; READ_BLOCK];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        file.flush().await?;
    }
    Ok(())
}

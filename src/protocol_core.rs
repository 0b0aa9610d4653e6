//! Framing codec shared by every request and response on the patch connection
//!
//! Wire shape of a frame: `i32` little-endian length, then `length` payload
//! bytes. A few responses carry raw (unframed) integers; those have dedicated
//! readers here so the session code never touches the stream directly.

use crate::error::{IoResultExt, PatchError, Result};
use crate::protocol::{MAX_FRAME_SIZE, TRANSFER_LENGTH_BYTES};
use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Frame header length in bytes
pub const FRAME_HEADER_LEN: usize = 4;

/// Validate frame payload size using protocol::MAX_FRAME_SIZE directly
pub fn validate_frame_size(size: usize) -> Result<()> {
    if size > MAX_FRAME_SIZE {
        return Err(PatchError::Protocol(format!(
            "frame payload too large: {} bytes (max: {})",
            size, MAX_FRAME_SIZE
        )));
    }
    Ok(())
}

/// Build frame header (4 bytes)
pub fn build_frame_header(payload_len: usize) -> Result<[u8; FRAME_HEADER_LEN]> {
    validate_frame_size(payload_len)?;
    Ok((payload_len as i32).to_le_bytes())
}

/// Parse frame header into the declared payload length
pub fn parse_frame_header(header: &[u8; FRAME_HEADER_LEN]) -> Result<usize> {
    let declared = i32::from_le_bytes(*header);
    if declared < 0 {
        return Err(PatchError::Protocol(format!(
            "negative frame length: {}",
            declared
        )));
    }
    let len = declared as usize;
    validate_frame_size(len)?;
    Ok(len)
}

/// Create directory with parent creation
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).at(path)?;
    }
    Ok(())
}

/// Create parent directory if needed
pub fn ensure_parent_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }
    Ok(())
}

#[inline]
async fn timed<T, F>(deadline: Option<Duration>, context: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        None => fut.await.map_err(|e| PatchError::from_stream(e, context)),
        Some(d) => match timeout(d, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(PatchError::from_stream(e, context)),
            Err(_) => Err(PatchError::Timeout {
                context,
                ms: d.as_millis() as u64,
            }),
        },
    }
}

/// Open a TCP connection to the patch server.
pub async fn connect(addr: &str, deadline: Option<Duration>) -> Result<Connection<TcpStream>> {
    let attempt = TcpStream::connect(addr);
    let stream = match deadline {
        None => attempt.await,
        Some(d) => match timeout(d, attempt).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
        },
    }
    .map_err(|source| PatchError::ConnectFailure {
        addr: addr.to_string(),
        source,
    })?;
    // Best-effort: small request frames go out without Nagle delay
    let _ = stream.set_nodelay(true);
    Ok(Connection::new(stream).with_deadline(deadline))
}

/// One session-owned byte stream with framed read/write helpers.
///
/// Without a deadline every read blocks until satisfied or the peer closes.
pub struct Connection<S> {
    stream: S,
    deadline: Option<Duration>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn write_framed(&mut self, payload: &[u8]) -> Result<()> {
        let header = build_frame_header(payload.len())?;
        let deadline = self.deadline;
        let stream = &mut self.stream;
        timed(deadline, "frame write", async move {
            stream.write_all(&header).await?;
            if !payload.is_empty() {
                stream.write_all(payload).await?;
            }
            stream.flush().await
        })
        .await
    }

    pub async fn write_command(&mut self, command: &str) -> Result<()> {
        self.write_framed(command.as_bytes()).await
    }

    /// Read one complete frame. Short reads are not boundaries.
    pub async fn read_framed(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        self.read_exact(&mut header, "frame header").await?;
        let len = parse_frame_header(&header)?;
        let mut payload = vec![0u8; len];
        if len > 0 {
            self.read_exact(&mut payload, "frame payload").await?;
        }
        Ok(payload)
    }

    /// Raw (unframed) 4-byte little-endian integer.
    pub async fn read_i32(&mut self, context: &'static str) -> Result<i32> {
        let mut raw = [0u8; 4];
        self.read_exact(&mut raw, context).await?;
        Ok(i32::from_le_bytes(raw))
    }

    /// Raw download length header, `TRANSFER_LENGTH_BYTES` wide.
    pub async fn read_transfer_length(&mut self) -> Result<u64> {
        let mut raw = [0u8; TRANSFER_LENGTH_BYTES];
        self.read_exact(&mut raw, "transfer length").await?;
        let declared = i64::from_le_bytes(raw);
        u64::try_from(declared)
            .map_err(|_| PatchError::Protocol(format!("negative transfer length: {}", declared)))
    }

    /// Single bounded read for the transfer loop. Zero bytes means the peer
    /// closed while data was still owed.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let deadline = self.deadline;
        let n = timed(deadline, "file body", self.stream.read(buf)).await?;
        if n == 0 && !buf.is_empty() {
            return Err(PatchError::ConnectionLost {
                context: "file body",
            });
        }
        Ok(n)
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }

    async fn read_exact(&mut self, buf: &mut [u8], context: &'static str) -> Result<()> {
        let deadline = self.deadline;
        timed(deadline, context, self.stream.read_exact(buf)).await?;
        Ok(())
    }
}

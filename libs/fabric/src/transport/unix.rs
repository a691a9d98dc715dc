use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::transport::{FrameSink, FrameSource, Transport, TransportListener};

/// Unix domain socket transport carrying length-prefixed frames
pub struct UnixTransport {
    stream: UnixStream,
}

impl UnixTransport {
    /// Connect to a Unix socket path
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream })
    }

    /// Connect, giving up after `timeout`
    pub async fn connect_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
            Ok(stream) => Ok(Self { stream: stream? }),
            Err(_) => Err(Error::ConnectTimeout),
        }
    }

    /// Create from an existing UnixStream
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }
}

#[async_trait::async_trait]
impl Transport for UnixTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        write_frame(&mut self.stream, bytes).await
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.stream).await
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn into_split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameSource>) {
        let (read, write) = self.stream.into_split();
        (
            Box::new(UnixFrameSink { write }),
            Box::new(UnixFrameSource { read }),
        )
    }
}

/// Write half of a split [`UnixTransport`]
pub struct UnixFrameSink {
    write: OwnedWriteHalf,
}

#[async_trait::async_trait]
impl FrameSink for UnixFrameSink {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        write_frame(&mut self.write, bytes).await
    }

    async fn close(&mut self) -> Result<()> {
        self.write.shutdown().await?;
        Ok(())
    }
}

/// Read half of a split [`UnixTransport`]
pub struct UnixFrameSource {
    read: OwnedReadHalf,
}

#[async_trait::async_trait]
impl FrameSource for UnixFrameSource {
    async fn receive(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.read).await
    }
}

/// Unix socket listener for accepting incoming connections
///
/// The socket file is removed on close and on drop.
pub struct UnixTransportListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixTransportListener {
    /// Bind to a Unix socket path, replacing any stale socket file
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    /// Get the path this listener is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl TransportListener for UnixTransportListener {
    type Conn = UnixTransport;

    async fn accept(&self) -> Result<UnixTransport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(UnixTransport::from_stream(stream))
    }

    async fn close(&mut self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for UnixTransportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

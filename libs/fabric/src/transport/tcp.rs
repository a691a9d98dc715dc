use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::transport::{FrameSink, FrameSource, Transport, TransportListener};

/// TCP transport carrying length-prefixed frames
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to a remote TCP address
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self { stream })
    }

    /// Connect, giving up after `timeout`
    pub async fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(stream) => Ok(Self { stream: stream? }),
            Err(_) => Err(Error::ConnectTimeout),
        }
    }

    /// Create from an existing TcpStream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Get the remote address of this connection
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(Into::into)
    }

    /// Get the local address of this connection
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(Into::into)
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
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
            Box::new(TcpFrameSink { write }),
            Box::new(TcpFrameSource { read }),
        )
    }
}

/// Write half of a split [`TcpTransport`]
pub struct TcpFrameSink {
    write: OwnedWriteHalf,
}

#[async_trait::async_trait]
impl FrameSink for TcpFrameSink {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        write_frame(&mut self.write, bytes).await
    }

    async fn close(&mut self) -> Result<()> {
        self.write.shutdown().await?;
        Ok(())
    }
}

/// Read half of a split [`TcpTransport`]
pub struct TcpFrameSource {
    read: OwnedReadHalf,
}

#[async_trait::async_trait]
impl FrameSource for TcpFrameSource {
    async fn receive(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.read).await
    }
}

/// TCP listener for accepting incoming connections
pub struct TcpTransportListener {
    listener: TcpListener,
}

impl TcpTransportListener {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}

#[async_trait::async_trait]
impl TransportListener for TcpTransportListener {
    type Conn = TcpTransport;

    async fn accept(&self) -> Result<TcpTransport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(TcpTransport::from_stream(stream))
    }

    async fn close(&mut self) -> Result<()> {
        // TcpListener cleanup happens on drop
        Ok(())
    }
}

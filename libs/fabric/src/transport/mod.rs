use crate::error::Result;

pub mod tcp;
pub mod unix;

pub use self::tcp::{TcpTransport, TcpTransportListener};
pub use self::unix::{UnixTransport, UnixTransportListener};

/// Write half of a split transport.
#[async_trait::async_trait]
pub trait FrameSink: Send {
    /// Send one frame
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Shut down the write direction
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a split transport.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Receive one frame
    async fn receive(&mut self) -> Result<Vec<u8>>;
}

impl std::fmt::Debug for dyn FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn FrameSink")
    }
}

impl std::fmt::Debug for dyn FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn FrameSource")
    }
}

/// Transport trait for sending and receiving raw byte frames
///
/// Each transport instance represents a single connection. A transport can
/// be used whole (request/reply loops) or split into independently owned
/// halves so one task writes while another reads.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Send one frame over the transport
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive one frame from the transport
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the transport connection
    async fn close(&mut self) -> Result<()>;

    /// Split into a send half and a receive half
    fn into_split(self: Box<Self>) -> (Box<dyn FrameSink>, Box<dyn FrameSource>);
}

/// Accepts incoming transport connections.
#[async_trait::async_trait]
pub trait TransportListener: Send + Sync {
    type Conn: Transport + 'static;

    /// Accept one incoming connection
    async fn accept(&self) -> Result<Self::Conn>;

    /// Close the listener
    async fn close(&mut self) -> Result<()>;
}

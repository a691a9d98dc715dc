//! Tether Fabric - Low-level transport and codec layer
//!
//! Provides transport abstractions (TCP, Unix sockets) with length-prefix
//! framing, codec support (JSON, bincode), and URL-based dialing. The RPC
//! layer in `tether-rpc` sits on top of this crate; nothing here knows
//! about requests, responses, or correlation ids.
//!
//! # Example
//!
//! ```no_run
//! use tether_fabric::{Channel, codec::JsonCodec, transport::TcpTransport};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping { seq: u32 }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let addr = "127.0.0.1:8080".parse()?;
//! let transport = TcpTransport::connect(addr).await?;
//! let mut channel = Channel::new(transport, JsonCodec);
//!
//! channel.send(&Ping { seq: 1 }).await?;
//! let pong: Ping = channel.receive().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod dial;
pub mod error;
pub mod frame;
pub mod transport;

// Re-exports for convenience
pub use channel::{Channel, ChannelSink, ChannelSource};
pub use dial::dial;
pub use error::{Error, Result};

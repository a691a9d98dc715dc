//! Tether RPC - Bidirectional remote calls over persistent transports
//!
//! A client issues named calls with arguments and receives the matched
//! result or error, interleaved with any number of other concurrent calls
//! on the same connection. Functions are identified by an explicit
//! [`FunctionKey`] (namespace path + simple name) that both peers supply
//! literally; failures cross the boundary as a [`RemoteError`] carrying
//! the context message, the original cause, and an opaque origin trace.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use tether_rpc::{registry, Client, FunctionKey, Registry, Server};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Server side: register handlers, then listen.
//! let reg = Arc::new(Registry::new());
//! reg.register_fn(FunctionKey::new(["Demo"], "add"), |args| {
//!     let a: i64 = registry::arg(&args, 0)?;
//!     let b: i64 = registry::arg(&args, 1)?;
//!     Ok(json!(a + b))
//! });
//! let server = Server::new(reg);
//! server.start("127.0.0.1", 9000).await?;
//!
//! // Client side: connect, bind a stub, call.
//! let client = Client::new();
//! client.connect("tcp://127.0.0.1:9000").await?;
//! let remote_add = client.bind(FunctionKey::new(["Demo"], "add"));
//! let sum = remote_add.invoke(vec![json!(10), json!(20)]).await?;
//! assert_eq!(sum, json!(30));
//!
//! client.disconnect().await?;
//! server.stop(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod key;
pub mod registry;
pub mod server;
pub mod stub;
pub mod wire;

// Re-exports for convenience
pub use client::{Client, ClientBuilder};
pub use error::{Error, Fault, RemoteError, Result};
pub use key::FunctionKey;
pub use registry::Registry;
pub use server::{BoundAddr, Server};
pub use stub::RemoteFn;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::error::Result;
use crate::transport::{FrameSink, FrameSource, Transport};

/// High-level channel for bidirectional communication
///
/// Couples a transport with a codec for persistent connections. A channel
/// can be driven whole from one task, or split so a writer task and a
/// reader task share the connection.
pub struct Channel<C> {
    transport: Box<dyn Transport>,
    codec: C,
}

impl<C: Codec> Channel<C> {
    /// Create a channel from an existing transport
    pub fn new(transport: impl Transport + 'static, codec: C) -> Self {
        Self {
            transport: Box::new(transport),
            codec,
        }
    }

    /// Send a message over the channel
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let bytes = self.codec.encode(message)?;
        self.transport.send(&bytes).await
    }

    /// Receive a message from the channel
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.transport.receive().await?;
        self.codec.decode(&bytes)
    }

    /// Split into a send half and a receive half
    pub fn into_split(self) -> (ChannelSink<C>, ChannelSource<C>)
    where
        C: Clone,
    {
        let (sink, source) = self.transport.into_split();
        (
            ChannelSink {
                sink,
                codec: self.codec.clone(),
            },
            ChannelSource {
                source,
                codec: self.codec,
            },
        )
    }

    /// Close the channel
    pub async fn close(mut self) -> Result<()> {
        self.transport.close().await
    }
}

/// Encoding write half of a split [`Channel`]
pub struct ChannelSink<C> {
    sink: Box<dyn FrameSink>,
    codec: C,
}

impl<C: Codec> ChannelSink<C> {
    /// Pair a raw frame sink with a codec
    pub fn new(sink: Box<dyn FrameSink>, codec: C) -> Self {
        Self { sink, codec }
    }

    /// Encode and send one message
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let bytes = self.codec.encode(message)?;
        self.sink.send(&bytes).await
    }

    /// Shut down the write direction
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await
    }
}

/// Decoding read half of a split [`Channel`]
pub struct ChannelSource<C> {
    source: Box<dyn FrameSource>,
    codec: C,
}

impl<C: Codec> ChannelSource<C> {
    /// Pair a raw frame source with a codec
    pub fn new(source: Box<dyn FrameSource>, codec: C) -> Self {
        Self { source, codec }
    }

    /// Receive and decode one message
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.source.receive().await?;
        self.codec.decode(&bytes)
    }
}

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{FrameSink, FrameSource, TcpTransport, Transport, UnixTransport};

/// Open a connection described by a URL and split it into halves.
///
/// Supported schemes:
/// - `tcp://host:port`
/// - `unix:///path/to/socket` (absolute path)
pub async fn dial(url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "tcp" => {
            let host = parsed
                .host_str()
                .ok_or_else(|| Error::InvalidUrl(format!("{url}: missing host")))?;
            let port = parsed
                .port()
                .ok_or_else(|| Error::InvalidUrl(format!("{url}: missing port")))?;
            let addr = tokio::net::lookup_host((host, port))
                .await?
                .next()
                .ok_or_else(|| Error::InvalidUrl(format!("{url}: host did not resolve")))?;
            let transport = TcpTransport::connect(addr).await?;
            Ok(Box::new(transport).into_split())
        }
        "unix" => {
            let transport = UnixTransport::connect(parsed.path()).await?;
            Ok(Box::new(transport).into_split())
        }
        other => Err(Error::InvalidUrl(format!(
            "{url}: unsupported scheme `{other}`"
        ))),
    }
}

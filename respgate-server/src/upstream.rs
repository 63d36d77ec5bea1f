//! # Upstream Driver
//!
//! Send one encoded request to the backend and relay the reply to a sink,
//! checking only the first reply byte.
//!
//! ## Design Principles
//! 1. **Short-Lived Connections**: One TCP connection per exchange; nothing is pooled.
//! 2. **Bounded Phases**: Connect, send and every read have their own timeout,
//!    and the whole relay is capped by `relay_timeout`.
//! 3. **Pass-Through**: Accepted replies are forwarded byte-for-byte, unparsed.
//!
//! ## Reply Boundaries
//! The driver does not parse replies, so it cannot count them. After the
//! header is accepted it forwards until the backend closes the connection or
//! stays silent for one `read_timeout`. A backend that keeps trickling bytes
//! is cut off at `relay_timeout` with `Timeout("relay")`; whatever was already
//! forwarded stays in the sink. `expected_reply_count` is reported in
//! the summary for callers that track replies themselves.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error};

use respgate_common::{GatewayError, GatewayResult, UpstreamConfig};
use respgate_core::{classify, diagnostic_window, Classification, EncodedRequest, Location};

/// Result of a completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeSummary {
    /// Reply bytes written to the sink.
    pub bytes_forwarded: usize,
    /// Advisory reply count carried over from the request.
    pub expected_replies: usize,
}

/// Drives exchanges against one backend.
#[derive(Debug, Clone)]
pub struct UpstreamDriver {
    config: UpstreamConfig,
}

impl UpstreamDriver {
    pub fn new(config: UpstreamConfig) -> Self {
        UpstreamDriver { config }
    }

    /// Uses the upstream settings of a compiled location.
    pub fn for_location(location: &Location) -> Self {
        Self::new(*location.upstream())
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Sends `request` and relays the reply into `sink`.
    ///
    /// Nothing is written to `sink` unless the reply header is accepted.
    pub async fn exchange<W>(
        &self,
        request: &EncodedRequest,
        sink: &mut W,
    ) -> GatewayResult<ExchangeSummary>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.connect().await?;

        timeout(self.config.send_timeout, async {
            stream.write_all(request.payload()).await?;
            stream.flush().await?;
            Ok::<_, std::io::Error>(())
        })
        .await
        .map_err(|_| GatewayError::Timeout("send"))??;

        let mut buffer = BytesMut::with_capacity(self.config.buffer_size);
        self.read_header(&mut stream, &mut buffer).await?;

        let deadline = Instant::now() + self.config.relay_timeout;
        let mut forwarded = 0;
        loop {
            sink.write_all(&buffer).await?;
            forwarded += buffer.len();
            buffer.clear();

            let read = timeout(self.config.read_timeout, stream.read_buf(&mut buffer));
            match timeout_at(deadline, read).await {
                Ok(Ok(Ok(0))) => break,
                Ok(Ok(Ok(_))) => {}
                Ok(Ok(Err(err))) => return Err(err.into()),
                Ok(Err(_)) => {
                    debug!(backend = %self.config.backend, "upstream idle, reply complete");
                    break;
                }
                Err(_) => {
                    sink.flush().await?;
                    error!(
                        backend = %self.config.backend,
                        forwarded,
                        "upstream reply exceeded relay timeout"
                    );
                    return Err(GatewayError::Timeout("relay"));
                }
            }
        }
        sink.flush().await?;

        let summary = ExchangeSummary {
            bytes_forwarded: forwarded,
            expected_replies: request.expected_reply_count(),
        };
        debug!(
            backend = %self.config.backend,
            sent = request.len(),
            forwarded = summary.bytes_forwarded,
            expected_replies = summary.expected_replies,
            "redis exchange finished"
        );
        Ok(summary)
    }

    async fn connect(&self) -> GatewayResult<TcpStream> {
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(self.config.backend))
            .await
            .map_err(|_| GatewayError::Timeout("connect"))??;
        // Requests are small and sent in one write.
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Reads until the first reply byte can be classified.
    async fn read_header(&self, stream: &mut TcpStream, buffer: &mut BytesMut) -> GatewayResult<()> {
        loop {
            let bytes = timeout(self.config.read_timeout, stream.read_buf(buffer))
                .await
                .map_err(|_| GatewayError::Timeout("read"))??;
            if bytes == 0 && buffer.is_empty() {
                return Err(GatewayError::UpstreamClosed);
            }

            match classify(&buffer[..]) {
                Classification::NeedMoreBytes => continue,
                Classification::Accepted => return Ok(()),
                Classification::Rejected(reason) => {
                    error!(
                        backend = %self.config.backend,
                        response = %String::from_utf8_lossy(diagnostic_window(&buffer[..])),
                        "redis sent invalid response"
                    );
                    return Err(reason.into());
                }
            }
        }
    }
}

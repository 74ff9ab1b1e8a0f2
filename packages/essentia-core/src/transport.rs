//! Line-oriented transport over the TCP serial bridge.
//!
//! The device speaks CR-terminated plaintext lines, one command or response
//! per line. This module provides the [`LineTransport`] seam the connection
//! manager consumes, the [`CrLineCodec`] framing, and the TCP
//! implementation. The socket is owned exclusively by the connection
//! session; no other component opens or closes it.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

/// Codec for CR-terminated lines.
///
/// Outbound lines are terminated with a single CR, which is what the
/// serial side of the bridge expects. Inbound framing accepts CR, LF, or
/// CRLF since bridges differ in what they forward; empty frames (the LF of
/// a CRLF pair) are swallowed.
#[derive(Debug, Default)]
pub struct CrLineCodec;

impl Decoder for CrLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\r' || *b == b'\n') else {
                return Ok(None);
            };
            let frame = src.split_to(pos + 1);
            let line = &frame[..pos];
            if line.is_empty() {
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(line).into_owned()));
        }
    }
}

impl Encoder<String> for CrLineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\r');
        Ok(())
    }
}

/// Write half of an established connection.
#[async_trait]
pub trait LineSink: Send {
    /// Sends one line (terminator added by the transport).
    async fn send_line(&mut self, line: &str) -> io::Result<()>;
}

/// Read half of an established connection.
#[async_trait]
pub trait LineSource: Send {
    /// Next inbound line. `Ok(None)` means the peer closed the stream.
    ///
    /// Must be cancellation safe: callers poll it inside `select!`.
    async fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Factory for establishing connections to the device endpoint.
#[async_trait]
pub trait LineTransport: Send + Sync {
    /// Opens a fresh connection, returning its two halves.
    async fn connect(&self) -> io::Result<(Box<dyn LineSink>, Box<dyn LineSource>)>;
}

/// TCP transport to a `host:port` serial bridge endpoint.
pub struct TcpLineTransport {
    endpoint: String,
    connect_timeout: Duration,
}

impl TcpLineTransport {
    pub fn new(endpoint: String, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
        }
    }
}

#[async_trait]
impl LineTransport for TcpLineTransport {
    async fn connect(&self) -> io::Result<(Box<dyn LineSink>, Box<dyn LineSource>)> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.endpoint))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", self.endpoint),
                )
            })??;
        // Commands are tiny and latency-sensitive
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        let sink = TcpLineSink {
            framed: FramedWrite::new(write_half, CrLineCodec),
        };
        let source = TcpLineSource {
            framed: FramedRead::new(read_half, CrLineCodec),
        };
        Ok((Box::new(sink), Box::new(source)))
    }
}

struct TcpLineSink {
    framed: FramedWrite<tokio::net::tcp::OwnedWriteHalf, CrLineCodec>,
}

#[async_trait]
impl LineSink for TcpLineSink {
    async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.framed.send(line.to_string()).await
    }
}

struct TcpLineSource {
    framed: FramedRead<tokio::net::tcp::OwnedReadHalf, CrLineCodec>,
}

#[async_trait]
impl LineSource for TcpLineSource {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self.framed.next().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut CrLineCodec, src: &mut BytesMut) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(Some(line)) = codec.decode(src) {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn decodes_cr_lf_and_crlf_terminated_lines() {
        let mut codec = CrLineCodec;
        let mut src = BytesMut::from(&b"#Z01PWRON\r#ALLOFF\n#Z02PWROFF\r\n"[..]);
        assert_eq!(
            decode_all(&mut codec, &mut src),
            vec!["#Z01PWRON", "#ALLOFF", "#Z02PWROFF"]
        );
        assert!(src.is_empty());
    }

    #[test]
    fn partial_line_waits_for_terminator() {
        let mut codec = CrLineCodec;
        let mut src = BytesMut::from(&b"#Z01PW"[..]);
        assert_eq!(codec.decode(&mut src).unwrap(), None);
        src.extend_from_slice(b"RON\r");
        assert_eq!(codec.decode(&mut src).unwrap(), Some("#Z01PWRON".to_string()));
    }

    #[test]
    fn encoder_appends_cr() {
        let mut codec = CrLineCodec;
        let mut dst = BytesMut::new();
        codec.encode("*Z01CONSR".to_string(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"*Z01CONSR\r");
    }
}

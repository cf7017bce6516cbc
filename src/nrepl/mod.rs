//! Minimal nREPL client: one TCP connection, bencoded messages.
//!
//! Encoding and decoding go through `serde_bencode`; this module only frames
//! messages on the socket and converts them to [`Message`].

use std::collections::BTreeMap;
use std::io::Cursor;

use serde::Deserialize;
use serde_bencode::value::Value as Bencode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};

pub mod value;

pub use value::Value;

pub type Message = BTreeMap<String, Value>;

const READ_CHUNK: usize = 4096;

/// Format the connection URI for a host and port.
pub fn uri(host: &str, port: u16) -> String {
    format!("nrepl://{}:{}", host, port)
}

/// Split `nrepl://host:port` into its host and port.
pub fn parse_uri(uri: &str) -> Result<(String, u16)> {
    let rest = uri
        .strip_prefix("nrepl://")
        .ok_or_else(|| SessionError::InvalidArgument(format!("not an nrepl:// uri: {}", uri)))?;
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| SessionError::InvalidArgument(format!("missing port in {}", uri)))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| SessionError::InvalidArgument(format!("bad port in {}", uri)))?;
    if host.is_empty() {
        return Err(SessionError::InvalidArgument(format!("missing host in {}", uri)));
    }
    Ok((host.trim_matches(|c| c == '[' || c == ']').to_string(), port))
}

/// Build the request for evaluating `code`.
pub fn eval_request(code: &str) -> Message {
    let mut msg = Message::new();
    msg.insert("op".into(), "eval".into());
    msg.insert("code".into(), code.into());
    msg
}

/// Bencode a message.
pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    let wire = Bencode::from(Value::Dict(msg.clone()));
    serde_bencode::to_bytes(&wire).map_err(|e| SessionError::Protocol(e.to_string()))
}

/// Decode one message from the front of `buf`.
///
/// Returns the message and the number of bytes it used, or `None` when `buf`
/// holds only the start of a message.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Message, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut cursor = Cursor::new(buf);
    let parsed = Bencode::deserialize(&mut serde_bencode::de::Deserializer::new(&mut cursor));
    let wire = match parsed {
        Ok(wire) => wire,
        Err(serde_bencode::Error::EndOfStream) => return Ok(None),
        Err(serde_bencode::Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(None)
        }
        Err(e) => return Err(SessionError::Protocol(e.to_string())),
    };
    let used = cursor.position() as usize;
    match Value::try_from(wire)? {
        Value::Dict(map) => Ok(Some((map, used))),
        other => Err(SessionError::Protocol(format!("expected a dict, got {:?}", other))),
    }
}

pub struct Connection {
    uri: String,
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Connection {
    pub async fn connect(uri: &str) -> Result<Self> {
        let (host, port) = parse_uri(uri)?;
        debug!(%uri, "opening nREPL connection");
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| SessionError::connection(uri, e))?;
        Ok(Self {
            uri: uri.to_string(),
            stream,
            buf: Vec::new(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub async fn write(&mut self, msg: &Message) -> Result<()> {
        let bytes = encode(msg)?;
        trace!(uri = %self.uri, len = bytes.len(), "writing nREPL message");
        self.stream
            .write_all(&bytes)
            .await
            .map_err(|e| SessionError::connection(&self.uri, e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| SessionError::connection(&self.uri, e))
    }

    /// Read one message. Bytes past the message stay buffered for the next read.
    ///
    /// A close before any reply byte is a `ConnectionFailure`; a close after a
    /// partial or unparsable reply is a `Protocol` error.
    pub async fn read(&mut self) -> Result<Message> {
        loop {
            if let Some((msg, used)) = decode_frame(&self.buf)? {
                self.buf.drain(..used);
                return Ok(msg);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|e| SessionError::connection(&self.uri, e))?;
            if n == 0 && !self.buf.is_empty() {
                // The peer answered, but what it sent never became a message.
                return Err(SessionError::Protocol(format!(
                    "connection closed inside a message ({} bytes buffered)",
                    self.buf.len()
                )));
            }
            if n == 0 {
                return Err(SessionError::connection(
                    &self.uri,
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed before a full message arrived",
                    ),
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        assert_eq!(
            parse_uri("nrepl://127.0.0.1:57041").unwrap(),
            ("127.0.0.1".to_string(), 57041)
        );
        assert_eq!(
            parse_uri(&uri("localhost", 7888)).unwrap(),
            ("localhost".to_string(), 7888)
        );
        assert!(parse_uri("http://localhost:1").is_err());
        assert!(parse_uri("nrepl://localhost").is_err());
        assert!(parse_uri("nrepl://:80").is_err());
    }

    #[test]
    fn test_eval_request_shape() {
        let msg = eval_request("(+ 1 2)");
        assert_eq!(msg.len(), 2);
        assert_eq!(msg["op"].as_str(), Some("eval"));
        assert_eq!(msg["code"].as_str(), Some("(+ 1 2)"));
    }

    #[test]
    fn test_encode_eval_request_sorted_keys() {
        let bytes = encode(&eval_request("(+ 1 2)")).unwrap();
        assert_eq!(bytes, b"d4:code7:(+ 1 2)2:op4:evale".to_vec());
    }

    #[test]
    fn test_decode_frame_response() {
        let raw = b"d2:ns4:user7:session3:abc5:value1:3e";
        let (msg, used) = decode_frame(raw).unwrap().unwrap();
        assert_eq!(used, raw.len());
        assert_eq!(msg["ns"].as_str(), Some("user"));
        assert_eq!(msg["value"].as_str(), Some("3"));
    }

    #[test]
    fn test_decode_frame_keeps_nested_values() {
        let raw = b"d2:idi-7e6:statusl4:donee";
        let (msg, _) = decode_frame(raw).unwrap().unwrap();
        assert_eq!(msg["id"], Value::Int(-7));
        assert_eq!(msg["status"], Value::List(vec!["done".into()]));
    }

    #[test]
    fn test_decode_frame_partial_needs_more() {
        assert!(decode_frame(b"").unwrap().is_none());
        assert!(decode_frame(b"d2:ns4:user7:sess").unwrap().is_none());
    }

    #[test]
    fn test_decode_frame_leaves_next_message() {
        let raw = b"d1:ai1eed1:bi2ee";
        let (msg, used) = decode_frame(raw).unwrap().unwrap();
        assert_eq!(used, 8);
        assert_eq!(msg["a"], Value::Int(1));
    }

    #[test]
    fn test_decode_frame_rejects_malformed() {
        // Dict keys must be byte strings.
        assert!(matches!(decode_frame(b"di1ei2ee"), Err(SessionError::Protocol(_))));
        assert!(matches!(decode_frame(b"i5e"), Err(SessionError::Protocol(_))));
        assert!(matches!(decode_frame(b"x"), Err(SessionError::Protocol(_))));
    }
}

//! Message framing for the inference socket.
//!
//! Two framings carry the same JSON payloads:
//!
//! - `LengthPrefixed`: a 4-byte big-endian length followed by the JSON bytes.
//! - `Legacy`: raw JSON with no delimiter. The sender half-closes its write
//!   side and the receiver takes whatever a single read of up to
//!   [`LEGACY_READ_BUFFER`](crate::defaults::LEGACY_READ_BUFFER) bytes returns.
//!   Messages that do not arrive in one read are truncated; this matches the
//!   reference server and is kept only for interoperating with it.

use crate::defaults::{LEGACY_READ_BUFFER, MAX_FRAME_BYTES};
use crate::error::{DrishtiError, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// How messages are delimited on the inference socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    #[default]
    LengthPrefixed,
    Legacy,
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Framing::LengthPrefixed => write!(f, "length_prefixed"),
            Framing::Legacy => write!(f, "legacy"),
        }
    }
}

/// Write one message. In legacy mode the write half is shut down afterwards.
pub async fn write_message<W>(writer: &mut W, framing: Framing, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match framing {
        Framing::LengthPrefixed => {
            let len = u32::try_from(payload.len())
                .ok()
                .filter(|len| *len <= MAX_FRAME_BYTES)
                .ok_or_else(|| DrishtiError::IpcProtocol {
                    message: format!(
                        "Message of {} bytes exceeds the {} byte limit",
                        payload.len(),
                        MAX_FRAME_BYTES
                    ),
                })?;
            writer
                .write_all(&len.to_be_bytes())
                .await
                .map_err(write_error)?;
            writer.write_all(payload).await.map_err(write_error)?;
            writer.flush().await.map_err(write_error)?;
        }
        Framing::Legacy => {
            writer.write_all(payload).await.map_err(write_error)?;
            writer.flush().await.map_err(write_error)?;
            writer.shutdown().await.map_err(write_error)?;
        }
    }
    Ok(())
}

/// Read one message.
///
/// # Errors
/// `IpcConnection` when the socket fails, `IpcProtocol` when the peer closes
/// before a message arrives or announces an oversized frame.
pub async fn read_message<R>(reader: &mut R, framing: Framing) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    match framing {
        Framing::LengthPrefixed => {
            let mut header = [0u8; 4];
            reader.read_exact(&mut header).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    DrishtiError::IpcProtocol {
                        message: "Connection closed before a message arrived".to_string(),
                    }
                } else {
                    read_error(e)
                }
            })?;

            let len = u32::from_be_bytes(header);
            if len > MAX_FRAME_BYTES {
                return Err(DrishtiError::IpcProtocol {
                    message: format!(
                        "Announced message of {} bytes exceeds the {} byte limit",
                        len, MAX_FRAME_BYTES
                    ),
                });
            }

            let mut payload = vec![0u8; len as usize];
            reader.read_exact(&mut payload).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    DrishtiError::IpcProtocol {
                        message: format!("Truncated message: expected {} bytes", len),
                    }
                } else {
                    read_error(e)
                }
            })?;
            Ok(payload)
        }
        Framing::Legacy => {
            let mut buffer = vec![0u8; LEGACY_READ_BUFFER];
            let n = reader.read(&mut buffer).await.map_err(read_error)?;
            if n == 0 {
                return Err(DrishtiError::IpcProtocol {
                    message: "Connection closed before a message arrived".to_string(),
                });
            }
            buffer.truncate(n);
            Ok(buffer)
        }
    }
}

fn write_error(e: std::io::Error) -> DrishtiError {
    DrishtiError::IpcConnection {
        message: format!("Failed to write message: {}", e),
    }
}

fn read_error(e: std::io::Error) -> DrishtiError {
    DrishtiError::IpcConnection {
        message: format!("Failed to read message: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_length_prefixed_roundtrip() {
        let (mut a, mut b) = duplex(1024);
        write_message(&mut a, Framing::LengthPrefixed, br#"{"id":1}"#)
            .await
            .unwrap();
        let got = read_message(&mut b, Framing::LengthPrefixed).await.unwrap();
        assert_eq!(got, br#"{"id":1}"#);
    }

    #[tokio::test]
    async fn test_length_prefixed_header_is_big_endian() {
        let (mut a, mut b) = duplex(1024);
        write_message(&mut a, Framing::LengthPrefixed, b"abc")
            .await
            .unwrap();
        drop(a);
        let mut raw = Vec::new();
        b.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw, [0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_length_prefixed_rejects_oversized_announcement() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&(MAX_FRAME_BYTES + 1).to_be_bytes())
            .await
            .unwrap();
        let err = read_message(&mut b, Framing::LengthPrefixed)
            .await
            .unwrap_err();
        assert!(matches!(err, DrishtiError::IpcProtocol { .. }));
    }

    #[tokio::test]
    async fn test_length_prefixed_truncated_body() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(b"short").await.unwrap();
        drop(a);
        let err = read_message(&mut b, Framing::LengthPrefixed)
            .await
            .unwrap_err();
        match err {
            DrishtiError::IpcProtocol { message } => assert!(message.contains("Truncated")),
            other => panic!("Expected IpcProtocol, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_before_message_is_protocol_error() {
        for framing in [Framing::LengthPrefixed, Framing::Legacy] {
            let (a, mut b) = duplex(64);
            drop(a);
            let err = read_message(&mut b, framing).await.unwrap_err();
            assert!(
                matches!(err, DrishtiError::IpcProtocol { .. }),
                "{framing}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_legacy_roundtrip() {
        let (mut a, mut b) = duplex(1024);
        write_message(&mut a, Framing::Legacy, br#"{"success":true}"#)
            .await
            .unwrap();
        let got = read_message(&mut b, Framing::Legacy).await.unwrap();
        assert_eq!(got, br#"{"success":true}"#);
    }

    #[test]
    fn test_framing_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            framing: Framing,
        }
        let w: Wrapper = toml::from_str("framing = \"legacy\"").unwrap();
        assert_eq!(w.framing, Framing::Legacy);
        let w: Wrapper = toml::from_str("framing = \"length_prefixed\"").unwrap();
        assert_eq!(w.framing, Framing::LengthPrefixed);
        assert_eq!(Framing::default(), Framing::LengthPrefixed);
    }
}

//! Runtime wire protocol codec
//!
//! Every [`WireMessage`] travels as one frame: HTTP-style headers, a blank
//! line, then the JSON body.
//! ```text
//! Content-Length: <byte-length>\r\n
//! \r\n
//! {"seq":1,"type":"event","event":"shown","body":{"entity":"app"}}
//! ```
//! Headers other than `Content-Length` are accepted and ignored.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::{Error, Result};

use super::types::WireMessage;

/// Upper bound on a single frame body
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// The peer closing its end mid-frame means it went away
fn stream_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => Error::RuntimeCrashed,
        _ => Error::Io(e),
    }
}

/// Read the header block and return the announced body length
async fn read_frame_length<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<usize> {
    let mut length = None;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await.map_err(stream_error)? == 0 {
            return Err(Error::RuntimeCrashed);
        }

        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        let Some((name, value)) = header.split_once(':') else {
            return Err(Error::Protocol(format!("Malformed header line: {:?}", header)));
        };
        if name.trim().eq_ignore_ascii_case("Content-Length") {
            let value = value.trim();
            length = Some(value.parse::<usize>().map_err(|_| {
                Error::Protocol(format!("Invalid Content-Length: {}", value))
            })?);
        }
    }

    match length {
        Some(len) if len > MAX_FRAME_BYTES => Err(Error::Protocol(format!(
            "Frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_BYTES
        ))),
        Some(len) => Ok(len),
        None => Err(Error::Protocol("Missing Content-Length header".to_string())),
    }
}

/// Read and decode the next message
///
/// A body that is not a valid message yields `Error::Protocol` after the
/// whole frame was consumed, so the caller may skip it and keep reading.
pub async fn read_message<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<WireMessage> {
    let len = read_frame_length(reader).await?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(stream_error)?;

    tracing::trace!(body = %String::from_utf8_lossy(&body), "<<<");
    serde_json::from_slice(&body).map_err(|e| Error::Protocol(format!("Malformed message: {}", e)))
}

/// Encode a message and write it as a single frame
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &WireMessage,
) -> Result<()> {
    let body = serde_json::to_vec(message)?;
    tracing::trace!(body = %String::from_utf8_lossy(&body), ">>>");

    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    writer.write_all(&frame).await.map_err(stream_error)?;
    writer.flush().await.map_err(stream_error)?;
    Ok(())
}

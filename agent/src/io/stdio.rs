use fileward_core::EngineConfig;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::handler::dispatch::Dispatcher;
use crate::protocol::errors;
use crate::protocol::messages::{JsonRpcErrorResponse, JsonRpcRequest};

/// Maximum message size: 64 MiB, room for base64-encoded uploads.
const MAX_LINE_SIZE: usize = 64 * 1_048_576;

/// One newline-delimited frame read from the channel.
#[derive(Debug, PartialEq)]
enum Frame {
    Eof,
    Line(Vec<u8>),
    /// A line longer than the limit; its remainder has been discarded.
    Oversized(usize),
}

/// Run the NDJSON stdio transport loop.
///
/// Reads JSON-RPC messages from stdin (one per line) and writes
/// responses to stdout. Logs go to stderr.
pub async fn run_stdio_loop(config: EngineConfig) -> anyhow::Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    info!("Stdio transport loop started, waiting for input");
    serve(reader, writer, Dispatcher::new(config), MAX_LINE_SIZE).await
}

/// Answer every frame on `reader` until EOF.
async fn serve<R, W>(
    mut reader: R,
    mut writer: W,
    mut dispatcher: Dispatcher,
    limit: usize,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWriteExt + Unpin,
{
    loop {
        let bytes = match read_frame(&mut reader, limit).await? {
            Frame::Eof => {
                info!("Input closed, shutting down");
                return Ok(());
            }
            Frame::Oversized(seen) => {
                warn!("Dropped message over the {limit}-byte limit ({seen}+ bytes)");
                let err = parse_error(format!(
                    "Message exceeds the {} byte size limit; send large uploads in \
                     smaller fm.upload calls",
                    limit
                ));
                write_response(&mut writer, &err).await?;
                continue;
            }
            Frame::Line(bytes) => bytes,
        };

        let text = match std::str::from_utf8(&bytes) {
            Ok(text) => text.trim(),
            Err(e) => {
                write_response(&mut writer, &parse_error(format!("Invalid UTF-8: {e}"))).await?;
                continue;
            }
        };
        if text.is_empty() {
            continue;
        }
        debug!("Received {} bytes", text.len());

        let request: JsonRpcRequest = match serde_json::from_str(text) {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to parse JSON-RPC request: {e}");
                write_response(&mut writer, &parse_error(format!("Parse error: {e}"))).await?;
                continue;
            }
        };

        if request.jsonrpc != "2.0" {
            let err = JsonRpcErrorResponse::new(
                request.id,
                errors::INVALID_REQUEST,
                "Invalid JSON-RPC version (must be \"2.0\")",
            );
            write_response(&mut writer, &serde_json::to_value(&err)?).await?;
            continue;
        }

        let response = dispatcher.dispatch(request).await.to_json();
        write_response(&mut writer, &response).await?;
    }
}

/// Read one line of at most `limit` bytes, never buffering more than that.
async fn read_frame<R>(reader: &mut R, limit: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(limit as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') || buf.len() <= limit {
        return Ok(Frame::Line(buf));
    }
    skip_line(reader).await?;
    Ok(Frame::Oversized(buf.len()))
}

/// Discard input up to and including the next newline.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|b| *b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
}

fn parse_error(message: String) -> Value {
    let err = JsonRpcErrorResponse::new(Value::Null, errors::PARSE_ERROR, message);
    serde_json::to_value(&err).unwrap_or(Value::Null)
}

/// Write a JSON value as an NDJSON line to the writer.
async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    value: &Value,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

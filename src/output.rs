//! Line decoding and forwarding of child process output.

use crate::logger::Logger;
use bytes::BytesMut;
use futures_util::stream::{self, StreamExt};
use std::io;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{debug, warn};

/// Longest line forwarded in one piece
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Splits a byte stream into text lines
///
/// Lines end at `\n`; a trailing `\r` is dropped and invalid UTF-8 is
/// replaced rather than rejected, so a misbehaving child can never stall
/// the reader. A final line without a terminator is emitted at EOF, and
/// output that runs past the maximum length without a newline is emitted
/// in chunks of that length.
#[derive(Debug)]
pub struct OutputLineCodec {
    /// Bytes already scanned for a newline in the current buffer
    next_index: usize,
    max_length: usize,
}

impl OutputLineCodec {
    pub fn new() -> Self {
        Self::new_with_max_length(MAX_LINE_LENGTH)
    }

    /// Creates a codec that splits lines longer than `max_length` bytes
    pub fn new_with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length: max_length.max(1),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for OutputLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<String>> {
        // Never scan past the cap, so an endless line is cut where it hits it
        let scan_end = buf.len().min(self.max_length + 1);
        let newline = buf[self.next_index.min(scan_end)..scan_end]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        match newline {
            Some(newline) => {
                self.next_index = 0;
                let line = buf.split_to(newline + 1);
                Ok(Some(decode_line(&line[..newline])))
            }
            None if buf.len() > self.max_length => {
                self.next_index = 0;
                let chunk = buf.split_to(self.max_length);
                Ok(Some(String::from_utf8_lossy(&chunk).into_owned()))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<String>> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            Ok(None)
        } else {
            let rest = buf.split_to(buf.len());
            Ok(Some(decode_line(&rest)))
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Spawns the forwarding task for one process
///
/// Both readers are merged into a single line stream. Lines from the same
/// reader keep their order; the task ends once both readers reach EOF,
/// which is what the returned handle resolves on.
pub fn spawn_forwarder<O, E>(stdout: O, stderr: E, prefix: String, logger: Logger) -> JoinHandle<()>
where
    O: AsyncRead + Send + Unpin + 'static,
    E: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = stream::select(
        FramedRead::new(stdout, OutputLineCodec::new()),
        FramedRead::new(stderr, OutputLineCodec::new()),
    );

    tokio::spawn(async move {
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => logger.line(&prefix, &line),
                Err(e) => warn!("error reading output for {}: {}", prefix.trim_end(), e),
            }
        }
        debug!("output stream closed for {}", prefix.trim_end());
    })
}

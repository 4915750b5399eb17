//! Helpers shared by the demo programs.
//!
//! Messages travel as frames: one length byte followed by at most 255
//! bytes of UTF-8.

#![allow(dead_code)]

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, RawFd};

pub const MAX_FRAME: usize = u8::MAX as usize;

pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Writes `message` as a single frame.
pub fn write_frame<W: Write>(writer: &mut W, message: &str) -> io::Result<()> {
    let bytes = message.as_bytes();
    if bytes.len() > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message too long: {} > {MAX_FRAME} bytes", bytes.len()),
        ));
    }

    let mut frame = Vec::with_capacity(bytes.len() + 1);
    frame.push(bytes.len() as u8);
    frame.extend_from_slice(bytes);

    writer.write_all(&frame)
}

/// Reads one frame. Returns `None` once the peer closed the connection.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<String>> {
    let mut len = [0u8; 1];
    if reader.read(&mut len)? == 0 {
        return Ok(None);
    }

    let mut buffer = vec![0u8; len[0] as usize];
    reader.read_exact(&mut buffer)?;

    String::from_utf8(buffer)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Line splitter over a raw descriptor.
///
/// Every call to [`read_lines`](Self::read_lines) performs exactly one
/// `read` with no userspace buffering in between, so no line is left
/// waiting after a readable notification has been consumed.
pub struct LineReader<R> {
    input: R,
    pending: Vec<u8>,
}

/// Reads a duplicate of the stdin descriptor, bypassing `Stdin`'s buffer.
pub fn stdin_lines() -> io::Result<LineReader<File>> {
    let input = File::from(io::stdin().as_fd().try_clone_to_owned()?);
    Ok(LineReader::new(input))
}

impl<R: Read> LineReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            pending: Vec::new(),
        }
    }

    /// Returns every complete line available, without trailing newlines.
    ///
    /// Returns `None` on end of input. A last line without a newline is
    /// returned once the input ends.
    pub fn read_lines(&mut self) -> io::Result<Option<Vec<String>>> {
        let mut chunk = [0u8; 4096];
        let n = match self.input.read(&mut chunk) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(Some(Vec::new())),
            Err(err) => return Err(err),
        };

        if n == 0 {
            if self.pending.is_empty() {
                return Ok(None);
            }
            let rest = std::mem::take(&mut self.pending);
            return Ok(Some(vec![decode_line(&rest)]));
        }

        self.pending.extend_from_slice(&chunk[..n]);

        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            lines.push(decode_line(&line));
        }

        Ok(Some(lines))
    }
}

impl<R: AsRawFd> LineReader<R> {
    /// The descriptor to watch for readability.
    pub fn as_raw_fd(&self) -> RawFd {
        self.input.as_raw_fd()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

//! Round-trip command execution over an async byte stream

use std::{
    error::Error,
    fmt,
    io,
    time::Duration,
};
use tokio::io::{ AsyncReadExt, AsyncWriteExt };
use crate::cmd::BoardCmd;

/// Default bound on a single command round-trip
///
/// Exceeding it is a failed round-trip, not a retried condition. The value
/// mirrors the serial timeout the board is usually opened with.
pub const DEFAULT_ROUND_TRIP_TIMEOUT: Duration = Duration::from_secs(5);

/// A failed command round-trip with the adapter
///
/// Any of these is fatal for the in-flight command. The link itself stays
/// usable; the caller decides whether to issue further commands.
#[derive(Debug)]
pub enum LinkError
{
    /// An I/O error occurred while writing the command or reading the response
    Io(io::Error),
    /// The board did not answer within the round-trip timeout
    Timeout,
    /// The board answered with a negative acknowledgement
    ///
    /// The contained string is the remainder of the board's error line, which
    /// usually names the rejected command.
    Nak(String),
    /// The board answered, but the response did not match the command issued
    ///
    /// # Implementation Notes
    /// This mostly comes up on baud rate mismatches or when another process
    /// has been talking on the same port, leaving stale bytes in the stream.
    Garbled(String),
}

impl fmt::Display for LinkError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Io(io_err) => write!(f, "I/O error on adapter link. {}", io_err),
            Self::Timeout => f.write_str("Adapter did not answer within the round-trip timeout"),
            Self::Nak(line) => write!(f, "Adapter rejected the command: {}", line),
            Self::Garbled(line) => write!(f, "Adapter response does not match the command: {:?}", line),
        }
    }
}

impl Error for LinkError {}

impl From<io::Error> for LinkError
{
    fn from(this: io::Error) -> Self
    {
        Self::Io(this)
    }
}

/// Serializes commands onto an async stream and reads back one response line
/// per command
///
/// Strictly one command is in flight at a time; there is no pipelining and no
/// reordering. The executor owns the stream exclusively for the lifetime of
/// the connection.
pub(crate) struct Executor<T>
{
    io_handle: T,
    read_buf: Vec<u8>,
    timeout: Duration,
}

impl <T> Executor<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    pub fn with(io_handle: T, timeout: Duration) -> Self
    {
        Self {
            io_handle: io_handle,
            read_buf: Vec::with_capacity(128),
            timeout: timeout,
        }
    }

    pub fn into_inner(self) -> T
    {
        self.io_handle
    }

    /// Drops the first `n` bytes from the read buffer
    ///
    /// Drops all bytes if `n >= self.read_buf.len()`
    fn drop_first(&mut self, n: usize)
    {
        if n >= self.read_buf.len() {
            self.read_buf.clear();
        }
        else {
            // relocate any bytes after the Nth byte to index 0
            self.read_buf.rotate_left(n);
            // chop off the bytes we just consumed
            self.read_buf.truncate(self.read_buf.len() - n);
            // shrink the buffer's allocation to keep memory usage down
            self.read_buf.shrink_to(128);
        }
    }

    /// Returns the index of the first linefeed in the read buffer if any,
    /// starting the scan at the suggested index
    ///
    /// If the suggested index is out of bounds, then `None` is returned.
    fn find_line_ending(&self, start_hint: usize) -> Option<usize>
    {
        for index in start_hint..self.read_buf.len() {
            if self.read_buf[index] == 0x0A {
                return Some(index);
            }
        }

        None
    }

    /// Reads a line (series of bytes terminated by `LF` / 0x0A) into the read
    /// buffer and returns how many bytes are in the line
    async fn read_line(&mut self) -> Result<usize, io::Error>
    {
        let mut total_bytes_read = 0;
        // try to find the ending in already-buffered data first
        let mut end_index = self.find_line_ending(0);

        while end_index.is_none() {
            let mut temp_buf = [0u8; 64];
            let bytes_read = self.io_handle.read(&mut temp_buf[..]).await?;

            if bytes_read == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }

            let prior_end = total_bytes_read;
            total_bytes_read += bytes_read;
            self.read_buf.extend_from_slice(&temp_buf[..bytes_read]);
            end_index = self.find_line_ending(prior_end);
        }

        Ok(end_index.unwrap() + 1)
    }

    /// Executes the given command, sending it to the board and returning the
    /// payload of the response line
    ///
    /// The whole round-trip is bounded by the executor's timeout. A response
    /// line must start with the command's tag letter; a line starting with
    /// `E` is the board's NAK and anything else is treated as a garbled
    /// response. The returned payload excludes the tag letter, the separating
    /// space, and the line ending.
    pub async fn exec_cmd(&mut self, cmd: BoardCmd) -> Result<String, LinkError>
    {
        let serialized = format!("{}\n", cmd);
        log::trace!("-> {}", serialized.trim_end());

        let timeout = self.timeout;
        let round_trip = async {
            self.io_handle.write_all(serialized.as_bytes()).await?;
            self.read_line().await
        };

        let response_len = match tokio::time::timeout(timeout, round_trip).await {
            Ok(result) => result?,
            Err(_) => return Err(LinkError::Timeout),
        };

        let line = String::from_utf8_lossy(&self.read_buf[..response_len])
            .trim_end()
            .to_string();
        self.drop_first(response_len);
        log::trace!("<- {}", line);

        if line.starts_with('E') {
            return Err(LinkError::Nak(line));
        }

        match line.strip_prefix(cmd.response_tag()) {
            Some(payload) => Ok(payload.trim_start().to_string()),
            None => Err(LinkError::Garbled(line)),
        }
    }
}

//! In-process simulated adapter speaking the board's wire protocol
//!
//! [`SimBoard`] answers the same line-oriented commands a real adapter does,
//! over any async byte stream. The seated "chip" is a caller-supplied
//! function from the written physical mask to the mask read back, so tests
//! can model floating pins (reflect the write unchanged), driven pins (force
//! a bit), or coupled pins (flip one bit in response to another).
//!
//! Typical use is a [`tokio::io::duplex`] pair: hand one end to
//! [`serve`](SimBoard::serve) on a spawned task and open a
//! [`Board`](crate::board::Board) on the other.

use tokio::io::{ AsyncReadExt, AsyncWriteExt };

/// Chip behavior: physical mask written -> physical mask read back
pub type ChipFn = Box<dyn FnMut(u64) -> u64 + Send>;

/// Power rail observer, called on every `P` command
pub type PowerFn = Box<dyn FnMut(bool) + Send>;

/// A scriptable simulated adapter
pub struct SimBoard
{
    model: u16,
    fw_version: String,
    oscillating: u64,
    chip: ChipFn,
    on_power: Option<PowerFn>,
    nak_at: Option<u64>,
    served: u64,
}

impl SimBoard
{
    /// A board where every pin floats: writes are reflected unchanged
    pub fn echo(model: u16) -> Self
    {
        Self::with_chip(model, |mask| mask)
    }

    pub fn with_chip(model: u16, chip: impl FnMut(u64) -> u64 + Send + 'static) -> Self
    {
        Self {
            model: model,
            fw_version: "0.5.1".to_string(),
            oscillating: 0,
            chip: Box::new(chip),
            on_power: None,
            nak_at: None,
            served: 0,
        }
    }

    /// Report the given physical pins as toggling when asked
    pub fn oscillating(mut self, mask: u64) -> Self
    {
        self.oscillating = mask;
        self
    }

    pub fn fw_version(mut self, version: impl Into<String>) -> Self
    {
        self.fw_version = version.into();
        self
    }

    /// Observe power rail transitions
    pub fn on_power(mut self, observer: impl FnMut(bool) + Send + 'static) -> Self
    {
        self.on_power = Some(Box::new(observer));
        self
    }

    /// Answer the `index`th command (1-based) with a NAK instead of a result,
    /// as a flaky link would
    ///
    /// Only that one command is affected; commands before and after it are
    /// served normally.
    pub fn nak_command(mut self, index: u64) -> Self
    {
        self.nak_at = Some(index);
        self
    }

    /// Answer commands on the stream until the peer hangs up
    pub async fn serve<T>(mut self, mut io_handle: T) -> Result<(), std::io::Error>
        where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
    {
        let mut line_buf: Vec<u8> = Vec::with_capacity(64);
        let mut temp_buf = [0u8; 64];

        loop {
            let bytes_read = io_handle.read(&mut temp_buf[..]).await?;
            if bytes_read == 0 {
                return Ok(());
            }
            line_buf.extend_from_slice(&temp_buf[..bytes_read]);

            while let Some(end) = line_buf.iter().position(|byte| *byte == 0x0A) {
                let line: Vec<u8> = line_buf.drain(..=end).collect();
                let line = String::from_utf8_lossy(&line[..end]).trim_end().to_string();
                let response = self.respond(&line);
                io_handle.write_all(response.as_bytes()).await?;
            }
        }
    }

    fn respond(&mut self, line: &str) -> String
    {
        self.served += 1;
        if self.nak_at == Some(self.served) {
            return format!("E injected fault on {:?}\n", line);
        }

        let payload = line.get(1..).unwrap_or("").trim();

        match line.chars().next() {
            Some('W') => match u64::from_str_radix(payload, 16) {
                Ok(mask) => format!("W {:016x}\n", (self.chip)(mask)),
                Err(_) => format!("E bad mask {}\n", payload),
            },
            Some('P') => {
                let on = payload == "1";
                if let Some(observer) = &mut self.on_power {
                    observer(on);
                }
                format!("P {}\n", if on { '1' } else { '0' })
            }
            Some('O') => match u64::from_str_radix(payload, 16) {
                Ok(mask) => format!("O {:016x}\n", self.oscillating & mask),
                Err(_) => format!("E bad mask {}\n", payload),
            },
            Some('M') => format!("M {}\n", self.model),
            Some('V') => format!("V {}\n", self.fw_version),
            _ => format!("E unknown command {:?}\n", line),
        }
    }
}

//! Adapter handle and hardware compatibility gate
//!
//! # Purpose
//! This module defines a handle to a connected dupico adapter which provides
//! the raw probing primitives:
//!   - Driving a physical pin mask and reading back the electrical state
//!   - Switching socket power
//!   - Detecting oscillating pins over one polling window
//!
//! Opening the handle performs a one-time identification handshake (model and
//! firmware version queries) and refuses adapters below the minimum supported
//! hardware revision. Per-chip requirements on top of that are checked when a
//! probing session opens, not here.
//!
//! Creating I/O handles is not done by this library so that you are not
//! restricted to a particular hardware interface. Anything implementing the
//! async read/write traits works: a serial port, a TCP serial bridge, or an
//! in-process simulated board.

use std::{
    error::Error,
    fmt,
    str::FromStr,
    time::Duration,
};
use tokio::io::{ AsyncReadExt, AsyncWriteExt };
use crate::{
    cmd::BoardCmd,
    executor::{ Executor, LinkError, DEFAULT_ROUND_TRIP_TIMEOUT },
};

/// Oldest adapter hardware revision this library knows how to drive
pub const MIN_SUPPORTED_MODEL: u16 = 3;

/// A parsed `major.minor.patch` firmware version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FwVersion
{
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FromStr for FwVersion
{
    type Err = ();

    fn from_str(text: &str) -> Result<Self, Self::Err>
    {
        let mut fields = text.trim().split('.');
        let major = fields.next().ok_or(())?.parse().map_err(|_| ())?;
        let minor = fields.next().ok_or(())?.parse().map_err(|_| ())?;
        let patch = fields.next().ok_or(())?.parse().map_err(|_| ())?;

        if fields.next().is_some() {
            return Err(());
        }

        Ok(Self {
            major: major,
            minor: minor,
            patch: patch,
        })
    }
}

impl fmt::Display for FwVersion
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The connected adapter cannot be used
///
/// All of these are fatal before any probing begins; none of them leaves a
/// usable handle behind.
#[derive(Debug)]
pub enum HardwareError
{
    /// The identification handshake failed at the link level
    Link(LinkError),
    /// The adapter's hardware revision is below what is required
    ModelTooOld { model: u16, required: u16 },
    /// The model query answered with something other than a number
    InvalidModel(String),
    /// The firmware version string did not parse as `major.minor.patch`
    InvalidVersion(String),
}

impl fmt::Display for HardwareError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Link(link_err) => write!(f, "Identification handshake failed. {}", link_err),
            Self::ModelTooOld { model, required } => {
                write!(f, "Adapter model {} does not satisfy requirement {}", model, required)
            }
            Self::InvalidModel(payload) => write!(f, "Unable to interpret model response {:?}", payload),
            Self::InvalidVersion(payload) => write!(f, "Unable to interpret firmware version {:?}", payload),
        }
    }
}

impl Error for HardwareError {}

impl From<LinkError> for HardwareError
{
    fn from(this: LinkError) -> Self
    {
        Self::Link(this)
    }
}

/// Places the low bits of `value` onto an arbitrary ordered subset of pins
///
/// Bit `i` of `value` lands on bit `pins[i] - 1` of the result. Pin numbering
/// is 1-based. This is the adapter-specific sparse placement used for pin
/// lists such as the adapter's always-high pins; the full-topology socket
/// remapping lives on [`IcDefinition`](crate::ic::IcDefinition) instead.
pub fn map_value_to_pins(pins: &[u8], value: u64) -> u64
{
    let mut mask = 0u64;

    for (index, pin) in pins.iter().enumerate() {
        if value & (1u64 << index as u32) != 0 {
            mask |= 1u64 << (*pin as u32 - 1);
        }
    }

    mask
}

/// Inverse of [`map_value_to_pins`]: gathers the bits at the given pin
/// positions back into a dense value
pub fn map_pins_to_value(pins: &[u8], mask: u64) -> u64
{
    let mut value = 0u64;

    for (index, pin) in pins.iter().enumerate() {
        if mask & (1u64 << (*pin as u32 - 1)) != 0 {
            value |= 1u64 << index as u32;
        }
    }

    value
}

/// A connected, identification-checked dupico adapter
pub struct Board<T>
{
    link: Executor<T>,
    model: u16,
    fw_version: FwVersion,
}

impl <T> Board<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    /// Open a handle over an async I/O stream with the default round-trip
    /// timeout
    pub async fn open(io_handle: T) -> Result<Self, HardwareError>
    {
        Self::open_with_timeout(io_handle, DEFAULT_ROUND_TRIP_TIMEOUT).await
    }

    /// Open a handle, bounding every command round-trip by `timeout`
    ///
    /// Queries the adapter's model and firmware version and fails if either
    /// does not parse or the model is older than [`MIN_SUPPORTED_MODEL`].
    pub async fn open_with_timeout(io_handle: T, timeout: Duration) -> Result<Self, HardwareError>
    {
        let mut link = Executor::with(io_handle, timeout);

        let model_payload = link.exec_cmd(BoardCmd::GetModel).await?;
        let model: u16 = model_payload
            .parse()
            .map_err(|_| HardwareError::InvalidModel(model_payload.clone()))?;

        if model < MIN_SUPPORTED_MODEL {
            return Err(HardwareError::ModelTooOld {
                model: model,
                required: MIN_SUPPORTED_MODEL,
            });
        }

        let version_payload = link.exec_cmd(BoardCmd::GetVersion).await?;
        let fw_version: FwVersion = version_payload
            .parse()
            .map_err(|_| HardwareError::InvalidVersion(version_payload.clone()))?;

        log::info!("Adapter model {} connected, firmware {}", model, fw_version);

        Ok(Self {
            link: link,
            model: model,
            fw_version: fw_version,
        })
    }

    /// The adapter hardware revision reported during the handshake
    pub fn model(&self) -> u16
    {
        self.model
    }

    /// The firmware version reported during the handshake
    pub fn fw_version(&self) -> FwVersion
    {
        self.fw_version
    }

    /// Drive the given physical pin mask and return the electrical state read
    /// back from the socket
    pub async fn write_pins(&mut self, mask: u64) -> Result<u64, LinkError>
    {
        let payload = self.link.exec_cmd(BoardCmd::WritePins(mask)).await?;
        parse_mask(payload)
    }

    /// Assert or deassert power to the test socket
    pub async fn set_power(&mut self, on: bool) -> Result<(), LinkError>
    {
        self.link.exec_cmd(BoardCmd::SetPower(on)).await?;
        Ok(())
    }

    /// Return which of the masked physical pins toggled within one polling
    /// window
    pub async fn detect_oscillating_pins(&mut self, mask: u64) -> Result<u64, LinkError>
    {
        let payload = self.link.exec_cmd(BoardCmd::DetectOscillations(mask)).await?;
        parse_mask(payload)
    }

    /// Release the handle and recover the underlying I/O stream
    pub fn into_inner(self) -> T
    {
        self.link.into_inner()
    }
}

fn parse_mask(payload: String) -> Result<u64, LinkError>
{
    u64::from_str_radix(payload.trim(), 16).map_err(|_| LinkError::Garbled(payload))
}

//! IC definition loading from TOML documents
//!
//! The on-disk format mirrors the structure of [`IcDefinition`]: a top-level
//! chip `name`, a `[pinout]` table with the per-side pin counts, the ZIF
//! socket map, and the per-role pin lists, an `[adapter]` table with the
//! always-high pins and optional operator notes, and a `[requirements]`
//! table naming the minimum adapter hardware model.
//!
//! ```toml
//! name = "PAL16L8"
//!
//! [pinout]
//! pins_per_side = [10, 10]
//! ZIF_map = [1, 2, 3, 4, 5, 6, 7, 8, 9, 21, 30, 31, 32, 33, 34, 35, 36, 37, 38, 42]
//! clk_pins = []
//! in_pins = [1, 2, 3, 4, 5, 6, 7, 8, 9, 11]
//! io_pins = [13, 14, 15, 16, 17, 18]
//! o_pins = [12, 19]
//! f_pins = []
//!
//! [adapter]
//! hi_pins = []
//! notes = "Insert with pin 1 at the handle end of the ZIF socket"
//!
//! [requirements]
//! hardware = 3
//! ```

use std::{
    error::Error,
    fmt,
};
use serde::Deserialize;
use crate::ic::{ IcDefinition, TopologyError };

#[derive(Deserialize)]
struct RawDefinition
{
    name: String,
    pinout: RawPinout,
    adapter: RawAdapter,
    requirements: RawRequirements,
}

#[derive(Deserialize)]
struct RawPinout
{
    pins_per_side: Vec<usize>,
    #[serde(rename = "ZIF_map")]
    zif_map: Vec<u8>,
    #[serde(default)]
    clk_pins: Vec<u8>,
    #[serde(default)]
    in_pins: Vec<u8>,
    #[serde(default)]
    io_pins: Vec<u8>,
    #[serde(default)]
    o_pins: Vec<u8>,
    #[serde(default)]
    f_pins: Vec<u8>,
}

#[derive(Deserialize)]
struct RawAdapter
{
    #[serde(default)]
    hi_pins: Vec<u8>,
    notes: Option<String>,
}

#[derive(Deserialize)]
struct RawRequirements
{
    hardware: u16,
}

/// The definition document could not be turned into a usable [`IcDefinition`]
#[derive(Debug)]
pub enum LoadError
{
    /// The document is not well-formed TOML or is missing required keys
    Parse(toml::de::Error),
    /// The document parsed, but describes an invalid topology
    Topology(TopologyError),
}

impl fmt::Display for LoadError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Parse(toml_err) => write!(f, "Unable to parse definition. {}", toml_err),
            Self::Topology(topo_err) => write!(f, "Definition is not a valid topology. {}", topo_err),
        }
    }
}

impl Error for LoadError {}

impl From<toml::de::Error> for LoadError
{
    fn from(this: toml::de::Error) -> Self
    {
        Self::Parse(this)
    }
}

impl From<TopologyError> for LoadError
{
    fn from(this: TopologyError) -> Self
    {
        Self::Topology(this)
    }
}

/// Parse a TOML definition document into a validated [`IcDefinition`]
pub fn from_str(text: &str) -> Result<IcDefinition, LoadError>
{
    let raw: RawDefinition = toml::from_str(text)?;

    let mut builder = IcDefinition::builder(raw.name)
        .pins_per_side(raw.pinout.pins_per_side)
        .zif_map(raw.pinout.zif_map)
        .clock_pins(raw.pinout.clk_pins)
        .input_pins(raw.pinout.in_pins)
        .io_pins(raw.pinout.io_pins)
        .output_pins(raw.pinout.o_pins)
        .free_pins(raw.pinout.f_pins)
        .adapter_hi_pins(raw.adapter.hi_pins)
        .hw_model(raw.requirements.hardware);

    if let Some(notes) = raw.adapter.notes {
        builder = builder.adapter_notes(notes);
    }

    Ok(builder.build()?)
}

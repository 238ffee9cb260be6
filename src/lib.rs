//! Asynchronous control and pin-level probing of ICs seated in a dupico test
//! adapter
//!
//! # Purpose
//! This library drives an external adapter board that seats an unknown or
//! known logic chip in a ZIF socket and exposes raw write/read/power
//! primitives over a serial line. On top of those primitives it provides:
//!
//!   - [`ic::IcDefinition`]: a validated description of one chip -- package
//!     shape, the socket (ZIF) remapping table, and per-pin roles -- together
//!     with the pure logical/physical pin mask conversions.
//!   - [`layout`]: the grid geometry used to lay a chip's pin controls out
//!     around its package outline, for whatever shell renders them.
//!   - [`probe::ProbeSession`]: the interactive engine that applies operator
//!     values and classifies each pin as driven, floating (Hi-Z), or
//!     oscillating by differential perturbation.
//!
//! # I/O handles
//! Like the adapter handle itself, nothing here opens serial ports. Any
//! stream implementing tokio's async read/write traits works, which is also
//! how the [`sim::SimBoard`] plugs in for tests and offline use:
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use tokio_serial::SerialPortBuilderExt;
//!
//! let port = tokio_serial::new("/dev/ttyACM0", 115_200).open_native_async()?;
//! let board = peepico::Board::open(port).await?;
//! let definition = peepico::loader::from_str(&std::fs::read_to_string("pal16l8.toml")?)?;
//!
//! let mut session = peepico::ProbeSession::open(board, definition, true, &[]).await?;
//! session.set_pin(2, true)?;
//! let snapshot = session.exec(peepico::ProbeCmd::Apply).await?;
//! println!("pin 12 reads {}", snapshot.pin_state(12));
//! # Ok(())
//! # }
//! ```
//!
//! # Cancel Safety
//! The probing RPCs are not cancel safe: each one is a chain of write/read
//! round-trips, and cancelling between a write and its response leaves the
//! line misaligned. Closing the session is the supported way to stop early.

pub mod board;
pub mod cmd;
pub mod executor;
pub mod ic;
pub mod layout;
pub mod loader;
pub mod probe;
pub mod sim;

pub use board::{ Board, FwVersion, HardwareError, MIN_SUPPORTED_MODEL };
pub use executor::LinkError;
pub use ic::{ IcDefinition, PinRole, TopologyError };
pub use layout::{ grid_size, pin_position, GridElement, LayoutError };
pub use probe::{ PinState, ProbeCmd, ProbeError, ProbeSession, ProbeSnapshot };

//! Interactive probing session: drive pins, read back, classify
//!
//! # Purpose
//! A [`ProbeSession`] owns a connected [`Board`] and one [`IcDefinition`] and
//! turns operator commands into write/read round-trips that classify every
//! pin as driven high, driven low, floating (Hi-Z), or oscillating.
//!
//! # Hi-Z detection
//! An output pin that nothing drives will read back whatever the adapter
//! pulls it to. The session finds such pins by perturbation: starting from a
//! baseline read, each candidate pin is driven to the opposite level and the
//! socket is read again.
//!
//!   - If the only bit that changed is the perturbed pin itself, the chip is
//!     not driving it: the pin is floating.
//!   - If nothing changed, the chip is actively driving the pin.
//!   - If *other* bits changed too, the perturbation had side effects: the
//!     pin is functionally coupled (miswired, or really an input or feedback
//!     path) and is permanently dropped from the candidate list. It is never
//!     retried, in this round or any later one.
//!
//! The baseline is restored after each candidate so the checks stay
//! independent of ordering. Pruning decisions for a round are committed only
//! once the whole round finishes without a link failure; a failed round-trip
//! aborts the command and leaves the candidate list as the previous round
//! left it.
//!
//! # Concurrency
//! Everything is sequential request/response over the exclusively owned
//! adapter link. Commands execute strictly in the order they are issued;
//! there is no queuing, batching, or retrying in here. Closing the session
//! is the only cancellation primitive.

use std::{
    error::Error,
    fmt,
    time::Duration,
};
use tokio::io::{ AsyncReadExt, AsyncWriteExt };
use crate::{
    board::{ map_value_to_pins, Board, HardwareError },
    executor::LinkError,
    ic::{ pin_bit, IcDefinition },
};

/// Settle time after each power rail transition during a power cycle
const POWER_SETTLE: Duration = Duration::from_millis(250);

/// Operator commands accepted by [`ProbeSession::exec`]
///
/// Every command re-applies the session's requested value and re-classifies
/// the pins before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCmd
{
    /// Drive the currently requested value and classify
    Apply,
    /// Zero all operator-settable bits, then drive and classify
    Clear,
    /// Drop and restore socket power with a settle delay on each transition
    PowerCycle,
    /// Pulse one rising edge on a clock-designated pin
    ClockPin(u8),
}

/// Classification of one pin after a probing cycle
///
/// `HiZ` takes precedence over `Oscillating`, which takes precedence over the
/// driven levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState
{
    HiZ,
    Oscillating,
    High,
    Low,
}

impl fmt::Display for PinState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::HiZ => f.write_str("Z"),
            Self::Oscillating => f.write_str("~"),
            Self::High => f.write_str("H"),
            Self::Low => f.write_str("L"),
        }
    }
}

/// Immutable result of one probing cycle
///
/// All masks are logical-pin-indexed: bit `i` belongs to logical pin `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSnapshot
{
    reading: u64,
    hiz: u64,
    oscillating: u64,
    total_pins: u8,
}

impl ProbeSnapshot
{
    fn empty(total_pins: u8) -> Self
    {
        Self {
            reading: 0,
            hiz: 0,
            oscillating: 0,
            total_pins: total_pins,
        }
    }

    /// The baseline electrical read-back
    pub fn reading(&self) -> u64
    {
        self.reading
    }

    /// Pins classified as floating
    pub fn hiz_mask(&self) -> u64
    {
        self.hiz
    }

    /// Pins that toggled within the polling window
    pub fn oscillation_mask(&self) -> u64
    {
        self.oscillating
    }

    /// Classification of a 1-based logical pin
    ///
    /// # Panics
    /// Panics if `pin` is zero or beyond the package.
    pub fn pin_state(&self, pin: u8) -> PinState
    {
        assert!(pin >= 1 && pin <= self.total_pins);

        let bit = pin_bit(pin);
        if self.hiz & bit != 0 {
            PinState::HiZ
        }
        else if self.oscillating & bit != 0 {
            PinState::Oscillating
        }
        else if self.reading & bit != 0 {
            PinState::High
        }
        else {
            PinState::Low
        }
    }

    /// Classification of every pin, indexed by logical pin number minus one
    pub fn states(&self) -> Vec<PinState>
    {
        (1..=self.total_pins).map(|pin| self.pin_state(pin)).collect()
    }
}

/// A probing command failed
///
/// Link failures abort the in-flight command only; the session stays open and
/// later commands may still succeed.
#[derive(Debug)]
pub enum ProbeError
{
    /// A write/read round-trip with the adapter failed
    Link(LinkError),
    /// `ClockPin` named a pin the definition does not designate as a clock
    NotAClockPin(u8),
    /// An operator toggle named a pin outside the package
    PinOutOfRange { pin: u8, max: u8 },
}

impl fmt::Display for ProbeError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Link(link_err) => write!(f, "Probing round-trip failed. {}", link_err),
            Self::NotAClockPin(pin) => write!(f, "Pin {} is not designated as a clock", pin),
            Self::PinOutOfRange { pin, max } => {
                write!(f, "Pin {} does not exist on this package. Max pin is {}", pin, max)
            }
        }
    }
}

impl Error for ProbeError {}

impl From<LinkError> for ProbeError
{
    fn from(this: LinkError) -> Self
    {
        Self::Link(this)
    }
}

/// One interactive probing session against a connected adapter
pub struct ProbeSession<T>
{
    board: Board<T>,
    definition: IcDefinition,
    requested: u64,
    check_hiz: bool,
    hiz_candidates: Vec<u8>,
    last: ProbeSnapshot,
}

impl <T> ProbeSession<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    /// Open a session for one chip on an already-identified board
    ///
    /// Checks the definition's hardware requirement against the board's
    /// model, asserts the adapter's always-high pins, and powers the socket
    /// on. When `check_hiz` is set, the Hi-Z candidate list is seeded from
    /// the definition's output and bidirectional pins minus `skip_hiz`; it
    /// only ever shrinks from there.
    pub async fn open(
        mut board: Board<T>,
        definition: IcDefinition,
        check_hiz: bool,
        skip_hiz: &[u8],
    ) -> Result<Self, HardwareError>
    {
        if definition.hw_model() > board.model() {
            return Err(HardwareError::ModelTooOld {
                model: board.model(),
                required: definition.hw_model(),
            });
        }

        let mut candidates: Vec<u8> = definition
            .output_pins()
            .iter()
            .chain(definition.io_pins().iter())
            .copied()
            .filter(|pin| !skip_hiz.contains(pin))
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        log::info!(
            "Opening probe session for {} ({} pins, {} Hi-Z candidates)",
            definition.name(),
            definition.total_pins(),
            if check_hiz { candidates.len() } else { 0 }
        );

        // hold the adapter's required pins high before powering the socket
        let hi_mask = map_value_to_pins(definition.adapter_hi_pins(), u64::MAX);
        board
            .write_pins(definition.logical_to_physical(hi_mask))
            .await?;
        board.set_power(true).await?;

        let total_pins = definition.total_pins();

        Ok(Self {
            board: board,
            definition: definition,
            requested: 0,
            check_hiz: check_hiz,
            hiz_candidates: candidates,
            last: ProbeSnapshot::empty(total_pins),
        })
    }

    pub fn definition(&self) -> &IcDefinition
    {
        &self.definition
    }

    /// The operator's requested drive value, before the always-high pins are
    /// OR-ed in
    pub fn requested_value(&self) -> u64
    {
        self.requested
    }

    /// Pins still considered possibly-floating outputs
    pub fn hiz_candidates(&self) -> &[u8]
    {
        &self.hiz_candidates
    }

    /// Result of the most recent probing cycle
    pub fn last_snapshot(&self) -> ProbeSnapshot
    {
        self.last
    }

    /// Set or clear the operator toggle for one 1-based logical pin
    pub fn set_pin(&mut self, pin: u8, high: bool) -> Result<(), ProbeError>
    {
        if pin < 1 || pin > self.definition.total_pins() {
            return Err(ProbeError::PinOutOfRange {
                pin: pin,
                max: self.definition.total_pins(),
            });
        }

        if high {
            self.requested |= pin_bit(pin);
        }
        else {
            self.requested &= !pin_bit(pin);
        }

        Ok(())
    }

    /// Execute one operator command and return the resulting classification
    pub async fn exec(&mut self, cmd: ProbeCmd) -> Result<ProbeSnapshot, ProbeError>
    {
        log::debug!("Executing {:?}", cmd);

        match cmd {
            ProbeCmd::Apply => {}
            ProbeCmd::Clear => {
                self.requested = 0;
            }
            ProbeCmd::PowerCycle => {
                let driven = self.drive_value();
                self.write_logical(driven).await?;

                self.board.set_power(false).await?;
                tokio::time::sleep(POWER_SETTLE).await;
                self.board.set_power(true).await?;
                tokio::time::sleep(POWER_SETTLE).await;
            }
            ProbeCmd::ClockPin(pin) => {
                if !self.definition.is_clock(pin) {
                    return Err(ProbeError::NotAClockPin(pin));
                }

                // one rising edge: low, high, then back to the baseline below
                self.requested &= !pin_bit(pin);
                let baseline = self.drive_value();
                self.write_logical(baseline).await?;
                self.write_logical(baseline | pin_bit(pin)).await?;
            }
        }

        self.run_cycle().await
    }

    /// Power the socket down and release the board
    pub async fn shutdown(mut self) -> Result<Board<T>, ProbeError>
    {
        self.board.write_pins(0).await?;
        self.board.set_power(false).await?;
        Ok(self.board)
    }

    /// The value actually driven: operator toggles plus the adapter's
    /// always-high pins
    fn drive_value(&self) -> u64
    {
        self.requested | map_value_to_pins(self.definition.adapter_hi_pins(), u64::MAX)
    }

    async fn write_logical(&mut self, logical: u64) -> Result<u64, LinkError>
    {
        let physical = self.definition.logical_to_physical(logical);
        let readback = self.board.write_pins(physical).await?;
        Ok(self.definition.physical_to_logical(readback))
    }

    /// Apply, classify Hi-Z, classify oscillation, snapshot
    async fn run_cycle(&mut self) -> Result<ProbeSnapshot, ProbeError>
    {
        let driven = self.drive_value();
        let baseline = self.write_logical(driven).await?;

        let hiz = if self.check_hiz {
            self.classify_hiz(driven, baseline).await?
        }
        else {
            0
        };

        let osc_physical = self
            .board
            .detect_oscillating_pins(self.definition.logical_to_physical(self.definition.logical_mask()))
            .await?;
        let oscillating = self.definition.physical_to_logical(osc_physical);

        let snapshot = ProbeSnapshot {
            reading: baseline,
            hiz: hiz,
            oscillating: oscillating,
            total_pins: self.definition.total_pins(),
        };
        self.last = snapshot;

        Ok(snapshot)
    }

    /// Perturb each candidate pin in turn and compare against the baseline
    ///
    /// Returns the Hi-Z mask. Candidates whose perturbation disturbed other
    /// pins are pruned, but only once the whole round has completed; an early
    /// link failure leaves the candidate list untouched.
    async fn classify_hiz(&mut self, driven: u64, baseline: u64) -> Result<u64, ProbeError>
    {
        let mut hiz = 0u64;
        let mut pruned: Vec<u8> = Vec::new();

        for pin in self.hiz_candidates.clone() {
            let bit = pin_bit(pin);
            let observed = self.write_logical(driven ^ bit).await?;
            // restore the baseline so the next check starts clean
            self.write_logical(driven).await?;

            let diff = observed ^ baseline;
            if diff == bit {
                hiz |= bit;
            }
            else if diff != 0 {
                log::debug!(
                    "Pin {} perturbation disturbed mask {:#018x}; dropping candidate",
                    pin,
                    diff & !bit
                );
                pruned.push(pin);
            }
        }

        if !pruned.is_empty() {
            self.hiz_candidates.retain(|pin| !pruned.contains(pin));
        }

        Ok(hiz)
    }
}

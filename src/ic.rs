//! IC definition: package topology, socket remapping, and pin roles
//!
//! An [`IcDefinition`] is an immutable description of one chip seated in the
//! adapter: how many pins sit on each package side, which ZIF socket position
//! each logical pin lands on, and what role every pin plays. All validation
//! happens once at construction; afterwards the logical/physical conversions
//! are pure total functions with no failure mode.

use std::{
    error::Error,
    fmt,
};

/// ZIF socket position hardwired to ground on the adapter
pub const ZIF_GND_PIN: u8 = 21;
/// ZIF socket position hardwired to the power rail on the adapter
pub const ZIF_PWR_PIN: u8 = 42;

/// Widest socket the command protocol can address
const MAX_ZIF_PINS: usize = 64;

const SUPPORTED_NUM_SIDES: [usize; 3] = [1, 2, 4];

/// The bit a 1-based logical or physical pin number occupies in a mask
pub fn pin_bit(pin: u8) -> u64
{
    1u64 << (pin as u32 - 1)
}

/// What a logical pin does, decided once at definition construction
///
/// Clock capability is an orthogonal flag, not a role; see
/// [`IcDefinition::is_clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole
{
    Input,
    Output,
    /// Bidirectional pin
    Io,
    /// Unused / no-connect pin
    Free,
    /// Unlabeled pin sitting on the ZIF ground position
    Ground,
    /// Unlabeled pin sitting on the ZIF power position
    Power,
}

/// A malformed IC definition, rejected before any probing can begin
#[derive(Debug, PartialEq, Eq)]
pub enum TopologyError
{
    /// `pins_per_side` had a length other than 1, 2, or 4
    UnsupportedSideCount(usize),
    /// The socket map length does not match the package pin count
    PinCountMismatch { mapped: usize, package: usize },
    /// The package has more pins than the socket can address
    TooManyPins(usize),
    /// A socket map entry points outside the valid physical range
    ZifIndexOutOfRange { pin: u8, zif: u8 },
    /// Two logical pins map to the same socket position
    DuplicateZifIndex { zif: u8 },
    /// A role list names a pin the package does not have
    PinOutOfRange { pin: u8, max: u8 },
    /// A pin appears in more than one of the input/io/output/free lists
    ConflictingRoles { pin: u8 },
    /// A pin has no role and does not sit on a power or ground position
    UnclassifiedPin { pin: u8 },
}

impl fmt::Display for TopologyError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::UnsupportedSideCount(sides) => {
                write!(f, "Number of sides {} is not supported", sides)
            }
            Self::PinCountMismatch { mapped, package } => {
                write!(f, "Socket map covers {} pins but the package has {}", mapped, package)
            }
            Self::TooManyPins(pins) => {
                write!(f, "Package has {} pins; the socket addresses at most {}", pins, MAX_ZIF_PINS)
            }
            Self::ZifIndexOutOfRange { pin, zif } => {
                write!(f, "Pin {} maps to socket position {} outside 1..={}", pin, zif, MAX_ZIF_PINS)
            }
            Self::DuplicateZifIndex { zif } => {
                write!(f, "Socket position {} is mapped by more than one pin", zif)
            }
            Self::PinOutOfRange { pin, max } => {
                write!(f, "Pin structure does not fit pin number {}. Max pin is {}", pin, max)
            }
            Self::ConflictingRoles { pin } => {
                write!(f, "Pin {} is listed under more than one role", pin)
            }
            Self::UnclassifiedPin { pin } => {
                write!(f, "Pin {} has no role and is not on a power or ground position", pin)
            }
        }
    }
}

impl Error for TopologyError {}

/// Immutable description of one IC and its seating in the adapter socket
#[derive(Debug, Clone)]
pub struct IcDefinition
{
    name: String,
    pins_per_side: Vec<usize>,
    zif_map: Vec<u8>,
    clk_pins: Vec<u8>,
    io_pins: Vec<u8>,
    o_pins: Vec<u8>,
    adapter_hi_pins: Vec<u8>,
    hw_model: u16,
    adapter_notes: Option<String>,
    roles: Vec<PinRole>,
    pin_names: Vec<String>,
}

/// Builder for [`IcDefinition`]
///
/// All lists take 1-based logical pin numbers. Validation happens in
/// [`build`](Self::build), never earlier.
pub struct IcDefinitionBuilder
{
    name: String,
    pins_per_side: Vec<usize>,
    zif_map: Vec<u8>,
    clk_pins: Vec<u8>,
    in_pins: Vec<u8>,
    io_pins: Vec<u8>,
    o_pins: Vec<u8>,
    f_pins: Vec<u8>,
    adapter_hi_pins: Vec<u8>,
    hw_model: u16,
    adapter_notes: Option<String>,
}

impl IcDefinitionBuilder
{
    pub fn pins_per_side(mut self, counts: Vec<usize>) -> Self
    {
        self.pins_per_side = counts;
        self
    }

    /// The socket (ZIF) map: entry `i` is the 1-based physical position of
    /// logical pin `i + 1`
    pub fn zif_map(mut self, map: Vec<u8>) -> Self
    {
        self.zif_map = map;
        self
    }

    pub fn clock_pins(mut self, pins: Vec<u8>) -> Self
    {
        self.clk_pins = pins;
        self
    }

    pub fn input_pins(mut self, pins: Vec<u8>) -> Self
    {
        self.in_pins = pins;
        self
    }

    pub fn io_pins(mut self, pins: Vec<u8>) -> Self
    {
        self.io_pins = pins;
        self
    }

    pub fn output_pins(mut self, pins: Vec<u8>) -> Self
    {
        self.o_pins = pins;
        self
    }

    pub fn free_pins(mut self, pins: Vec<u8>) -> Self
    {
        self.f_pins = pins;
        self
    }

    /// Pins the adapter must hold high regardless of operator input
    pub fn adapter_hi_pins(mut self, pins: Vec<u8>) -> Self
    {
        self.adapter_hi_pins = pins;
        self
    }

    /// Minimum adapter hardware revision this chip's wiring needs
    pub fn hw_model(mut self, model: u16) -> Self
    {
        self.hw_model = model;
        self
    }

    pub fn adapter_notes(mut self, notes: impl Into<String>) -> Self
    {
        self.adapter_notes = Some(notes.into());
        self
    }

    pub fn build(self) -> Result<IcDefinition, TopologyError>
    {
        let sides = self.pins_per_side.len();
        if !SUPPORTED_NUM_SIDES.contains(&sides) {
            return Err(TopologyError::UnsupportedSideCount(sides));
        }

        let total: usize = self.pins_per_side.iter().sum();
        if total > MAX_ZIF_PINS {
            return Err(TopologyError::TooManyPins(total));
        }
        if self.zif_map.len() != total {
            return Err(TopologyError::PinCountMismatch {
                mapped: self.zif_map.len(),
                package: total,
            });
        }

        let mut seen_zif = 0u64;
        for (index, zif) in self.zif_map.iter().enumerate() {
            if *zif == 0 || *zif as usize > MAX_ZIF_PINS {
                return Err(TopologyError::ZifIndexOutOfRange {
                    pin: index as u8 + 1,
                    zif: *zif,
                });
            }
            if seen_zif & pin_bit(*zif) != 0 {
                return Err(TopologyError::DuplicateZifIndex { zif: *zif });
            }
            seen_zif |= pin_bit(*zif);
        }

        // tag every pin with exactly one role
        let mut roles: Vec<Option<PinRole>> = vec![None; total];
        let role_lists = [
            (&self.in_pins, PinRole::Input),
            (&self.io_pins, PinRole::Io),
            (&self.o_pins, PinRole::Output),
            (&self.f_pins, PinRole::Free),
        ];

        for (pins, role) in role_lists {
            for pin in pins {
                if *pin < 1 || *pin as usize > total {
                    return Err(TopologyError::PinOutOfRange {
                        pin: *pin,
                        max: total as u8,
                    });
                }

                let slot = &mut roles[*pin as usize - 1];
                if slot.is_some() {
                    return Err(TopologyError::ConflictingRoles { pin: *pin });
                }
                *slot = Some(role);
            }
        }

        let roles: Vec<PinRole> = roles
            .into_iter()
            .enumerate()
            .map(|(index, role)| match role {
                Some(role) => Ok(role),
                None => match self.zif_map[index] {
                    ZIF_GND_PIN => Ok(PinRole::Ground),
                    ZIF_PWR_PIN => Ok(PinRole::Power),
                    _ => Err(TopologyError::UnclassifiedPin { pin: index as u8 + 1 }),
                },
            })
            .collect::<Result<_, _>>()?;

        for pin in self.clk_pins.iter().chain(self.adapter_hi_pins.iter()) {
            if *pin < 1 || *pin as usize > total {
                return Err(TopologyError::PinOutOfRange {
                    pin: *pin,
                    max: total as u8,
                });
            }
        }

        let pin_names = build_pin_names(&roles, &self.clk_pins);

        Ok(IcDefinition {
            name: self.name,
            pins_per_side: self.pins_per_side,
            zif_map: self.zif_map,
            clk_pins: self.clk_pins,
            io_pins: self.io_pins,
            o_pins: self.o_pins,
            adapter_hi_pins: self.adapter_hi_pins,
            hw_model: self.hw_model,
            adapter_notes: self.adapter_notes,
            roles: roles,
            pin_names: pin_names,
        })
    }
}

/// Display labels per pin: `I<n>`, `O<n>`, `IO<n>`, a `/CLK` suffix for
/// clock-capable pins, and `G`/`P` for the ground and power positions
fn build_pin_names(roles: &[PinRole], clk_pins: &[u8]) -> Vec<String>
{
    let mut names: Vec<String> = roles
        .iter()
        .enumerate()
        .map(|(index, role)| {
            let pin = index + 1;
            match role {
                PinRole::Input => format!("I{}", pin),
                PinRole::Output => format!("O{}", pin),
                PinRole::Io => format!("IO{}", pin),
                PinRole::Free => String::new(),
                PinRole::Ground => "G".to_string(),
                PinRole::Power => "P".to_string(),
            }
        })
        .collect();

    for pin in clk_pins {
        let name = &mut names[*pin as usize - 1];
        if !name.is_empty() {
            name.push_str("/CLK");
        }
    }

    names
}

impl IcDefinition
{
    pub fn builder(name: impl Into<String>) -> IcDefinitionBuilder
    {
        IcDefinitionBuilder {
            name: name.into(),
            pins_per_side: Vec::new(),
            zif_map: Vec::new(),
            clk_pins: Vec::new(),
            in_pins: Vec::new(),
            io_pins: Vec::new(),
            o_pins: Vec::new(),
            f_pins: Vec::new(),
            adapter_hi_pins: Vec::new(),
            hw_model: 0,
            adapter_notes: None,
        }
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn pins_per_side(&self) -> &[usize]
    {
        &self.pins_per_side
    }

    pub fn zif_map(&self) -> &[u8]
    {
        &self.zif_map
    }

    pub fn total_pins(&self) -> u8
    {
        self.zif_map.len() as u8
    }

    /// Mask with one bit set per logical pin of the package
    pub fn logical_mask(&self) -> u64
    {
        if self.zif_map.len() == MAX_ZIF_PINS {
            u64::MAX
        }
        else {
            (1u64 << self.zif_map.len() as u32) - 1
        }
    }

    /// Role of a 1-based logical pin
    ///
    /// # Panics
    /// Panics if `pin` is outside the package.
    pub fn role(&self, pin: u8) -> PinRole
    {
        self.roles[pin as usize - 1]
    }

    pub fn is_clock(&self, pin: u8) -> bool
    {
        self.clk_pins.contains(&pin)
    }

    pub fn clock_pins(&self) -> &[u8]
    {
        &self.clk_pins
    }

    pub fn io_pins(&self) -> &[u8]
    {
        &self.io_pins
    }

    pub fn output_pins(&self) -> &[u8]
    {
        &self.o_pins
    }

    pub fn adapter_hi_pins(&self) -> &[u8]
    {
        &self.adapter_hi_pins
    }

    pub fn hw_model(&self) -> u16
    {
        self.hw_model
    }

    pub fn adapter_notes(&self) -> Option<&str>
    {
        self.adapter_notes.as_deref()
    }

    /// Display label of a 1-based logical pin
    pub fn pin_name(&self, pin: u8) -> &str
    {
        &self.pin_names[pin as usize - 1]
    }

    /// Scatter a logical pin mask onto the physical socket positions
    ///
    /// Bit `i` of `logical` lands on bit `zif_map[i] - 1` of the result.
    pub fn logical_to_physical(&self, logical: u64) -> u64
    {
        let mut physical = 0u64;

        for (index, zif) in self.zif_map.iter().enumerate() {
            if logical & (1u64 << index as u32) != 0 {
                physical |= pin_bit(*zif);
            }
        }

        physical
    }

    /// Gather physical socket bits back into the logical pin ordering
    ///
    /// Exact inverse of [`logical_to_physical`](Self::logical_to_physical)
    /// for any value within the package's pin range.
    pub fn physical_to_logical(&self, physical: u64) -> u64
    {
        let mut logical = 0u64;

        for (index, zif) in self.zif_map.iter().enumerate() {
            if physical & pin_bit(*zif) != 0 {
                logical |= 1u64 << index as u32;
            }
        }

        logical
    }
}

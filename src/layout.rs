//! Package outline layout: grid sizing and per-pin cell placement
//!
//! Pure geometry, consulted by whatever shell renders the probing session.
//! Coordinates are `(column, row)` cells in a grid wrapped around the package
//! outline. Each pin owns three adjacent cells, one per [`GridElement`],
//! offset along the side's stacking axis so that one placement rule serves
//! the numeric label, the signal-state label, and the interactive control.

use std::{
    error::Error,
    fmt,
};

/// Which of a pin's three cells is being placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridElement
{
    /// The pin's signal-state / name label; sits on the anchor cell
    Label,
    /// The interactive control, one cell inward from the label
    Control,
    /// The numeric pin label, two cells inward
    PinNumber,
}

impl GridElement
{
    fn stack_offset(&self) -> usize
    {
        match self {
            Self::Label => 0,
            Self::Control => 1,
            Self::PinNumber => 2,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LayoutError
{
    /// `pins_per_side` had a length other than 1, 2, or 4
    UnsupportedShape(usize),
    /// The requested pin number does not exist on the package
    PinOutOfRange { pin: u8, max: u8 },
}

impl fmt::Display for LayoutError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::UnsupportedShape(sides) => {
                write!(f, "Number of sides {} is not supported", sides)
            }
            Self::PinOutOfRange { pin, max } => {
                write!(f, "Pin structure does not fit pin number {}. Max pin is {}", pin, max)
            }
        }
    }
}

impl Error for LayoutError {}

/// Grid dimensions `(width, height)` for a package outline
///
/// Single-row packages get a fixed 4-column strip, dual in-line packages an
/// 8-column strip, and quad packages a frame with a 3-cell border on every
/// edge. For quads, even positions in `pins_per_side` are the vertical
/// left/right sides and odd positions the horizontal top/bottom sides; the
/// walk order is left, bottom, right, top.
pub fn grid_size(pins_per_side: &[usize]) -> Result<(usize, usize), LayoutError>
{
    match pins_per_side {
        [count] => Ok((4, count + 2)),
        [left, right] => Ok((8, left.max(right) + 2)),
        [left, bottom, right, top] => {
            Ok((bottom.max(top) + 6, left.max(right) + 6))
        }
        _ => Err(LayoutError::UnsupportedShape(pins_per_side.len())),
    }
}

/// Grid cell `(column, row)` of one element of a pin's control group
///
/// `pin` is 1-based and validated against the package before rotation.
/// `rot_shift` renumbers the pins around the outline prior to placement,
/// wrapping within `[1, total]`; negative shifts rotate the other way. The
/// placement itself walks each side monotonically so that consecutive pins
/// trace a continuous loop around the outline.
pub fn pin_position(
    pin: u8,
    element: GridElement,
    pins_per_side: &[usize],
    rot_shift: i32,
) -> Result<(usize, usize), LayoutError>
{
    let (grid_w, grid_h) = grid_size(pins_per_side)?;
    let total: usize = pins_per_side.iter().sum();

    if pin < 1 || pin as usize > total {
        return Err(LayoutError::PinOutOfRange {
            pin: pin,
            max: total as u8,
        });
    }

    // rotation is a pure renumbering before placement
    let pin = ((pin as i32 - 1 + rot_shift).rem_euclid(total as i32)) as usize + 1;
    let shift = element.stack_offset();

    match pins_per_side {
        [_] => Ok((1 + shift, pin)),
        [left, _] => {
            if pin > *left {
                // right side, walked bottom to top
                Ok((5 + shift, (grid_h - 1) - (pin - left)))
            }
            else {
                Ok((2 - shift, pin))
            }
        }
        [left, bottom, right, _] => {
            if pin > left + bottom + right {
                // top side, walked right to left
                let top_pin = pin - left - bottom - right;
                Ok(((grid_w - 3) - top_pin, 2 - shift))
            }
            else if pin > left + bottom {
                // right side, walked bottom to top
                let right_pin = pin - left - bottom;
                Ok((grid_w - 3 + shift, (grid_h - 3) - right_pin))
            }
            else if pin > *left {
                let bottom_pin = pin - left;
                Ok((2 + bottom_pin, left + 3 + shift))
            }
            else {
                Ok((2 - shift, 2 + pin))
            }
        }
        _ => Err(LayoutError::UnsupportedShape(pins_per_side.len())),
    }
}

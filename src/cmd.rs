//! Adapter command definition and serialization

use std::fmt;

/// Commands understood by the dupico adapter board
///
/// The board speaks a line-oriented ASCII protocol: a single command letter,
/// optionally followed by a space and a payload, terminated by `LF`. Pin
/// masks travel as 16 lowercase hex digits so that the full 64-bit socket
/// range fits in a fixed-width field.
///
/// A well-formed response echoes the command letter followed by the result
/// payload. A line starting with `E` is the board's negative acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardCmd
{
    /// Drive the given physical pin mask and read back the electrical state
    /// of every pin
    ///
    /// Command: `W <16 hex digits>`
    WritePins(u64),
    /// Assert or deassert power to the test socket
    ///
    /// Command: `P <1|0>`
    SetPower(bool),
    /// Watch the masked physical pins for one polling window and report which
    /// of them toggled
    ///
    /// Command: `O <16 hex digits>`
    DetectOscillations(u64),
    /// Query the adapter hardware model number
    ///
    /// Command: `M`
    GetModel,
    /// Query the firmware version string
    ///
    /// Command: `V`
    GetVersion,
}

impl BoardCmd
{
    /// The letter a well-formed response to this command starts with
    pub fn response_tag(&self) -> char
    {
        match self {
            Self::WritePins(_) => 'W',
            Self::SetPower(_) => 'P',
            Self::DetectOscillations(_) => 'O',
            Self::GetModel => 'M',
            Self::GetVersion => 'V',
        }
    }
}

impl fmt::Display for BoardCmd
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::WritePins(mask) => write!(f, "W {:016x}", mask),
            Self::SetPower(on) => write!(f, "P {}", if *on { '1' } else { '0' }),
            Self::DetectOscillations(mask) => write!(f, "O {:016x}", mask),
            Self::GetModel => write!(f, "M"),
            Self::GetVersion => write!(f, "V"),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::BoardCmd;

    #[test]
    fn serialize_write_pins()
    {
        assert_eq!(&format!("{}", BoardCmd::WritePins(0)), "W 0000000000000000");
        assert_eq!(&format!("{}", BoardCmd::WritePins(0xDEAD_BEEF)), "W 00000000deadbeef");
        assert_eq!(&format!("{}", BoardCmd::WritePins(u64::MAX)), "W ffffffffffffffff");
    }

    #[test]
    fn serialize_power()
    {
        assert_eq!(&format!("{}", BoardCmd::SetPower(true)), "P 1");
        assert_eq!(&format!("{}", BoardCmd::SetPower(false)), "P 0");
    }

    #[test]
    fn serialize_queries()
    {
        assert_eq!(&format!("{}", BoardCmd::DetectOscillations(0x0F0F)), "O 0000000000000f0f");
        assert_eq!(&format!("{}", BoardCmd::GetModel), "M");
        assert_eq!(&format!("{}", BoardCmd::GetVersion), "V");
    }

    #[test]
    fn response_tags_match_command_letters()
    {
        for cmd in [
            BoardCmd::WritePins(1),
            BoardCmd::SetPower(true),
            BoardCmd::DetectOscillations(1),
            BoardCmd::GetModel,
            BoardCmd::GetVersion,
        ] {
            let serialized = format!("{}", cmd);
            assert!(serialized.starts_with(cmd.response_tag()));
        }
    }
}

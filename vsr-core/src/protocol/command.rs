//! VSR command tags carried in the transport header.

/// Protocol command tag. Values `0x20..0x24` are reserved for edge/client
/// traffic that the core forwards opaquely rather than interprets.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Prepare = 0x01,
    PrepareOk = 0x02,
    Commit = 0x03,
    StartViewChange = 0x04,
    DoViewChange = 0x05,
    StartView = 0x06,
}

impl Command {
    /// Lowest tag value reserved for edge/client traffic the core does not
    /// interpret (forwarded opaquely per the transport contract).
    pub const EDGE_TAG_MIN: u8 = 0x20;
    /// Highest tag value reserved for edge/client traffic.
    pub const EDGE_TAG_MAX: u8 = 0x24;
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Command::Prepare),
            0x02 => Ok(Command::PrepareOk),
            0x03 => Ok(Command::Commit),
            0x04 => Ok(Command::StartViewChange),
            0x05 => Ok(Command::DoViewChange),
            0x06 => Ok(Command::StartView),
            _ => Err(value),
        }
    }
}

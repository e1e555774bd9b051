use snafu::Snafu;

/// Error taxonomy shared by every layer of the daemon.
///
/// The display strings double as the error codes sent back to clients,
/// so they must stay stable.
#[derive(Debug, Snafu, Clone, Copy, PartialEq, Eq)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    /// A SYN symbol interrupted an ongoing frame.
    #[snafu(display("ERR: SYN received"))]
    Syn,
    /// The device signalled end of input.
    #[snafu(display("ERR: EOF reached"))]
    Eof,
    /// No symbol arrived within the allotted time.
    #[snafu(display("ERR: read timeout"))]
    Timeout,
    /// Dictionary lookup found no entry.
    #[snafu(display("ERR: element not found"))]
    NotFound,
    /// An entry with the same key already exists.
    #[snafu(display("ERR: duplicate entry"))]
    Duplicate,
    #[snafu(display("ERR: invalid argument"))]
    InvalidArg,
    #[snafu(display("ERR: argument value out of valid range"))]
    OutOfRange,
    #[snafu(display("ERR: CRC error"))]
    Crc,
    /// The expected acknowledge symbol was missing or contradictory.
    #[snafu(display("ERR: ACK error"))]
    Ack,
    #[snafu(display("ERR: NAK received"))]
    Nak,
    /// Another master won the arbitration round.
    #[snafu(display("ERR: arbitration lost"))]
    BusLost,
    #[snafu(display("ERR: send error"))]
    Send,
    #[snafu(display("ERR: device error"))]
    Device,
    #[snafu(display("ERR: generic I/O error"))]
    GenericIo,
    /// An ESC symbol was followed by something other than 0x00 or 0x01.
    #[snafu(display("ERR: invalid escape sequence"))]
    EscUnexpected,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::Crc.to_string(), "ERR: CRC error");
        assert_eq!(Error::BusLost.to_string(), "ERR: arbitration lost");
        assert_eq!(Error::Timeout.to_string(), "ERR: read timeout");
    }
}

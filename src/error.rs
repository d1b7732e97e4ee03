use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The transport failed while reading.
    ReadFailure,
    /// The transport failed while writing or flushing.
    WriteFailure,
    /// A configuration command got no reply before the read timeout.
    NoReply,
    /// A reply arrived but could not be interpreted.
    UnexpectedReply,
    /// A single binary reading did not contain a complete frame.
    InvalidFrame,
    /// The idle read limit was reached without decoding a frame.
    NoFrame,
    /// An argument is out of range, or a target exceeds the session capacity.
    InvalidArg,
    /// A formatted command does not fit the command buffer.
    CommandTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::ReadFailure => "serial read failed",
            Error::WriteFailure => "serial write failed",
            Error::NoReply => "no reply from transducer",
            Error::UnexpectedReply => "unexpected reply from transducer",
            Error::InvalidFrame => "no complete binary frame in reply",
            Error::NoFrame => "idle read limit reached without a frame",
            Error::InvalidArg => "invalid argument",
            Error::CommandTooLong => "command does not fit the command buffer",
        };
        f.write_str(msg)
    }
}

//! Error types for coflasher-core
//!
//! Everything here is `no_std` compatible and `Copy`, so errors can be
//! passed around and stored in upgrade reports without allocation.

use core::fmt;

use crate::bus::BusError;

/// The bootloader answered a framing step with something other than ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Command byte and its complement were not acknowledged
    UnknownCommand {
        /// Opcode that was sent
        opcode: u8,
        /// Byte received instead of ACK
        response: u8,
    },
    /// Address word was rejected
    BadAddress {
        /// Byte received instead of ACK
        response: u8,
    },
    /// Length byte or data block was rejected
    BadArgument {
        /// Byte received instead of ACK
        response: u8,
    },
    /// The trailing acknowledgement after a response payload was not ACK
    BadFinalAck {
        /// Byte observed in place of the final ACK
        byte: u8,
    },
    /// The application firmware answered with an unexpected payload
    UnexpectedReply,
    /// The application version string is not valid ASCII
    InvalidVersionString,
}

impl ProtocolError {
    /// Short reason string, stable across releases
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownCommand { .. } => "unknown command",
            Self::BadAddress { .. } => "bad address",
            Self::BadArgument { .. } => "bad argument",
            Self::BadFinalAck { .. } => "bad final ack",
            Self::UnexpectedReply => "unexpected reply",
            Self::InvalidVersionString => "invalid version string",
        }
    }
}

/// A documented caller constraint was violated
///
/// These are programming errors. They are raised before any bus I/O and
/// are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionError {
    /// Block longer than one bootloader transfer
    BlockTooLarge {
        /// Requested length
        len: usize,
    },
    /// Zero-length transfer
    EmptyBlock,
    /// Write length is not a multiple of 4
    UnalignedLength {
        /// Requested length
        len: usize,
    },
    /// Write address is not 4-byte aligned
    UnalignedAddress {
        /// Requested address
        addr: u32,
    },
    /// Range runs past the end of the 32-bit address space
    AddressOverflow {
        /// Start address
        addr: u32,
        /// Requested length
        len: usize,
    },
}

/// Core error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Transport failure
    Bus(BusError),
    /// Bootloader or application framing failure
    Protocol(ProtocolError),
    /// Caller violated a documented constraint
    Precondition(PreconditionError),
    /// Driving a reset, strap or bus-ownership line failed
    ControlLine,
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<PreconditionError> for Error {
    fn from(e: PreconditionError) -> Self {
        Self::Precondition(e)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand { opcode, response } => write!(
                f,
                "unknown command 0x{:02X} (got 0x{:02X})",
                opcode, response
            ),
            Self::BadAddress { response } | Self::BadArgument { response } => {
                write!(f, "{} (got 0x{:02X})", self.reason(), response)
            }
            Self::BadFinalAck { byte } => write!(f, "bad final ack: 0x{:02X}", byte),
            Self::UnexpectedReply | Self::InvalidVersionString => f.write_str(self.reason()),
        }
    }
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockTooLarge { len } => {
                write!(f, "block of {} bytes exceeds the 256 byte limit", len)
            }
            Self::EmptyBlock => write!(f, "zero-length transfer"),
            Self::UnalignedLength { len } => {
                write!(f, "length {} is not a multiple of 4", len)
            }
            Self::UnalignedAddress { addr } => {
                write!(f, "address 0x{:08X} is not 4-byte aligned", addr)
            }
            Self::AddressOverflow { addr, len } => write!(
                f,
                "{} bytes at 0x{:08X} run past the end of the address space",
                len, addr
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus error: {}", e),
            Self::Protocol(e) => write!(f, "protocol error: {}", e),
            Self::Precondition(e) => write!(f, "precondition violated: {}", e),
            Self::ControlLine => write!(f, "failed to drive control line"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProtocolError {}

#[cfg(feature = "std")]
impl std::error::Error for PreconditionError {}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

//! Firmware images

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::protocol::app::VERSION_REPLY_LEN;
use crate::protocol::{FLASH_START, MAX_TRANSFER};

/// Reasons an image cannot be flashed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// No data
    Empty,
    /// The version could never be reported back by the application
    BadVersion(String),
    /// Load address not 4-byte aligned
    UnalignedBase(u32),
    /// Image runs past the end of the address space at this load address
    DoesNotFit {
        /// Load address
        base: u32,
        /// Padded image length
        len: usize,
    },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "firmware image is empty"),
            Self::BadVersion(v) => write!(
                f,
                "version {:?} must be ASCII and at most {} characters",
                v, VERSION_REPLY_LEN
            ),
            Self::UnalignedBase(addr) => {
                write!(f, "load address 0x{:08X} is not 4-byte aligned", addr)
            }
            Self::DoesNotFit { base, len } => write!(
                f,
                "{} byte image does not fit at 0x{:08X}",
                len, base
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ImageError {}

fn check_fits(base: u32, len: usize) -> Result<(), ImageError> {
    let last = u32::try_from(len - 1).ok().and_then(|last| base.checked_add(last));
    match last {
        Some(_) => Ok(()),
        None => Err(ImageError::DoesNotFit { base, len }),
    }
}

/// A flat binary plus the version string it is expected to report
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    data: Vec<u8>,
    version: String,
    base: u32,
}

impl FirmwareImage {
    /// Wrap a raw binary loaded at [`FLASH_START`]
    ///
    /// The data is padded with 0xFF (the erased value) to a multiple of 4
    /// bytes, since the bootloader only accepts word-sized writes.
    pub fn new(mut data: Vec<u8>, version: impl Into<String>) -> Result<Self, ImageError> {
        let version = version.into();
        if data.is_empty() {
            return Err(ImageError::Empty);
        }
        if version.is_empty() || version.len() > VERSION_REPLY_LEN || !version.is_ascii() {
            return Err(ImageError::BadVersion(version));
        }

        while data.len() % 4 != 0 {
            data.push(0xFF);
        }
        check_fits(FLASH_START, data.len())?;

        Ok(Self {
            data,
            version,
            base: FLASH_START,
        })
    }

    /// Load the image somewhere other than the start of flash
    pub fn with_base(mut self, base: u32) -> Result<Self, ImageError> {
        if base % 4 != 0 {
            return Err(ImageError::UnalignedBase(base));
        }
        check_fits(base, self.data.len())?;
        self.base = base;
        Ok(self)
    }

    /// Padded image contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Expected application version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Load address
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Padded length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; empty images are rejected on construction
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Blocks in the order they must be programmed
    ///
    /// Every block except the first comes in ascending address order, then
    /// the first block last. The first block holds the vector table, so
    /// until it is written the co-processor cannot boot a half-written
    /// image and will stay in the bootloader after a reset.
    pub fn blocks_in_write_order(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        let mut chunks = self.data.chunks(MAX_TRANSFER).enumerate();
        let first = chunks.next();
        chunks
            .chain(first)
            .map(move |(i, chunk)| (self.base + (i * MAX_TRANSFER) as u32, chunk))
    }
}

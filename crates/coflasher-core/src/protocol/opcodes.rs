//! ROM bootloader opcodes and reply bytes
//!
//! Opcode values follow the vendor's I2C bootloader command set. The
//! "no-stretch" variants are used for anything slow (erase, write,
//! protection changes) because the host controller cannot tolerate clock
//! stretching; the bootloader instead answers BUSY until it is done.

// ============================================================================
// Reply bytes
// ============================================================================

/// Step accepted
pub const ACK: u8 = 0x79;
/// Step rejected
pub const NACK: u8 = 0x1F;
/// Still executing, poll again
pub const BUSY: u8 = 0x76;

// ============================================================================
// Commands
// ============================================================================

/// Get bootloader version and supported commands
pub const GET: u8 = 0x00;
/// Get bootloader version and read protection status
pub const GET_VERSION: u8 = 0x01;
/// Get chip ID
pub const GET_ID: u8 = 0x02;
/// Read up to 256 bytes of memory
pub const READ_MEMORY: u8 = 0x11;
/// Jump to user code
pub const GO: u8 = 0x21;
/// Write up to 256 bytes of memory (clock stretching)
pub const WRITE_MEMORY: u8 = 0x31;
/// Write up to 256 bytes of memory (no-stretch)
pub const WRITE_MEMORY_NS: u8 = 0x32;
/// Erase pages or mass erase (clock stretching)
pub const ERASE: u8 = 0x44;
/// Erase pages or mass erase (no-stretch)
pub const ERASE_NS: u8 = 0x45;
/// Write protect flash sectors (clock stretching)
pub const WRITE_PROTECT: u8 = 0x63;
/// Write protect flash sectors (no-stretch)
pub const WRITE_PROTECT_NS: u8 = 0x64;
/// Remove write protection (clock stretching)
pub const WRITE_UNPROTECT: u8 = 0x73;
/// Remove write protection (no-stretch)
pub const WRITE_UNPROTECT_NS: u8 = 0x74;
/// Enable readout protection (clock stretching)
pub const READOUT_PROTECT: u8 = 0x82;
/// Enable readout protection (no-stretch)
pub const READOUT_PROTECT_NS: u8 = 0x83;
/// Disable readout protection (clock stretching)
pub const READOUT_UNPROTECT: u8 = 0x92;
/// Disable readout protection, mass erasing the flash (no-stretch)
pub const READOUT_UNPROTECT_NS: u8 = 0x93;
/// CRC over a memory range (no-stretch)
pub const GET_CHECKSUM_NS: u8 = 0xA1;

// ============================================================================
// Arguments
// ============================================================================

/// Erase argument selecting a global mass erase
pub const ERASE_ALL: [u8; 2] = [0xFF, 0xFF];

/// Human-readable name of an opcode, for logs and `info` output
pub fn name(opcode: u8) -> &'static str {
    match opcode {
        GET => "Get",
        GET_VERSION => "Get Version",
        GET_ID => "Get ID",
        READ_MEMORY => "Read Memory",
        GO => "Go",
        WRITE_MEMORY => "Write Memory",
        WRITE_MEMORY_NS => "No-Stretch Write Memory",
        ERASE => "Erase",
        ERASE_NS => "No-Stretch Erase",
        WRITE_PROTECT => "Write Protect",
        WRITE_PROTECT_NS => "No-Stretch Write Protect",
        WRITE_UNPROTECT => "Write Unprotect",
        WRITE_UNPROTECT_NS => "No-Stretch Write Unprotect",
        READOUT_PROTECT => "Readout Protect",
        READOUT_PROTECT_NS => "No-Stretch Readout Protect",
        READOUT_UNPROTECT => "Readout Unprotect",
        READOUT_UNPROTECT_NS => "No-Stretch Readout Unprotect",
        GET_CHECKSUM_NS => "No-Stretch Get Checksum",
        _ => "unknown",
    }
}

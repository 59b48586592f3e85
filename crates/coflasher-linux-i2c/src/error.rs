//! Error types for Linux I2C operations

use thiserror::Error;

/// Linux I2C specific errors
#[derive(Debug, Error)]
pub enum LinuxI2cError {
    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to query adapter functionality
    #[error("Failed to query adapter functionality of {path}: {source}")]
    FuncsFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Adapter cannot do combined I2C transfers
    #[error("{path} does not support plain I2C transfers (SMBus-only adapter?)")]
    NotI2cCapable { path: String },

    /// Device not specified
    #[error("No device specified. Use dev=/dev/i2c-N or i2cbus=N")]
    NoDevice,
}

/// Result type for Linux I2C operations
pub type Result<T> = std::result::Result<T, LinuxI2cError>;

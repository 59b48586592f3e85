//! Backend registration and dispatch
//!
//! A backend supplies both halves of the hardware: the I2C bus the
//! co-processor answers on and the lines that reset it, strap it into the
//! bootloader and hand over the SPI bus. Backends are selected with a string
//! of the form `name[:key=value,...]`.

use coflasher_core::{ControlLines, Coprocessor, I2cBus};
use thiserror::Error;

/// A co-processor behind whichever backend was selected
pub type BoxedCoprocessor = Coprocessor<Box<dyn I2cBus>, Box<dyn ControlLines>>;

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Errors from parsing a backend string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Backend name not compiled in or misspelled
    #[error("Unknown backend: {0}")]
    Unknown(String),

    /// Option without a key
    #[error("Invalid parameter format: '{0}' (expected key=value)")]
    InvalidParameter(String),

    /// Option given to a backend that does not take it
    #[error("Backend '{backend}' does not accept option '{key}'")]
    UnexpectedOption {
        /// Backend name
        backend: &'static str,
        /// Offending key
        key: String,
    },
}

/// Backend name and its options, in the order given
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendParams {
    /// Backend name as typed
    pub name: String,
    /// Key/value options; flags without `=` carry an empty value
    pub options: Vec<(String, String)>,
}

impl BackendParams {
    fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn has(&self, key: &str) -> bool {
        self.options.iter().any(|(k, _)| k == key)
    }
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &["emulator"],
        description: "In-memory co-processor emulator (app=<version> or blank)",
    });

    #[cfg(feature = "linux")]
    backends.push(BackendInfo {
        name: "linux",
        aliases: &[],
        description:
            "Linux i2c-dev + GPIO (i2c=/dev/i2c-N,gpiochip=N,reset=<n>,boot0=<n>[,ctrl=<n>])",
    });

    backends
}

/// Generate a short list of backend names for CLI help
pub fn backend_names_short() -> String {
    let backends = available_backends();
    let names: Vec<&str> = backends.iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Parse a backend string into name and options
///
/// # Example
/// ```ignore
/// let params = parse_backend_params("linux:i2cbus=1,reset=17")?;
/// assert_eq!(params.name, "linux");
/// ```
pub fn parse_backend_params(s: &str) -> Result<BackendParams, BackendError> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut options = Vec::new();
    for opt in opts_str.split(',').filter(|o| !o.is_empty()) {
        let (key, value) = opt.split_once('=').unwrap_or((opt, ""));
        if key.is_empty() {
            return Err(BackendError::InvalidParameter(opt.to_string()));
        }
        options.push((key.to_string(), value.to_string()));
    }

    Ok(BackendParams {
        name: name.to_string(),
        options,
    })
}

/// Open the co-processor behind a backend string
///
/// Opening does not touch the co-processor: the control lines come up
/// with the device running and the strap released.
pub fn open_backend(backend: &str) -> Result<BoxedCoprocessor, Box<dyn std::error::Error>> {
    let params = parse_backend_params(backend)?;
    log::debug!("Opening backend {} with {:?}", params.name, params.options);

    match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" | "emulator" => open_dummy(&params),

        #[cfg(feature = "linux")]
        "linux" => open_linux(&params),

        _ => Err(BackendError::Unknown(params.name).into()),
    }
}

/// Version the emulator's application reports unless `app=` says otherwise
#[cfg(feature = "dummy")]
const DUMMY_APP_VERSION: &str = "dummy-1.0";

#[cfg(feature = "dummy")]
fn open_dummy(params: &BackendParams) -> Result<BoxedCoprocessor, Box<dyn std::error::Error>> {
    use coflasher_dummy::{build_firmware, DummyConfig, DummyCoprocessor};

    if let Some((key, _)) = params
        .options
        .iter()
        .find(|(k, _)| k != "app" && k != "blank")
    {
        return Err(BackendError::UnexpectedOption {
            backend: "dummy",
            key: key.clone(),
        }
        .into());
    }

    let device = if params.has("blank") {
        log::info!("dummy: starting with blank flash");
        DummyCoprocessor::new(DummyConfig::default())
    } else {
        let version = params.get("app").unwrap_or(DUMMY_APP_VERSION);
        log::info!("dummy: starting application {}", version);
        DummyCoprocessor::with_firmware(DummyConfig::default(), &build_firmware(4096, version))
    };

    let bus: Box<dyn I2cBus> = Box::new(device.bus());
    let lines: Box<dyn ControlLines> = Box::new(device.lines());
    Ok(Coprocessor::new(bus, lines))
}

/// Split `linux` options between the I2C adapter and the GPIO chip
///
/// `i2c=` is the adapter path (`dev=` is accepted too) and `i2cbus=N` its
/// number; everything else belongs to the GPIO lines.
#[cfg(any(feature = "linux", test))]
#[allow(clippy::type_complexity)]
fn split_linux_options(params: &BackendParams) -> (Vec<(&str, &str)>, Vec<(&str, &str)>) {
    let mut i2c = Vec::new();
    let mut gpio = Vec::new();
    for (key, value) in &params.options {
        match key.as_str() {
            "i2c" | "dev" => i2c.push(("dev", value.as_str())),
            "i2cbus" => i2c.push(("i2cbus", value.as_str())),
            _ => gpio.push((key.as_str(), value.as_str())),
        }
    }
    (i2c, gpio)
}

#[cfg(feature = "linux")]
fn open_linux(params: &BackendParams) -> Result<BoxedCoprocessor, Box<dyn std::error::Error>> {
    let (i2c_opts, gpio_opts) = split_linux_options(params);
    let bus = coflasher_linux_i2c::open_linux_i2c(&i2c_opts)?;
    let lines = coflasher_linux_gpio::open_linux_gpio(&gpio_opts)?;
    Ok(Coprocessor::new(bus, lines))
}

/// Result alias that carries the custom [`BeatlightError`] type.
pub type Result<T> = std::result::Result<T, BeatlightError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BeatlightError {
    /// The input asset is missing or cannot be decoded. Raised before any
    /// actuation has started.
    #[error("asset error: {0}")]
    Asset(String),
    /// An audio or actuation device is unavailable, or was lost mid-stream.
    /// Fatal; the session tears down to zero brightness before surfacing it.
    #[error("device error: {0}")]
    Device(String),
    /// A frame arrived with the wrong sample count. Recoverable: the
    /// pipeline skips the frame and holds the previous brightness.
    #[error("invalid frame: expected {expected} samples, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    /// An out-of-range tunable. Fatal at startup, never silently clamped.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl BeatlightError {
    /// Creates an asset error wrapping the provided message.
    pub fn asset<T: Into<String>>(msg: T) -> Self {
        Self::Asset(msg.into())
    }

    /// Creates a device error wrapping the provided message.
    pub fn device<T: Into<String>>(msg: T) -> Self {
        Self::Device(msg.into())
    }

    /// Creates a configuration error wrapping the provided message.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<hound::Error> for BeatlightError {
    fn from(value: hound::Error) -> Self {
        Self::Asset(value.to_string())
    }
}

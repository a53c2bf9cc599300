use derive_more::Display;

/// Error type shared by the tuner, its drivers and the controller.
#[derive(Debug, Display)]
pub enum TunerError {
    /// Configuration is invalid or inconsistent.
    #[display("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
    /// A percent value could not be parsed.
    #[display("invalid percent for {key}: {value:?}")]
    InvalidPercent { key: String, value: String },
    /// The interval driver thread could not be started.
    #[display("failed to start tuning driver: {reason}")]
    DriverSpawn { reason: String },
    /// The process-wide controller is already bound to a runtime.
    #[display("global controller already installed")]
    AlreadyInstalled,
}

impl core::error::Error for TunerError {}

impl TunerError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn invalid_percent(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidPercent {
            key: key.into(),
            value: value.into(),
        }
    }
}

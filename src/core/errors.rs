use thiserror::Error;

/// Unified error type for the correlation bridge
#[derive(Debug, Error)]
pub enum MuxDemuxError {
    /// A result was taken for an identifier that has none stored.
    /// The caller skipped `is_pending` or took the same result twice.
    #[error("No result stored for identifier: {identifier}")]
    ResultNotFound {
        identifier: String,
    },

    /// Channel/queue errors
    #[error("Channel closed: {channel} ({operation})")]
    ChannelClosed {
        channel: String,
        operation: String,
    },

    /// Timeout errors
    #[error("Operation timed out: {operation} (timeout: {timeout_ms}ms)")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    /// A component was used after its owner shut it down
    #[error("Component already shut down: {component}")]
    Shutdown {
        component: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl MuxDemuxError {
    /// Create a not-found error for a result lookup
    pub fn result_not_found<S: Into<String>>(identifier: S) -> Self {
        Self::ResultNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create a channel-closed error
    pub fn channel_closed<S: Into<String>, O: Into<String>>(channel: S, operation: O) -> Self {
        Self::ChannelClosed {
            channel: channel.into(),
            operation: operation.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn shutdown<S: Into<String>>(component: S) -> Self {
        Self::Shutdown {
            component: component.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source
    pub fn internal_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if retrying the same call later may succeed.
    ///
    /// Only a timed-out wait qualifies: the result may still arrive.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::ResultNotFound { .. } => "protocol",
            Self::ChannelClosed { .. } => "channel",
            Self::Timeout { .. } => "timeout",
            Self::Shutdown { .. } => "shutdown",
            Self::Configuration { .. } => "configuration",
            Self::Serialization { .. } => "serialization",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MuxDemuxError>;

impl From<serde_json::Error> for MuxDemuxError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for MuxDemuxError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<anyhow::Error> for MuxDemuxError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

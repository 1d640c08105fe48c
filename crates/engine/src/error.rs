use tradegate_core::*;

/// Failure to set up a binding between a tenant's stub and its venue.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("Unknown account {stub} for tenant {tenant}")]
    UnknownAccount { tenant: TenantId, stub: String },
    #[error("No venue profile for {0}")]
    UnknownVenue(String),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

/// Failure inside a dispatched call. Converted into `Outcome::Error` at the executor.
#[derive(Debug, thiserror::Error)]
pub enum NormalizerError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    Binding(#[from] BindingError),
    /// A nested dispatched call came back as an error envelope.
    #[error("{0}")]
    Failed(ErrorData),
    #[error("Invalid parameters for {method}: {message}")]
    InvalidParams { method: String, message: String },
    #[error("Market not found: {0}")]
    MarketNotFound(String),
    #[error("Leverage is not supported on {0}")]
    LeverageUnsupported(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NormalizerError {
    pub fn invalid_params(method: &str, message: impl ToString) -> Self {
        NormalizerError::InvalidParams {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    /// Error class name reported in the result envelope.
    pub fn name(&self) -> &str {
        match self {
            NormalizerError::Connector(err) | NormalizerError::Binding(BindingError::Connector(err)) => err.name(),
            NormalizerError::Binding(_) => "BindingError",
            NormalizerError::Failed(data) => data.name.as_str(),
            NormalizerError::InvalidParams { .. } => "InvalidParams",
            NormalizerError::MarketNotFound(_) => "MarketNotFound",
            NormalizerError::LeverageUnsupported(_) => "LeverageUnsupported",
            NormalizerError::Serialization(_) => "SerializationError",
        }
    }

    pub fn message(&self) -> String {
        match self {
            NormalizerError::Connector(err) | NormalizerError::Binding(BindingError::Connector(err)) => {
                err.message().to_string()
            }
            NormalizerError::Failed(data) => data.message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<NormalizerError> for ErrorData {
    fn from(err: NormalizerError) -> Self {
        ErrorData::new(err.name(), err.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_error_keeps_its_class() {
        let err: NormalizerError = ConnectorError::venue("InsufficientFunds", "balance too low").into();
        assert_eq!(ErrorData::from(err), ErrorData::new("InsufficientFunds", "balance too low"));

        let err: NormalizerError = BindingError::Connector(ConnectorError::Network("timed out".into())).into();
        assert_eq!(err.name(), "NetworkError");
    }

    #[test]
    fn test_leverage_unsupported_name() {
        let data = ErrorData::from(NormalizerError::LeverageUnsupported("binance".into()));
        assert_eq!(data.name, "LeverageUnsupported");
        assert_eq!(data.message, "Leverage is not supported on binance");
    }
}

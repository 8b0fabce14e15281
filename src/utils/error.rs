use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// 庫存不足的單筆明細
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockShortage {
    pub product_id: Uuid,
    pub requested: i64,
    pub available: i64,
}

#[derive(Error, Debug)]
pub enum MarktError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Totals mismatch on {field}: submitted {submitted:.2}, computed {computed:.2}")]
    TotalsMismatch {
        field: &'static str,
        submitted: f64,
        computed: f64,
    },

    #[error("Insufficient stock for {} product(s)", .shortages.len())]
    InsufficientStock { shortages: Vec<StockShortage> },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Inventory,
    Access,
    Storage,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl MarktError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::ValidationError { .. }
            | Self::TotalsMismatch { .. }
            | Self::NotFound { .. }
            | Self::Conflict { .. } => ErrorCategory::Input,
            Self::InsufficientStock { .. } => ErrorCategory::Inventory,
            Self::Unauthorized { .. } | Self::Forbidden { .. } => ErrorCategory::Access,
            Self::IoError(_)
            | Self::SerializationError(_)
            | Self::CsvError(_)
            | Self::ZipError(_)
            | Self::StorageError { .. } => ErrorCategory::Storage,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input | ErrorCategory::Inventory => ErrorSeverity::Low,
            ErrorCategory::Access => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Storage | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// HTTP 狀態碼對應
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError { .. }
            | Self::TotalsMismatch { .. }
            | Self::InsufficientStock { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            _ => 500,
        }
    }

    /// 穩定的機器可讀錯誤碼
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "VALIDATION_FAILED",
            Self::TotalsMismatch { .. } => "TOTALS_MISMATCH",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => "CONFIGURATION",
            _ => "INTERNAL",
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::ConfigValidationError { .. } | Self::InvalidConfigValueError { .. } => {
                "Check the configuration file and environment variables"
            }
            Self::MissingConfigError { .. } => "Add the missing setting to the configuration file",
            Self::TotalsMismatch { .. } => "Refresh the cart and resubmit with current prices",
            Self::InsufficientStock { .. } => "Restock the location or reduce the quantities",
            Self::Conflict { .. } => "Reload the resource and retry",
            Self::Unauthorized { .. } => "Sign in again to obtain a fresh token",
            Self::Forbidden { .. } => "Ask an owner or manager to perform this action",
            Self::IoError(_) | Self::StorageError { .. } => {
                "Check that the data directory exists and is writable"
            }
            _ => "Review the request and try again",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::InsufficientStock { shortages } => {
                let products: Vec<String> =
                    shortages.iter().map(|s| s.product_id.to_string()).collect();
                format!("Not enough stock for: {}", products.join(", "))
            }
            Self::IoError(e) => format!("File access failed: {}", e),
            Self::StorageError { .. } => "The data store is unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<toml::de::Error> for MarktError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, MarktError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_categories() {
        assert_eq!(MarktError::validation("bad").status_code(), 400);
        assert_eq!(MarktError::not_found("product", "x").status_code(), 404);
        assert_eq!(MarktError::conflict("dup").status_code(), 409);
        assert_eq!(MarktError::forbidden("no").status_code(), 403);
        assert_eq!(
            MarktError::StorageError {
                message: "down".into()
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn test_insufficient_stock_message_lists_products() {
        let id = Uuid::new_v4();
        let err = MarktError::InsufficientStock {
            shortages: vec![StockShortage {
                product_id: id,
                requested: 3,
                available: 1,
            }],
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert!(err.user_friendly_message().contains(&id.to_string()));
        assert_eq!(err.to_string(), "Insufficient stock for 1 product(s)");
    }
}

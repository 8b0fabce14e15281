use crate::utils::error::{MarktError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(MarktError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(MarktError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(MarktError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(MarktError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(MarktError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(MarktError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| MarktError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MarktError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(MarktError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// 請求層級的檢查：回傳 ValidationError 而不是設定錯誤
pub fn require_text(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MarktError::validation(format!("{} is required", field_name)));
    }
    Ok(())
}

pub fn require_money(field_name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(MarktError::validation(format!(
            "{} must be a non-negative amount, got {}",
            field_name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("cors_origins", "https://shop.example.com").is_ok());
        assert!(validate_url("cors_origins", "http://localhost:5173").is_ok());
        assert!(validate_url("cors_origins", "").is_err());
        assert!(validate_url("cors_origins", "invalid-url").is_err());
        assert!(validate_url("cors_origins", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("snapshot_interval_seconds", 5, 1).is_ok());
        assert!(validate_positive_number("snapshot_interval_seconds", 0, 1).is_err());
    }

    #[test]
    fn test_require_money_rejects_negative_and_nan() {
        assert!(require_money("price", 0.0).is_ok());
        assert!(require_money("price", 12.5).is_ok());
        assert!(require_money("price", -0.01).is_err());
        assert!(require_money("price", f64::NAN).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("tax_rate", 0.16, 0.0, 1.0).is_ok());
        assert!(validate_range("tax_rate", 1.5, 0.0, 1.0).is_err());
    }
}

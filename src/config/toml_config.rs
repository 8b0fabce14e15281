use crate::core::catalog::CatalogDefaults;
use crate::utils::error::{MarktError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_required_field, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub sales: SalesConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// 除錯模式：以 X-Business-Id 等標頭取代 JWT
    pub debug: bool,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            debug: false,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub business_claim: String,
    pub role_claim: String,
    pub issuer: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            business_claim: "business_id".to_string(),
            role_claim: "role".to_string(),
            issuer: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesConfig {
    pub tolerance: f64,
    pub default_currency: String,
    pub default_tax_rate: f64,
    pub low_stock_threshold: i64,
}

impl Default for SalesConfig {
    fn default() -> Self {
        Self {
            tolerance: crate::core::totals::DEFAULT_TOLERANCE,
            default_currency: "USD".to_string(),
            default_tax_rate: 0.0,
            low_stock_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 未設定時資料只存在記憶體中
    pub data_dir: Option<String>,
    pub snapshot_file: String,
    pub snapshot_interval_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            snapshot_file: "marktbook.json".to_string(),
            snapshot_interval_seconds: 60,
        }
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(MarktError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${JWT_SECRET})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| MarktError::ConfigValidationError {
            field: "environment".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server
            .listen
            .parse()
            .map_err(|e| MarktError::InvalidConfigValueError {
                field: "server.listen".to_string(),
                value: self.server.listen.clone(),
                reason: format!("{}", e),
            })
    }

    pub fn catalog_defaults(&self) -> CatalogDefaults {
        CatalogDefaults {
            currency: self.sales.default_currency.clone(),
            tax_rate: self.sales.default_tax_rate,
            low_stock_threshold: self.sales.low_stock_threshold,
        }
    }

    pub fn persistence_enabled(&self) -> bool {
        self.storage.data_dir.is_some()
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        for origin in &self.server.cors_origins {
            validate_url("server.cors_origins", origin)?;
        }

        if !self.server.debug {
            let secret = validate_required_field("auth.jwt_secret", &self.auth.jwt_secret)?;
            validate_non_empty_string("auth.jwt_secret", secret)?;
            if secret.contains("${") {
                return Err(MarktError::ConfigValidationError {
                    field: "auth.jwt_secret".to_string(),
                    message: "environment variable was not set".to_string(),
                });
            }
        }
        validate_non_empty_string("auth.business_claim", &self.auth.business_claim)?;

        validate_range("sales.tolerance", self.sales.tolerance, 0.0, 1.0)?;
        validate_range("sales.default_tax_rate", self.sales.default_tax_rate, 0.0, 1.0)?;
        validate_range(
            "sales.low_stock_threshold",
            self.sales.low_stock_threshold,
            0,
            i64::MAX,
        )?;

        if let Some(dir) = &self.storage.data_dir {
            validate_path("storage.data_dir", dir)?;
            validate_path("storage.snapshot_file", &self.storage.snapshot_file)?;
            validate_positive_number(
                "storage.snapshot_interval_seconds",
                self.storage.snapshot_interval_seconds,
                1,
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_toml_config() {
        let toml_content = r#"
[server]
listen = "0.0.0.0:9000"
cors_origins = ["https://pos.example.com"]

[auth]
jwt_secret = "s3cret"
issuer = "marktbook"

[sales]
tolerance = 0.05
default_currency = "KES"
default_tax_rate = 0.16

[storage]
data_dir = "./data"
snapshot_interval_seconds = 30
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.listen_addr().unwrap().port(), 9000);
        assert_eq!(config.auth.business_claim, "business_id");
        assert_eq!(config.sales.default_currency, "KES");
        assert_eq!(config.storage.snapshot_file, "marktbook.json");
        assert!(config.persistence_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults_but_needs_secret() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert!(!config.persistence_enabled());
        assert!(matches!(
            config.validate(),
            Err(MarktError::MissingConfigError { .. })
        ));

        let debug = AppConfig::from_toml_str("[server]\ndebug = true\n").unwrap();
        assert!(debug.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MARKTBOOK_TEST_SECRET", "from-env");

        let config =
            AppConfig::from_toml_str("[auth]\njwt_secret = \"${MARKTBOOK_TEST_SECRET}\"\n").unwrap();
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-env"));

        std::env::remove_var("MARKTBOOK_TEST_SECRET");
    }

    #[test]
    fn test_unset_env_var_fails_validation() {
        let config =
            AppConfig::from_toml_str("[auth]\njwt_secret = \"${MARKTBOOK_UNSET_VAR_XYZ}\"\n")
                .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = AppConfig::from_toml_str(
            "[server]\ndebug = true\ncors_origins = [\"not a url\"]\n",
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config =
            AppConfig::from_toml_str("[server]\ndebug = true\n[sales]\ndefault_tax_rate = 1.5\n")
                .unwrap();
        assert!(config.validate().is_err());

        assert!(AppConfig::from_toml_str("[server]\nlisten = 5\n").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[server]\ndebug = true\nlisten = \"127.0.0.1:0\"\n")
            .unwrap();

        let config = AppConfig::from_file(temp_file.path()).unwrap();
        assert!(config.server.debug);
        assert!(config.validate().is_ok());
    }
}

pub mod toml_config;

pub use toml_config::AppConfig;

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "marktbook")]
#[command(about = "Retail back-office service: catalog, stock, point of sale and sales analytics")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Address to listen on, overrides [server].listen
    #[arg(long)]
    pub listen: Option<String>,

    /// Directory for the data snapshot, overrides [storage].data_dir
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Accept X-Business-Id headers instead of JWTs (local development only)
    #[arg(long)]
    pub debug: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入設定檔（若有），再套用命令列覆蓋
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = Some(dir.clone());
        }
        if self.debug {
            config.server.debug = true;
        }
    }
}

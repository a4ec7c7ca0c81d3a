use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;

use crate::domain::group::Selection;
use crate::domain::value_objects::{OutputMethod, TablePrefix, WriteMode};

/// Prefix of environment overrides, e.g. `WOO_MIGRATE__SOURCE__PASSWORD`.
const ENV_PREFIX: &str = "WOO_MIGRATE";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub source: DbConfig,
    #[serde(default)]
    pub destination: DbConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    /// Table-name prefix of this installation.
    pub prefix: TablePrefix,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            dbname: String::new(),
            prefix: TablePrefix::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExportConfig {
    pub mode: WriteMode,
    pub select: Selection,
    /// Rows fetched per page.
    pub page_size: u64,
    /// Byte threshold after which an output file is sealed.
    pub max_file_size: u64,
    /// Group jobs allowed to run at once. `1` runs them one after another.
    pub parallelism: usize,
    pub output_method: OutputMethod,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            mode: WriteMode::Append,
            select: Selection::default(),
            page_size: 1000,
            max_file_size: 50 * 1024 * 1024,
            parallelism: 1,
            output_method: OutputMethod::Progress,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ImportConfig {
    pub select: Selection,
    /// Prior run directory (`exports/export_20240101_120000`).
    pub from_dir: Option<String>,
    /// Explicit file list, matched to groups by file name.
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            dir: "exports".to_string(),
        }
    }
}

impl DbConfig {
    /// Build sqlx connect options from this config. Options are used
    /// instead of a URL so passwords need no percent-encoding.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.dbname)
            .charset("utf8mb4")
    }

    /// `user@host:port/db`, safe for logs.
    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.dbname)
    }
}

impl AppConfig {
    /// Load a TOML file, then overlay `WOO_MIGRATE__<SECTION>__<KEY>`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .add_source(env_source())
            .build()
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let cfg: AppConfig = cfg
            .try_deserialize()
            .with_context(|| "Failed to parse config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse config from an in-memory TOML string (no environment overlay).
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let cfg: AppConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .with_context(|| "Failed to parse config TOML")?
            .try_deserialize()
            .with_context(|| "Failed to parse config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.export.page_size == 0 {
            bail!("export.page_size must be at least 1");
        }
        if self.export.max_file_size == 0 {
            bail!("export.max_file_size must be at least 1 byte");
        }
        if self.export.parallelism == 0 {
            bail!("export.parallelism must be at least 1");
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [source]
        host = "db1"
        user = "reader"
        password = "s3cret"
        dbname = "shop"
        prefix = "wp_"

        [destination]
        dbname = "shop_new"
        prefix = "wc_"

        [export]
        mode = "overwrite"
        page_size = 500
        parallelism = 4
        output_method = "direct"

        [export.select]
        products = true
        tags = true

        [output]
        dir = "/var/exports"
    "#;

    #[test]
    fn parses_full_config() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.source.host, "db1");
        assert_eq!(cfg.source.port, 3306);
        assert_eq!(cfg.destination.prefix, TablePrefix("wc_".into()));
        assert_eq!(cfg.export.mode, WriteMode::Overwrite);
        assert_eq!(cfg.export.page_size, 500);
        assert_eq!(cfg.export.max_file_size, 50 * 1024 * 1024);
        assert_eq!(cfg.export.parallelism, 4);
        assert_eq!(cfg.export.output_method, OutputMethod::Direct);
        assert!(cfg.export.select.products && cfg.export.select.tags);
        assert!(!cfg.export.select.orders);
        assert_eq!(cfg.output.dir, "/var/exports");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.export.mode, WriteMode::Append);
        assert_eq!(cfg.export.page_size, 1000);
        assert_eq!(cfg.export.parallelism, 1);
        assert_eq!(cfg.source.prefix, TablePrefix("wp_".into()));
        assert_eq!(cfg.output.dir, "exports");
        assert!(cfg.import.from_dir.is_none());
    }

    #[test]
    fn rejects_zero_page_size() {
        let err = AppConfig::from_toml_str("[export]\npage_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(AppConfig::from_toml_str("[export]\nmode = \"merge\"\n").is_err());
    }

    #[test]
    fn describe_hides_password() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        let d = cfg.source.describe();
        assert_eq!(d, "reader@db1:3306/shop");
        assert!(!d.contains("s3cret"));
    }
}

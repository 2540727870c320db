use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

pub const DEFAULT_DATABASE_PATH: &str = "parallel-file-upload.db";
pub const DEFAULT_BUCKET_NAME: &str = "rewotes-pfu-bucket";
pub const DEFAULT_OBJECT_STORE_ROOT: &str = "./object-store";
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_path: String,
    pub bucket_name: String,
    /// Base directory of the local object store; each bucket is a sub-directory.
    pub object_store_root: String,
    /// Maximum number of uploads in flight at once.
    pub concurrency: usize,
    /// Rows fetched per work-queue page.
    pub page_size: usize,
    pub ignore_patterns: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            bucket_name: DEFAULT_BUCKET_NAME.to_string(),
            object_store_root: DEFAULT_OBJECT_STORE_ROOT.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            ignore_patterns: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Message(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Message(
                "page_size must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Load configuration from defaults, an optional `Config` file and `PFU_*`
/// environment variables, in increasing order of precedence.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    build_configuration(Config::builder().add_source(ConfigFile::with_name("Config").required(false)))
}

fn build_configuration(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    let config = Config::builder()
        .set_default("database_path", defaults.database_path)?
        .set_default("bucket_name", defaults.bucket_name)?
        .set_default("object_store_root", defaults.object_store_root)?
        .set_default("concurrency", defaults.concurrency as i64)?
        .set_default("page_size", defaults.page_size as i64)?
        .set_default("ignore_patterns", Vec::<String>::new())?
        .add_source(builder.build()?)
        .add_source(
            Environment::with_prefix("PFU")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    config.try_deserialize::<AppConfig>()?.validate()
}

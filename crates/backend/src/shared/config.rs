use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Настройки внешнего сервиса распознавания изображений
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Максимум одновременных запросов к сервису (общий на процесс)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

/// Словарь заголовков для поиска колонок в спецификации
///
/// Логика поиска колонок строится на этом словаре, а не на жёстко
/// зашитых строках: другой диалект файла — другой config.toml.
#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// Лист, в имени которого есть эта подстрока (без учёта регистра)
    #[serde(default = "default_sheet_token")]
    pub sheet_name_token: String,
    #[serde(default = "default_number_header")]
    pub number_header: String,
    #[serde(default = "default_name_header")]
    pub name_header: String,
    #[serde(default = "default_article_header")]
    pub article_header: String,
    #[serde(default = "default_brand_header")]
    pub brand_header: String,
    #[serde(default = "default_tariff_header")]
    pub tariff_code_header: String,
    /// Заголовок добавляемой колонки с артикулом
    #[serde(default = "default_article_column")]
    pub article_column_header: String,
    /// Заголовок добавляемой колонки с кодами ТН ВЭД
    #[serde(default = "default_tariff_column")]
    pub tariff_column_header: String,
}

fn default_api_base() -> String {
    "https://dashscope-intl.aliyuncs.com/compatible-mode/v1".to_string()
}

fn default_model() -> String {
    "qwen-vl-plus".to_string()
}

fn default_max_concurrent() -> usize {
    15
}

fn default_sheet_token() -> String {
    "Спецификация".to_string()
}

fn default_number_header() -> String {
    "№".to_string()
}

fn default_name_header() -> String {
    "Наименование товара".to_string()
}

fn default_article_header() -> String {
    "Артикул".to_string()
}

fn default_brand_header() -> String {
    "Бренд".to_string()
}

fn default_tariff_header() -> String {
    "ТН ВЭД".to_string()
}

fn default_article_column() -> String {
    "Артикул 1С".to_string()
}

fn default_tariff_column() -> String {
    "Код ТН ВЭД".to_string()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            model: default_model(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            sheet_name_token: default_sheet_token(),
            number_header: default_number_header(),
            name_header: default_name_header(),
            article_header: default_article_header(),
            brand_header: default_brand_header(),
            tariff_code_header: default_tariff_header(),
            article_column_header: default_article_column(),
            tariff_column_header: default_tariff_column(),
        }
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[database]
path = "target/db/app.db"

[classifier]
api_base = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1"
api_key = ""
model = "qwen-vl-plus"
max_concurrent_requests = 15

[import]
"#;

static CONFIG: OnceCell<Config> = OnceCell::new();

/// Load configuration from config.toml file
///
/// Search order:
/// 1. Next to the executable (for production)
/// 2. Falls back to embedded default config
pub fn load_config() -> anyhow::Result<Config> {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                let config: Config = toml::from_str(&contents)?;
                return Ok(config);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    tracing::info!("Using default embedded configuration");
    let config: Config = toml::from_str(DEFAULT_CONFIG)?;
    Ok(config)
}

pub fn init_config(config: Config) -> anyhow::Result<()> {
    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Config already initialized"))
}

pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config has not been initialized")
}

/// Get the database file path from configuration
/// Resolves relative paths relative to the executable directory
pub fn get_database_path(config: &Config) -> anyhow::Result<PathBuf> {
    let db_path_str = &config.database.path;
    let db_path = Path::new(db_path_str);

    if db_path.is_absolute() {
        return Ok(db_path.to_path_buf());
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let resolved_path = exe_dir.join(db_path);
            return Ok(resolved_path);
        }
    }

    Ok(PathBuf::from(db_path_str))
}

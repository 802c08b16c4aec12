use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::error::BrowserError;
use crate::query::{Flag, Matcher, SearchForm};

pub const CONFIG_FILE: &str = "arc-browser.json";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/dcm4chee-arc";
pub const DEFAULT_AET: &str = "DCM4CHEE";
pub const DEFAULT_LIMIT: usize = 20;
pub const DEFAULT_ORDER_BY: &str = "-StudyDate";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub aet: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default)]
    pub flags: Vec<Flag>,
}

/// Command-line values that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub aet: Option<String>,
    pub limit: Option<usize>,
    pub order_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub source: Option<PathBuf>,
    pub base_url: String,
    pub aet: String,
    pub limit: usize,
    pub order_by: String,
    pub download_dir: Utf8PathBuf,
    pub matchers: Vec<Matcher>,
    pub flags: Vec<Flag>,
}

impl ResolvedConfig {
    pub fn search_form(&self) -> SearchForm {
        let mut form = SearchForm::new(self.aet.clone(), self.limit, self.order_by.clone());
        form.matchers = self.matchers.clone();
        form.flags = self.flags.clone();
        form
    }

    pub fn apply(&mut self, overrides: Overrides) -> Result<(), BrowserError> {
        if let Some(base_url) = overrides.base_url {
            self.base_url = base_url;
        }
        if let Some(aet) = overrides.aet {
            self.aet = aet;
        }
        if let Some(limit) = overrides.limit {
            self.limit = validate_limit(limit)?;
        }
        if let Some(order_by) = overrides.order_by {
            self.order_by = order_by;
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path` when given; otherwise the first of `./arc-browser.json`
    /// and the platform config directory that exists, or built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, BrowserError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };
        let Some(config_path) = config_path else {
            return Self::resolve_config(Config::default(), None);
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BrowserError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BrowserError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, Some(config_path))
    }

    pub fn resolve_config(
        config: Config,
        source: Option<PathBuf>,
    ) -> Result<ResolvedConfig, BrowserError> {
        let limit = validate_limit(config.limit.unwrap_or(DEFAULT_LIMIT))?;
        let download_dir = match config.download_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_download_dir(),
        };
        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            source,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            aet: config.aet.unwrap_or_else(|| DEFAULT_AET.to_string()),
            limit,
            order_by: config
                .order_by
                .unwrap_or_else(|| DEFAULT_ORDER_BY.to_string()),
            download_dir,
            matchers: config.matchers,
            flags: config.flags,
        })
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("org", "dcm4che", "arc-browser")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .filter(|path| path.exists())
    }
}

fn validate_limit(limit: usize) -> Result<usize, BrowserError> {
    if limit == 0 {
        return Err(BrowserError::InvalidLimit(limit.to_string()));
    }
    Ok(limit)
}

pub fn default_download_dir() -> Utf8PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|dir| dir.join("arc-browser")))
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("downloads"))
}

//! Settings from defaults, an optional TOML file and `VAC_*` environment variables.
//!
//! Nested keys use a double underscore: `VAC_SJ__API_KEY=...`.

use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::Result;
use crate::registry::TargetCompany;

pub const DEFAULT_CONFIG_FILE: &str = "vacancies.toml";
pub const CONFIG_PATH_VAR: &str = "VAC_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct HhSettings {
    pub base_url: String,
    pub per_page: u32,
    pub max_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SjSettings {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub per_page: u32,
    pub max_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub hh: HhSettings,
    pub sj: SjSettings,
    /// Extra allowlist entries merged into the database on `init`.
    #[serde(default)]
    pub companies: Vec<TargetCompany>,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("db_path", "data/vacancies.sqlite")?
        .set_default("hh.base_url", "https://api.hh.ru/vacancies")?
        .set_default("hh.per_page", 100_i64)?
        .set_default("hh.max_pages", 20_i64)?
        .set_default("sj.base_url", "https://api.superjob.ru/2.0/vacancies/")?
        .set_default("sj.per_page", 100_i64)?
        .set_default("sj.max_pages", 5_i64)?)
}

impl Settings {
    /// Read `$VAC_CONFIG` (or `vacancies.toml` when present), then the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = defaults()?
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("VAC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Defaults overlaid with an inline TOML document.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn sj_enabled(&self) -> bool {
        self.sj
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let s = Settings::from_toml("").unwrap();
        assert_eq!(s.db_path, PathBuf::from("data/vacancies.sqlite"));
        assert_eq!(s.hh.per_page, 100);
        assert_eq!(s.hh.max_pages, 20);
        assert_eq!(s.sj.max_pages, 5);
        assert!(s.companies.is_empty());
        assert!(!s.sj_enabled());
    }

    #[test]
    fn file_overrides_and_companies() {
        let s = Settings::from_toml(
            r#"
            db_path = "/tmp/v.db"

            [sj]
            api_key = "v3.r.secret"
            max_pages = 2

            [[companies]]
            name = "Acme"
            sj_id = "900"
            "#,
        )
        .unwrap();
        assert_eq!(s.db_path, PathBuf::from("/tmp/v.db"));
        assert_eq!(s.sj.max_pages, 2);
        assert_eq!(s.sj.per_page, 100);
        assert!(s.sj_enabled());
        assert_eq!(s.companies, vec![TargetCompany::new("Acme", None, Some("900"))]);
    }

    #[test]
    fn missing_file_is_fine() {
        let s = Settings::load_from(Path::new("/nonexistent/vacancies.toml")).unwrap();
        assert_eq!(s.hh.base_url, "https://api.hh.ru/vacancies");
    }
}

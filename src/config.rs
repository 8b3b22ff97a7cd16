use crate::scrapers::schema::ExtractionSchema;
use crate::scrapers::types::SearchParams;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Env var naming an optional JSON config file
pub const CONFIG_PATH_VAR: &str = "LISTING_SCRAPE_CONFIG";
pub const WORKDIR_VAR: &str = "SCRAPE_WORKDIR";
pub const CITY_VAR: &str = "SCRAPE_CITY";

/// Which parts of the run to execute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Stages {
    /// Query the portal and write per-query files
    pub scrape: bool,
    /// Rebuild per-query files from saved page snapshots instead of the portal
    pub replay: bool,
    /// Consolidate per-query files into the clean dataset
    pub aggregate: bool,
}

impl Default for Stages {
    fn default() -> Self {
        Self {
            scrape: true,
            replay: false,
            aggregate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Directory receiving per-query and consolidated files
    pub working_dir: PathBuf,
    /// Search endpoint the query parameters are appended to
    pub base_url: String,
    pub search: SearchParams,
    /// Pause between scrolls while lazy content renders
    pub scroll_pause_ms: u64,
    /// Equal consecutive height readings needed beyond the first to call a page stable
    pub stable_confirmations: u32,
    pub headless: bool,
    /// Chrome is killed after this long without any browser event
    pub idle_timeout_secs: u64,
    /// Where to save page HTML after scrolling; also the replay source
    pub snapshot_dir: Option<PathBuf>,
    pub stages: Stages,
    pub schema: ExtractionSchema,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("working_directory"),
            base_url: "https://www.magicbricks.com/property-for-rent/residential-real-estate"
                .to_string(),
            search: SearchParams::default(),
            scroll_pause_ms: 2_000,
            stable_confirmations: 1,
            headless: true,
            idle_timeout_secs: 600,
            snapshot_dir: None,
            stages: Stages::default(),
            schema: ExtractionSchema::default(),
        }
    }
}

impl ScrapeConfig {
    /// Defaults, overlaid by the JSON file named in `LISTING_SCRAPE_CONFIG`,
    /// overlaid by `SCRAPE_WORKDIR` / `SCRAPE_CITY`
    pub fn load() -> Result<Self> {
        let mut config = match env::var_os(CONFIG_PATH_VAR) {
            Some(path) => {
                let path = PathBuf::from(path);
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_json(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Some(dir) = env::var_os(WORKDIR_VAR) {
            config.working_dir = PathBuf::from(dir);
        }
        if let Ok(city) = env::var(CITY_VAR) {
            config.search.city = city;
        }

        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn clean_output_path(&self) -> PathBuf {
        self.working_dir.join("prop_data_clean.csv")
    }
}

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, NaiveTime};
use dotenvy::dotenv;
use url::Url;

use crate::kernel::{BrowserSettings, LoadOptions};
use crate::scheduler::{parse_time_of_day, parse_utc_offset};

/// Which converter fills the document strategy slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterKind {
    Ocr,
    Hwp5Html,
}

impl FromStr for ConverterKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ocr" => Ok(ConverterKind::Ocr),
            "hwp5html" => Ok(ConverterKind::Hwp5Html),
            other => bail!("unknown document converter `{}` (expected ocr or hwp5html)", other),
        }
    }
}

/// Crawler configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub base_api_url: String,
    pub realtime_url: String,
    pub crawl_interval_minutes: u64,
    /// Posting board; the postings job is only registered when set.
    pub mofa_url: Option<String>,
    pub postings_daily_at: NaiveTime,
    pub postings_max_pages: u32,
    pub finviz_url: String,
    pub stocks_daily_at: NaiveTime,
    pub heatmap_daily_at: NaiveTime,
    /// Fixed offset all daily times are interpreted in.
    pub schedule_offset: FixedOffset,
    pub page_load: LoadOptions,
    pub http_timeout: Duration,
    pub converter: ConverterKind,
    pub ocr_languages: String,
    pub conversion_timeout: Duration,
    pub browser: BrowserSettings,
    pub artifact_log_path: PathBuf,
    pub shutdown_grace: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));

        let base_api_url = required("BASE_API_URL")?;
        Url::parse(&base_api_url).context("BASE_API_URL must be a valid URL")?;
        let realtime_url = required("REALTIME_URL")?;
        Url::parse(&realtime_url).context("REALTIME_URL must be a valid URL")?;

        let crawl_interval_minutes: u64 = required("CRAWL_INTERVAL_MINUTES")?
            .trim()
            .parse()
            .context("CRAWL_INTERVAL_MINUTES must be a positive integer")?;
        if crawl_interval_minutes == 0 {
            bail!("CRAWL_INTERVAL_MINUTES must be a positive integer");
        }

        let mofa_url = get("MOFA_URL");
        if let Some(url) = &mofa_url {
            Url::parse(url).context("MOFA_URL must be a valid URL")?;
        }
        let finviz_url = get("FINVIZ_URL").unwrap_or_else(|| "https://finviz.com".to_string());
        Url::parse(&finviz_url).context("FINVIZ_URL must be a valid URL")?;

        let time = |key: &str, default: &str| -> Result<NaiveTime> {
            let value = get(key).unwrap_or_else(|| default.to_string());
            parse_time_of_day(&value).with_context(|| format!("{key} must be HH:MM"))
        };
        let number = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a valid number")),
                None => Ok(default),
            }
        };
        let secs = |key: &str, default: u64| number(key, default).map(Duration::from_secs);

        let schedule_offset = parse_utc_offset(
            &get("SCHEDULE_UTC_OFFSET").unwrap_or_else(|| "+09:00".to_string()),
        )
        .context("SCHEDULE_UTC_OFFSET must look like +09:00")?;

        let page_load = LoadOptions {
            max_retries: number("PAGE_LOAD_MAX_RETRIES", 3)?.max(1) as u32,
            retry_delay: secs("PAGE_LOAD_RETRY_DELAY_SECS", 5)?,
            navigation_timeout: secs("PAGE_NAV_TIMEOUT_SECS", 5)?,
            reload_timeout: secs("PAGE_RELOAD_TIMEOUT_SECS", 60)?,
            ready_timeout: secs("PAGE_READY_TIMEOUT_SECS", 60)?,
            ..LoadOptions::default()
        };

        let converter = match get("DOCUMENT_CONVERTER") {
            Some(v) => v.parse()?,
            None => ConverterKind::Ocr,
        };

        let headless = match get("BROWSER_HEADLESS") {
            Some(v) => parse_bool(&v).context("BROWSER_HEADLESS must be true or false")?,
            None => true,
        };
        let browser = BrowserSettings {
            headless,
            executable: get("CHROME_EXECUTABLE").map(PathBuf::from),
            ..BrowserSettings::default()
        };

        Ok(Self {
            base_api_url,
            realtime_url,
            crawl_interval_minutes,
            mofa_url,
            postings_daily_at: time("POSTINGS_DAILY_AT", "18:00")?,
            postings_max_pages: number("POSTINGS_MAX_PAGES", 3)?.max(1) as u32,
            finviz_url,
            stocks_daily_at: time("STOCKS_DAILY_AT", "06:30")?,
            heatmap_daily_at: time("HEATMAP_DAILY_AT", "07:00")?,
            schedule_offset,
            page_load,
            http_timeout: secs("HTTP_TIMEOUT_SECS", 10)?,
            converter,
            ocr_languages: get("OCR_LANGUAGES").unwrap_or_else(|| "kor+eng".to_string()),
            conversion_timeout: secs("CONVERSION_TIMEOUT_SECS", 30)?,
            browser,
            artifact_log_path: get("ARTIFACT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("artifacts.tsv")),
            shutdown_grace: secs("SHUTDOWN_GRACE_SECS", 30)?,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a boolean: {}", other),
    }
}

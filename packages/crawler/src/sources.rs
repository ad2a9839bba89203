//! Per-source selectors, paths and limits.
//!
//! These describe vendor page structure and change whenever a site does, so
//! they live here as data rather than inside the extraction code.

use std::time::Duration;

use crate::common::MoveDirection;

/// Keyword panels on the realtime search-term page.
#[derive(Debug, Clone)]
pub struct KeywordPanelSettings {
    pub platforms: Vec<String>,
    /// `{platform}` is replaced with each platform id.
    pub panel_selector: String,
    pub item_selector: String,
    /// Panels are filled in by script after the load event.
    pub render_delay: Duration,
}

impl Default for KeywordPanelSettings {
    fn default() -> Self {
        Self {
            platforms: ["daum", "zum", "nate", "googletrend"]
                .into_iter()
                .map(String::from)
                .collect(),
            panel_selector: "div.item#{platform}".to_string(),
            item_selector: "span.keyword > a".to_string(),
            render_delay: Duration::from_secs(5),
        }
    }
}

impl KeywordPanelSettings {
    pub fn panel_for(&self, platform: &str) -> String {
        self.panel_selector.replace("{platform}", platform)
    }
}

/// Screener result table layout (zero-based cell indices).
#[derive(Debug, Clone)]
pub struct ScreenerSettings {
    pub table_selector: String,
    pub symbol_column: usize,
    pub name_column: usize,
    pub change_column: usize,
    pub limit: usize,
}

impl Default for ScreenerSettings {
    fn default() -> Self {
        Self {
            table_selector: "table.styled-table-new".to_string(),
            symbol_column: 1,
            name_column: 2,
            change_column: 9,
            limit: 20,
        }
    }
}

/// One screener query: which list, which direction, which index label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockScreen {
    pub path: String,
    pub direction: MoveDirection,
    pub index: String,
}

impl StockScreen {
    fn new(path: &str, direction: MoveDirection, index: &str) -> Self {
        Self {
            path: path.to_string(),
            direction,
            index: index.to_string(),
        }
    }
}

pub fn nasdaq_screens() -> Vec<StockScreen> {
    vec![
        StockScreen::new(
            "/screener.ashx?v=111&s=ta_topgainers&f=exch_nasd&o=-change",
            MoveDirection::Gainer,
            "NASDAQ100",
        ),
        StockScreen::new(
            "/screener.ashx?v=111&s=ta_toplosers&f=exch_nasd&o=change",
            MoveDirection::Loser,
            "NASDAQ100",
        ),
    ]
}

pub fn sp500_screens() -> Vec<StockScreen> {
    vec![
        StockScreen::new(
            "/screener.ashx?v=111&f=idx_sp500&ft=4&o=-change",
            MoveDirection::Gainer,
            "SP500",
        ),
        StockScreen::new(
            "/screener.ashx?v=111&f=idx_sp500&ft=4&o=change",
            MoveDirection::Loser,
            "SP500",
        ),
    ]
}

/// Job posting board layout (zero-based cell indices).
#[derive(Debug, Clone)]
pub struct PostingSettings {
    pub list_path: String,
    pub row_selector: String,
    pub title_column: usize,
    pub department_column: usize,
    pub date_column: usize,
    pub date_format: String,
    pub attachment_selector: String,
    pub content_container: String,
    pub site: String,
    pub max_pages: u32,
}

impl Default for PostingSettings {
    fn default() -> Self {
        Self {
            list_path: "/www/brd/m_4079/list.do".to_string(),
            row_selector: "table.tableB tbody tr".to_string(),
            title_column: 2,
            department_column: 4,
            date_column: 5,
            date_format: "%Y-%m-%d".to_string(),
            attachment_selector: "a[href*='down.do']".to_string(),
            content_container: ".bo_con".to_string(),
            site: "MOFA 채용정보".to_string(),
            max_pages: 3,
        }
    }
}

/// Sector heatmap capture.
#[derive(Debug, Clone)]
pub struct HeatmapSettings {
    pub path: String,
    pub canvas_selector: String,
    pub overlay_close_selector: String,
    pub overlay_wait: Duration,
    pub cleanup_script: String,
    /// Third-party tiles keep repainting for a while after load.
    pub settle_delay: Duration,
    pub max_width: f64,
    pub max_height: f64,
    pub upload_prefix: String,
}

impl Default for HeatmapSettings {
    fn default() -> Self {
        Self {
            path: "/map.ashx?t=sec".to_string(),
            canvas_selector: "canvas.hover-canvas".to_string(),
            overlay_close_selector: "#aymStickyFooterClose".to_string(),
            overlay_wait: Duration::from_secs(1),
            cleanup_script: concat!(
                "document.querySelectorAll('.adsbygoogle, iframe, [id^=\"google_ads\"], .ad_container')",
                ".forEach(el => el.remove());",
                "document.querySelectorAll('div[style*=\"position: fixed\"], .fixed-bottom')",
                ".forEach(el => el.remove());"
            )
            .to_string(),
            settle_delay: Duration::from_secs(15),
            max_width: 1200.0,
            max_height: 800.0,
            upload_prefix: "heatmaps".to_string(),
        }
    }
}

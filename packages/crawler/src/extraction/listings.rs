//! Single-strategy parsers for tabular and panel sources.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::text::squash;
use super::{ExtractionFailure, ExtractionStrategy};
use crate::common::{KeywordRecord, MoveDirection, StockMoveRecord};
use crate::kernel::RenderedPage;
use crate::sources::{KeywordPanelSettings, PostingSettings, ScreenerSettings};

fn selector(css: &str) -> Result<Selector, ExtractionFailure> {
    Selector::parse(css).map_err(|e| ExtractionFailure::Parse(format!("selector {css}: {e}")))
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    squash(&cell.text().collect::<String>())
}

// =============================================================================
// Keyword panels
// =============================================================================

/// Ranked keywords per platform panel. Missing panels are skipped.
pub struct KeywordPanelStrategy {
    settings: KeywordPanelSettings,
}

impl KeywordPanelStrategy {
    pub fn new(settings: KeywordPanelSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ExtractionStrategy<RenderedPage, Vec<KeywordRecord>> for KeywordPanelStrategy {
    fn name(&self) -> &str {
        "keyword-panel"
    }

    async fn extract(&self, page: &RenderedPage) -> Result<Vec<KeywordRecord>, ExtractionFailure> {
        parse_keyword_panels(&page.html, &self.settings, page.captured_at)
    }
}

pub fn parse_keyword_panels(
    html: &str,
    settings: &KeywordPanelSettings,
    collected_at: DateTime<Utc>,
) -> Result<Vec<KeywordRecord>, ExtractionFailure> {
    let document = Html::parse_document(html);
    let items = selector(&settings.item_selector)?;
    let mut records = Vec::new();

    for platform in &settings.platforms {
        let panel = selector(&settings.panel_for(platform))?;
        let Some(section) = document.select(&panel).next() else {
            warn!(platform = %platform, "keyword panel not found");
            continue;
        };

        let keywords: Vec<String> = section
            .select(&items)
            .map(|a| cell_text(&a))
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            warn!(platform = %platform, "keyword panel is empty");
            continue;
        }
        debug!(platform = %platform, count = keywords.len(), "collected keywords");

        records.extend(keywords.into_iter().enumerate().map(|(i, keyword)| KeywordRecord {
            platform: platform.clone(),
            keyword,
            rank: i as u32 + 1,
            collected_at,
        }));
    }

    Ok(records)
}

// =============================================================================
// Screener tables
// =============================================================================

/// Top rows of a gainers/losers screener.
pub struct ScreenerTableStrategy {
    settings: ScreenerSettings,
    direction: MoveDirection,
    index: String,
    offset: FixedOffset,
}

impl ScreenerTableStrategy {
    pub fn new(
        settings: ScreenerSettings,
        direction: MoveDirection,
        index: impl Into<String>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            settings,
            direction,
            index: index.into(),
            offset,
        }
    }
}

#[async_trait]
impl ExtractionStrategy<RenderedPage, Vec<StockMoveRecord>> for ScreenerTableStrategy {
    fn name(&self) -> &str {
        "screener-table"
    }

    async fn extract(&self, page: &RenderedPage) -> Result<Vec<StockMoveRecord>, ExtractionFailure> {
        parse_screener_table(
            &page.html,
            &self.settings,
            self.direction,
            &self.index,
            page.captured_at.with_timezone(&self.offset),
        )
    }
}

pub fn parse_screener_table(
    html: &str,
    settings: &ScreenerSettings,
    direction: MoveDirection,
    index: &str,
    observed_at: DateTime<FixedOffset>,
) -> Result<Vec<StockMoveRecord>, ExtractionFailure> {
    let document = Html::parse_document(html);
    let table = selector(&settings.table_selector)?;
    let rows = selector("tbody tr")?;
    let cells = selector("td")?;

    let table = document
        .select(&table)
        .next()
        .ok_or_else(|| ExtractionFailure::MissingElement(settings.table_selector.clone()))?;

    let needed = settings
        .symbol_column
        .max(settings.name_column)
        .max(settings.change_column);
    let mut records = Vec::new();

    for row in table.select(&rows) {
        let tds: Vec<ElementRef<'_>> = row.select(&cells).collect();
        if tds.len() <= needed {
            continue;
        }

        let symbol = cell_text(&tds[settings.symbol_column]);
        let change_raw = cell_text(&tds[settings.change_column]);
        let Some(change_percent) = parse_percent(&change_raw) else {
            debug!(symbol = %symbol, value = %change_raw, "skipping row with unparsable change");
            continue;
        };
        if symbol.is_empty() {
            continue;
        }

        records.push(StockMoveRecord {
            symbol,
            name: cell_text(&tds[settings.name_column]),
            change_percent,
            direction,
            index: index.to_string(),
            observed_at,
        });
        if records.len() >= settings.limit {
            break;
        }
    }

    Ok(records)
}

/// `"-12.34%"` → `-12.34`.
fn parse_percent(raw: &str) -> Option<f64> {
    raw.trim().trim_end_matches('%').trim().parse().ok()
}

// =============================================================================
// Posting list
// =============================================================================

/// One row of the posting board list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingSummary {
    pub url: String,
    pub title: String,
    pub department: String,
    pub posted_on: NaiveDate,
}

/// Rows of one list page posted on `today`.
pub fn parse_posting_list(
    html: &str,
    page_url: &Url,
    settings: &PostingSettings,
    today: NaiveDate,
) -> Result<Vec<PostingSummary>, ExtractionFailure> {
    let document = Html::parse_document(html);
    let rows = selector(&settings.row_selector)?;
    let cells = selector("td")?;
    let link = selector("a")?;
    let needed = settings
        .date_column
        .max(settings.title_column)
        .max(settings.department_column);
    let mut postings = Vec::new();

    for row in document.select(&rows) {
        let tds: Vec<ElementRef<'_>> = row.select(&cells).collect();
        if tds.len() <= needed {
            continue;
        }

        let date_text = cell_text(&tds[settings.date_column]);
        let Ok(posted_on) = NaiveDate::parse_from_str(&date_text, &settings.date_format) else {
            debug!(value = %date_text, "skipping row with invalid date");
            continue;
        };
        if posted_on != today {
            continue;
        }

        let Some(anchor) = tds[settings.title_column].select(&link).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = page_url.join(href) else {
            warn!(href = %href, "skipping posting with invalid link");
            continue;
        };

        postings.push(PostingSummary {
            url: url.to_string(),
            title: cell_text(&anchor),
            department: cell_text(&tds[settings.department_column]),
            posted_on,
        });
    }

    Ok(postings)
}

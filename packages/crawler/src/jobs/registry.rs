//! Wires every configured job into a scheduler.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use super::{HeatmapJob, JobPostingsJob, RealtimeKeywordsJob, StockMoversJob};
use crate::config::{Config, ConverterKind};
use crate::extraction::{DocumentConverter, Hwp5HtmlConverter, OcrConverter};
use crate::kernel::CrawlerDeps;
use crate::scheduler::{Scheduler, SchedulerConfig, Trigger};
use crate::sink::{ArtifactLog, RecordSink};
use crate::sources::{HeatmapSettings, KeywordPanelSettings, PostingSettings};

pub fn build_scheduler(config: &Config, deps: &CrawlerDeps) -> Result<Scheduler> {
    let artifacts = Arc::new(ArtifactLog::new(&config.artifact_log_path));
    let sink = Arc::new(RecordSink::new(deps.backend.clone(), artifacts));
    let offset = config.schedule_offset;
    let daily = |time| Trigger::DailyAt { time, offset };

    let mut scheduler = Scheduler::new(SchedulerConfig {
        shutdown_grace: config.shutdown_grace,
        ..SchedulerConfig::default()
    });

    scheduler.register_job(
        Trigger::every_minutes(config.crawl_interval_minutes)?,
        Arc::new(RealtimeKeywordsJob::new(
            &config.realtime_url,
            deps,
            config.page_load.clone(),
            KeywordPanelSettings::default(),
            sink.clone(),
        )),
    )?;

    scheduler.register_job(
        daily(config.stocks_daily_at),
        Arc::new(StockMoversJob::nasdaq(
            &config.finviz_url,
            deps,
            config.page_load.clone(),
            offset,
            sink.clone(),
        )),
    )?;
    scheduler.register_job(
        daily(config.stocks_daily_at),
        Arc::new(StockMoversJob::sp500(
            &config.finviz_url,
            deps,
            config.page_load.clone(),
            offset,
            sink.clone(),
        )),
    )?;

    scheduler.register_job(
        daily(config.heatmap_daily_at),
        Arc::new(HeatmapJob::new(
            &config.finviz_url,
            deps,
            config.page_load.clone(),
            HeatmapSettings::default(),
            offset,
            sink.clone(),
        )),
    )?;

    match &config.mofa_url {
        Some(board_url) => {
            let converter: Arc<dyn DocumentConverter> = match config.converter {
                ConverterKind::Ocr => Arc::new(OcrConverter::new(
                    config.ocr_languages.clone(),
                    config.conversion_timeout,
                )),
                ConverterKind::Hwp5Html => {
                    Arc::new(Hwp5HtmlConverter::new(config.conversion_timeout))
                }
            };
            let settings = PostingSettings {
                max_pages: config.postings_max_pages,
                ..PostingSettings::default()
            };
            scheduler.register_job(
                daily(config.postings_daily_at),
                Arc::new(JobPostingsJob::new(
                    board_url,
                    deps,
                    config.page_load.clone(),
                    converter,
                    settings,
                    offset,
                    sink,
                )),
            )?;
        }
        None => info!("MOFA_URL not set, job postings disabled"),
    }

    Ok(scheduler)
}

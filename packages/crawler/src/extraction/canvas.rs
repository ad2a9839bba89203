use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{ExtractionFailure, ExtractionStrategy, Payload};
use crate::kernel::{PageError, PageGuard};
use crate::sources::HeatmapSettings;

/// Budget for each page interaction (click, script, screenshot).
const STEP_BUDGET: Duration = Duration::from_secs(30);

/// PNG bytes of a captured page region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
}

impl Payload for CapturedImage {
    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn summary(&self) -> String {
        format!("{} bytes png", self.bytes.len())
    }
}

/// Clears overlays from a live page, waits for tiles to settle, then captures
/// the canvas clipped to the configured maximum size.
pub struct CanvasCaptureStrategy {
    settings: HeatmapSettings,
}

impl CanvasCaptureStrategy {
    pub fn new(settings: HeatmapSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ExtractionStrategy<PageGuard, CapturedImage> for CanvasCaptureStrategy {
    fn name(&self) -> &str {
        "canvas-capture"
    }

    async fn extract(&self, page: &PageGuard) -> Result<CapturedImage, ExtractionFailure> {
        let s = &self.settings;
        let session = page.session()?;

        match timeout(STEP_BUDGET, session.click(&s.overlay_close_selector)).await {
            Ok(Ok(true)) => {
                debug!("closed sticky overlay");
                tokio::time::sleep(s.overlay_wait).await;
            }
            Ok(Ok(false)) => debug!("no sticky overlay present"),
            Ok(Err(e)) => warn!(error = %e, "overlay close failed"),
            Err(_) => warn!("overlay close timed out"),
        }

        match timeout(STEP_BUDGET, session.evaluate(&s.cleanup_script)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "ad cleanup script failed"),
            Err(_) => warn!("ad cleanup script timed out"),
        }

        tokio::time::sleep(s.settle_delay).await;

        let bytes = timeout(
            STEP_BUDGET,
            session.screenshot_element(&s.canvas_selector, s.max_width, s.max_height),
        )
        .await
        .map_err(|_| PageError::AttemptTimeout(STEP_BUDGET))??;

        Ok(CapturedImage { bytes })
    }
}

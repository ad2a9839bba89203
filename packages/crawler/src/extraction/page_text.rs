use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use super::{DocumentRef, ExtractionFailure, ExtractionStrategy};
use crate::kernel::{LoadOptions, PageLoader, Readiness};

/// Visible text of the detail page's content container.
pub struct DirectPageStrategy {
    loader: PageLoader,
    options: LoadOptions,
    container: String,
}

impl DirectPageStrategy {
    pub fn new(loader: PageLoader, options: LoadOptions, container: impl Into<String>) -> Self {
        let container = container.into();
        Self {
            loader,
            options: options.with_readiness(Readiness::Selector(container.clone())),
            container,
        }
    }
}

#[async_trait]
impl ExtractionStrategy<DocumentRef, String> for DirectPageStrategy {
    fn name(&self) -> &str {
        "direct-page"
    }

    async fn extract(&self, input: &DocumentRef) -> Result<String, ExtractionFailure> {
        let page = self.loader.load(&input.page_url, &self.options).await;
        if page.cancelled {
            return Err(ExtractionFailure::Cancelled);
        }
        if !page.succeeded {
            return Err(ExtractionFailure::PageUnavailable {
                url: input.page_url.clone(),
                attempts: page.attempts_used,
            });
        }
        container_text(&page.content.html, &self.container)
    }
}

pub(crate) fn container_text(html: &str, container: &str) -> Result<String, ExtractionFailure> {
    let selector = Selector::parse(container)
        .map_err(|e| ExtractionFailure::Parse(format!("selector {container}: {e}")))?;
    let document = Html::parse_document(html);
    let element = document
        .select(&selector)
        .next()
        .ok_or_else(|| ExtractionFailure::MissingElement(container.to_string()))?;

    Ok(visible_text(element))
}

/// Elements whose text a browser never renders.
const HIDDEN_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// Rendered text under `element`, one trimmed text node per line.
pub(crate) fn visible_text(element: ElementRef<'_>) -> String {
    element
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
            });
            (!hidden).then_some(&**text)
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

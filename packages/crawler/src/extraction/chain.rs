//! Ordered extraction strategies with explicit fallback.
//!
//! A chain tries each strategy in priority order and stops at the first one
//! that returns a non-empty payload. Failures are matched, recorded as
//! [`ExtractionAttempt`]s and never abort the chain. An optional fallback value
//! guarantees the caller always has something to deliver, except when a
//! strategy reports shutdown: the chain then stops with [`ChainError::Cancelled`].

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use super::ExtractionFailure;

/// Strategy name recorded when the fallback value is used.
pub const SENTINEL_STRATEGY: &str = "sentinel";

/// Output a strategy can produce.
pub trait Payload: Send {
    /// Empty payloads count as failure.
    fn is_empty(&self) -> bool;

    /// Short description for attempt logs.
    fn summary(&self) -> String;
}

impl Payload for String {
    fn is_empty(&self) -> bool {
        self.trim().is_empty()
    }

    fn summary(&self) -> String {
        let preview: String = self.chars().take(80).collect();
        format!("{} chars: {}", self.chars().count(), preview.replace('\n', " "))
    }
}

impl<T: Send> Payload for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }

    fn summary(&self) -> String {
        format!("{} items", self.len())
    }
}

#[async_trait]
pub trait ExtractionStrategy<I: ?Sized + Sync, O>: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, input: &I) -> Result<O, ExtractionFailure>;
}

/// One strategy's result inside a chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionAttempt {
    pub strategy: String,
    pub succeeded: bool,
    pub output_summary: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ChainOutcome<O> {
    pub output: O,
    pub strategy_used: String,
    pub attempts: Vec<ExtractionAttempt>,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("all {} extraction strategies failed for {source_name}", .attempts.len())]
    Exhausted {
        source_name: String,
        attempts: Vec<ExtractionAttempt>,
    },

    #[error("extraction for {source_name} cancelled by shutdown")]
    Cancelled {
        source_name: String,
        attempts: Vec<ExtractionAttempt>,
    },
}

impl ChainError {
    pub fn attempts(&self) -> &[ExtractionAttempt] {
        match self {
            ChainError::Exhausted { attempts, .. } | ChainError::Cancelled { attempts, .. } => {
                attempts
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChainError::Cancelled { .. })
    }
}

pub struct ExtractionChain<I: ?Sized, O> {
    source: String,
    strategies: Vec<Box<dyn ExtractionStrategy<I, O>>>,
    normalize: Option<fn(O) -> O>,
    fallback: Option<O>,
}

impl<I, O> ExtractionChain<I, O>
where
    I: ?Sized + Sync,
    O: Payload + Clone,
{
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            strategies: Vec::new(),
            normalize: None,
            fallback: None,
        }
    }

    /// Append a strategy. Order of calls is priority order.
    pub fn then(mut self, strategy: impl ExtractionStrategy<I, O> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Applied to every strategy's output before the emptiness check.
    pub fn normalize_with(mut self, normalize: fn(O) -> O) -> Self {
        self.normalize = Some(normalize);
        self
    }

    /// Value returned when every strategy fails.
    pub fn or_fallback(mut self, value: O) -> Self {
        self.fallback = Some(value);
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn extract(&self, input: &I) -> Result<ChainOutcome<O>, ChainError> {
        let mut attempts = Vec::with_capacity(self.strategies.len() + 1);

        for strategy in &self.strategies {
            let name = strategy.name().to_string();

            let result = match strategy.extract(input).await {
                Ok(output) => {
                    let output = match self.normalize {
                        Some(normalize) => normalize(output),
                        None => output,
                    };
                    if output.is_empty() {
                        Err(ExtractionFailure::Empty)
                    } else {
                        Ok(output)
                    }
                }
                Err(failure) => Err(failure),
            };

            match result {
                Ok(output) => {
                    debug!(source = %self.source, strategy = %name, "extraction succeeded");
                    attempts.push(ExtractionAttempt {
                        strategy: name.clone(),
                        succeeded: true,
                        output_summary: Some(output.summary()),
                        error: None,
                    });
                    return Ok(ChainOutcome {
                        output,
                        strategy_used: name,
                        attempts,
                    });
                }
                Err(failure) if failure.is_cancelled() => {
                    debug!(source = %self.source, strategy = %name, "extraction cancelled");
                    attempts.push(ExtractionAttempt {
                        strategy: name,
                        succeeded: false,
                        output_summary: None,
                        error: Some(failure.to_string()),
                    });
                    return Err(ChainError::Cancelled {
                        source_name: self.source.clone(),
                        attempts,
                    });
                }
                Err(failure) => {
                    warn!(
                        source = %self.source,
                        strategy = %name,
                        error = %failure,
                        "extraction strategy failed"
                    );
                    attempts.push(ExtractionAttempt {
                        strategy: name,
                        succeeded: false,
                        output_summary: None,
                        error: Some(failure.to_string()),
                    });
                }
            }
        }

        match &self.fallback {
            Some(value) => {
                warn!(source = %self.source, "all strategies failed, using fallback value");
                attempts.push(ExtractionAttempt {
                    strategy: SENTINEL_STRATEGY.to_string(),
                    succeeded: true,
                    output_summary: Some(value.summary()),
                    error: None,
                });
                Ok(ChainOutcome {
                    output: value.clone(),
                    strategy_used: SENTINEL_STRATEGY.to_string(),
                    attempts,
                })
            }
            None => Err(ChainError::Exhausted {
                source_name: self.source.clone(),
                attempts,
            }),
        }
    }
}

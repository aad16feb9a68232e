use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};
use prism_observability::AppMetrics;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("generation service '{service}' unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    #[error("generation service '{service}' returned an unusable response: {reason}")]
    InvalidResponse { service: String, reason: String },
}

/// Lazy, finite sequence of generated text chunks. Consumed once.
pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;

/// A text generation backend (an LLM completion endpoint or a local model).
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Streams the completion. Services without native streaming yield one chunk.
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, GenerationError> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

struct Timing {
    inner: TextStream,
    started: Instant,
    first_chunk: Option<Duration>,
    chunks: usize,
    metrics: Option<Arc<AppMetrics>>,
}

/// Forwards `inner`, recording time to the first non-empty chunk and total duration.
///
/// Empty chunks are dropped. Timing starts when this is called, so call it right
/// after the request is issued.
pub fn timed_stream(inner: TextStream, metrics: Option<Arc<AppMetrics>>) -> TextStream {
    let timing = Timing {
        inner,
        started: Instant::now(),
        first_chunk: None,
        chunks: 0,
        metrics,
    };

    stream::unfold(timing, |mut timing| async move {
        loop {
            match timing.inner.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    if timing.first_chunk.is_none() {
                        let elapsed = timing.started.elapsed();
                        timing.first_chunk = Some(elapsed);
                        debug!(
                            first_chunk_ms = elapsed.as_millis() as u64,
                            "first chunk received"
                        );
                        if let Some(metrics) = &timing.metrics {
                            metrics.observe_first_chunk(elapsed);
                        }
                    }
                    timing.chunks += 1;
                    return Some((Ok(chunk), timing));
                }
                Some(Err(error)) => return Some((Err(error), timing)),
                None => {
                    let total = timing.started.elapsed();
                    info!(
                        chunks = timing.chunks,
                        first_chunk_ms = ?timing.first_chunk.map(|d| d.as_millis() as u64),
                        total_ms = total.as_millis() as u64,
                        "stream finished"
                    );
                    if let Some(metrics) = &timing.metrics {
                        metrics.observe_stream(total);
                    }
                    return None;
                }
            }
        }
    })
    .boxed()
}

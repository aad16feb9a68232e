use std::sync::Arc;
use std::time::Instant;

use prism_core::{ClassificationResult, ClassifierError, IntentLabel};
use prism_ml::IntentClassifier;
use prism_observability::AppMetrics;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::extract::{ExtractionError, NoParameters, ParameterExtractor};

pub const NO_HANDLER_MESSAGE: &str = "No handler matched the request.";

/// What a handler is invoked with.
#[derive(Debug, Clone)]
pub struct HandlerCall<'a, L> {
    pub intent: L,
    pub parameters: &'a Value,
    pub text: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerReply {
    pub text: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl HandlerReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Error)]
#[error("handler for '{intent}' rejected the call: {reason}")]
pub struct HandlerError {
    pub intent: String,
    pub reason: String,
}

/// Maps each intent of a closed set to its behavior.
pub trait IntentHandler: Send + Sync {
    type Label: IntentLabel;

    /// `Ok(None)` when no handler is bound to `call.intent`.
    fn handle(&self, call: HandlerCall<'_, Self::Label>)
        -> Result<Option<HandlerReply>, HandlerError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", bound(serialize = ""))]
pub enum DispatchOutcome<L> {
    Handled {
        classification: ClassificationResult<L>,
        parameters: Value,
        reply: HandlerReply,
    },
    NoHandler {
        classification: ClassificationResult<L>,
        message: String,
    },
}

impl<L> DispatchOutcome<L> {
    pub fn classification(&self) -> &ClassificationResult<L> {
        match self {
            Self::Handled { classification, .. } | Self::NoHandler { classification, .. } => {
                classification
            }
        }
    }

    pub fn reply(&self) -> Option<&HandlerReply> {
        match self {
            Self::Handled { reply, .. } => Some(reply),
            Self::NoHandler { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The classifier backend failed; never turned into a fallback intent.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Classify, extract parameters, run the bound handler.
pub struct Dispatcher<C, H, X = NoParameters> {
    classifier: C,
    handler: H,
    extractor: X,
    metrics: Arc<AppMetrics>,
}

impl<C, H> Dispatcher<C, H, NoParameters>
where
    C: IntentClassifier,
    H: IntentHandler<Label = C::Label>,
{
    pub fn new(classifier: C, handler: H) -> Self {
        Self {
            classifier,
            handler,
            extractor: NoParameters,
            metrics: AppMetrics::shared(),
        }
    }
}

impl<C, H, X> Dispatcher<C, H, X>
where
    C: IntentClassifier,
    H: IntentHandler<Label = C::Label>,
    X: ParameterExtractor<C::Label>,
{
    pub fn with_extractor<Y>(self, extractor: Y) -> Dispatcher<C, H, Y>
    where
        Y: ParameterExtractor<C::Label>,
    {
        Dispatcher {
            classifier: self.classifier,
            handler: self.handler,
            extractor,
            metrics: self.metrics,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Classifies `text` and runs the bound handler. Latency is recorded for failed
    /// requests too.
    #[instrument(skip_all)]
    pub async fn handle(&self, text: &str) -> Result<DispatchOutcome<C::Label>, DispatchError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let result = self.dispatch(text).await;
        self.metrics.observe_latency(started.elapsed());
        result
    }

    async fn dispatch(&self, text: &str) -> Result<DispatchOutcome<C::Label>, DispatchError> {
        let classification = match self.classifier.classify(text).await {
            Ok(classification) => classification,
            Err(error) => {
                self.metrics.inc_backend_failure();
                warn!(error = %error, "classification failed");
                return Err(error.into());
            }
        };
        self.metrics.inc_classification(!classification.is_none());

        let outcome = match classification.intent {
            None => DispatchOutcome::NoHandler {
                classification,
                message: NO_HANDLER_MESSAGE.to_string(),
            },
            Some(intent) => {
                let parameters = self.extractor.extract(intent, text).await?;
                let call = HandlerCall {
                    intent,
                    parameters: &parameters,
                    text,
                };
                match self.handler.handle(call)? {
                    Some(reply) => DispatchOutcome::Handled {
                        classification,
                        parameters,
                        reply,
                    },
                    None => DispatchOutcome::NoHandler {
                        classification,
                        message: NO_HANDLER_MESSAGE.to_string(),
                    },
                }
            }
        };

        info!(
            intent = %outcome.classification().qualified_name(),
            score = outcome.classification().score,
            handled = outcome.reply().is_some(),
            "request dispatched"
        );

        Ok(outcome)
    }
}

use prism_core::{IntentLabel, ParameterSchema};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::generation::{GenerationError, GenerationService};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("missing required parameters for '{intent}': {missing:?}")]
    MissingParameters {
        intent: String,
        missing: Vec<String>,
    },

    #[error("could not read parameters for '{intent}': {reason}")]
    Malformed { intent: String, reason: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Turns the user's text into the arguments a handler expects.
pub trait ParameterExtractor<L: IntentLabel>: Send + Sync {
    async fn extract(&self, intent: L, text: &str) -> Result<Value, ExtractionError>;
}

/// Handlers that take no arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParameters;

impl<L: IntentLabel> ParameterExtractor<L> for NoParameters {
    async fn extract(&self, _intent: L, _text: &str) -> Result<Value, ExtractionError> {
        Ok(Value::Object(Map::new()))
    }
}

/// Asks a generation service for a JSON object matching the intent's parameter schema.
pub struct SchemaPromptExtractor<G> {
    service: G,
}

impl<G: GenerationService> SchemaPromptExtractor<G> {
    pub fn new(service: G) -> Self {
        Self { service }
    }

    pub fn prompt(schema: &ParameterSchema, text: &str) -> String {
        let description = schema.description.as_deref().unwrap_or("");
        format!(
            "Extract the arguments for the function `{name}` from the user query.\n\
             {description}\n\
             Schema: {parameters}\n\
             Reply with a single JSON object and nothing else.\n\
             Query: {text}",
            name = schema.name,
            parameters = schema.parameters,
        )
    }
}

impl<L, G> ParameterExtractor<L> for SchemaPromptExtractor<G>
where
    L: IntentLabel,
    G: GenerationService,
{
    async fn extract(&self, intent: L, text: &str) -> Result<Value, ExtractionError> {
        let Some(schema) = intent.parameter_schema() else {
            return Ok(Value::Object(Map::new()));
        };

        let completion = self
            .service
            .generate(&Self::prompt(&schema, text))
            .await?;
        let parameters = parse_json_object(&completion).ok_or_else(|| {
            ExtractionError::Malformed {
                intent: intent.name().to_string(),
                reason: "completion held no JSON object".to_string(),
            }
        })?;
        debug!(intent = intent.name(), service = self.service.name(), "parameters extracted");

        check_required(intent, &schema, parameters)
    }
}

/// Fails when any `required` name of the schema is absent or null.
pub fn check_required<L: IntentLabel>(
    intent: L,
    schema: &ParameterSchema,
    parameters: Value,
) -> Result<Value, ExtractionError> {
    let missing = schema
        .required()
        .into_iter()
        .filter(|name| parameters.get(name).map_or(true, Value::is_null))
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    if missing.is_empty() {
        Ok(parameters)
    } else {
        Err(ExtractionError::MissingParameters {
            intent: intent.name().to_string(),
            missing,
        })
    }
}

/// First `{..}` block of a completion, tolerating surrounding prose or code fences.
fn parse_json_object(completion: &str) -> Option<Value> {
    let start = completion.find('{')?;
    let end = completion.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<Value>(&completion[start..=end])
        .ok()
        .filter(Value::is_object)
}

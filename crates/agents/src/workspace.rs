use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use prism_core::{Intent, IntentLabel, IntentRegistry, ParameterSchema, RegistryError};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::dispatcher::{HandlerCall, HandlerError, HandlerReply, IntentHandler};
use crate::extract::{check_required, ExtractionError, ParameterExtractor};

pub const DEFAULT_DATASET: &str = "data/intents/workspace.jsonl";

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid year regex"));

/// Requests the internal workspace assistant knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkspaceIntent {
    BalanceSheetDocuments,
    Employees,
}

impl WorkspaceIntent {
    pub const ALL: [Self; 2] = [Self::BalanceSheetDocuments, Self::Employees];

    fn utterances(self) -> &'static [&'static str] {
        match self {
            Self::BalanceSheetDocuments => &[
                "balancesheet_documents",
                "balance sheet documents",
                "documents",
                "tools",
                "metrics",
            ],
            Self::Employees => &[
                "employee business domain",
                "paternity leave",
                "maternity leave",
                "benefits",
                "health insurance",
                "vacation",
            ],
        }
    }
}

impl IntentLabel for WorkspaceIntent {
    fn name(self) -> &'static str {
        match self {
            Self::BalanceSheetDocuments => "balancesheet_documents",
            Self::Employees => "employees",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "balancesheet_documents" => Some(Self::BalanceSheetDocuments),
            "employees" => Some(Self::Employees),
            _ => None,
        }
    }

    fn parameter_schema(self) -> Option<ParameterSchema> {
        Some(match self {
            Self::BalanceSheetDocuments => ParameterSchema::new(
                "balancesheet_documents",
                json!({
                    "type": "object",
                    "properties": { "year": { "type": "string" } },
                    "required": ["year"]
                }),
            ),
            Self::Employees => ParameterSchema::new(
                "employees",
                json!({
                    "type": "object",
                    "properties": {
                        "employee": {
                            "type": "object",
                            "description": "information about the employee"
                        },
                        "question": {
                            "type": "string",
                            "description": "employee questions"
                        }
                    },
                    "required": ["employee", "question"]
                }),
            )
            .with_description("Answers employee questions about benefits and leave."),
        })
    }
}

/// The built-in workspace routes, optionally under a tenant namespace.
pub fn default_registry(
    namespace: Option<String>,
) -> Result<IntentRegistry<WorkspaceIntent>, RegistryError> {
    let mut registry = match namespace {
        Some(namespace) => IntentRegistry::with_namespace(namespace),
        None => IntentRegistry::new(),
    };
    for intent in WorkspaceIntent::ALL {
        registry.register(Intent::new(intent, intent.utterances().iter().copied()))?;
    }
    Ok(registry)
}

/// Dataset path from `PRISM_INTENT_DATASET`, defaulting to [`DEFAULT_DATASET`].
pub fn dataset_path() -> PathBuf {
    env::var("PRISM_INTENT_DATASET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATASET))
}

/// Loads the JSONL dataset at `path`, falling back to [`default_registry`] when it is
/// missing or unusable.
pub fn load_registry(
    path: &Path,
    namespace: Option<String>,
) -> Result<Arc<IntentRegistry<WorkspaceIntent>>, RegistryError> {
    if path.exists() {
        match IntentRegistry::from_jsonl(path, namespace.clone()) {
            Ok(registry) => {
                info!(path = %path.display(), intents = registry.len(), "intent dataset loaded");
                return Ok(Arc::new(registry));
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "intent dataset unusable, using built-in routes");
            }
        }
    }

    default_registry(namespace).map(Arc::new)
}

/// Handler replies for the workspace routes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceHandler;

impl IntentHandler for WorkspaceHandler {
    type Label = WorkspaceIntent;

    fn handle(
        &self,
        call: HandlerCall<'_, WorkspaceIntent>,
    ) -> Result<Option<HandlerReply>, HandlerError> {
        let reply = match call.intent {
            WorkspaceIntent::BalanceSheetDocuments => {
                let year = call
                    .parameters
                    .get("year")
                    .and_then(Value::as_str)
                    .ok_or_else(|| HandlerError {
                        intent: call.intent.name().to_string(),
                        reason: "year is required".to_string(),
                    })?;
                HandlerReply::text(format!("Year: {year}"))
            }
            WorkspaceIntent::Employees => {
                HandlerReply::text("Employees").with_payload(call.parameters.clone())
            }
        };
        Ok(Some(reply))
    }
}

/// Rule-based parameters for the workspace routes. A request without a year asks
/// about the current one.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceParameters;

impl ParameterExtractor<WorkspaceIntent> for WorkspaceParameters {
    async fn extract(&self, intent: WorkspaceIntent, text: &str) -> Result<Value, ExtractionError> {
        let parameters = match intent {
            WorkspaceIntent::BalanceSheetDocuments => {
                let year = YEAR
                    .find(text)
                    .map(|found| found.as_str().to_string())
                    .unwrap_or_else(|| Utc::now().year().to_string());
                json!({ "year": year })
            }
            WorkspaceIntent::Employees => json!({
                "employee": {},
                "question": text.trim(),
            }),
        };

        match intent.parameter_schema() {
            Some(schema) => check_required(intent, &schema, parameters),
            None => Ok(parameters),
        }
    }
}

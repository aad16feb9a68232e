mod dispatcher;
mod extract;
mod generation;
mod private;
mod sessions;
pub mod workspace;

pub use dispatcher::{
    DispatchError, DispatchOutcome, Dispatcher, HandlerCall, HandlerError, HandlerReply,
    IntentHandler, NO_HANDLER_MESSAGE,
};
pub use extract::{
    check_required, ExtractionError, NoParameters, ParameterExtractor, SchemaPromptExtractor,
};
pub use generation::{timed_stream, GenerationError, GenerationService, TextStream};
pub use private::{PrivateAnswer, PrivateCompletion, PrivateCompletionError, PromptTemplate};
pub use sessions::{MappingSessions, DEFAULT_MAPPING_TTL_SECONDS};
pub use workspace::{WorkspaceHandler, WorkspaceIntent, WorkspaceParameters};

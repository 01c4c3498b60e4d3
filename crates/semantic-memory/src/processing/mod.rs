//! Pipeline processing: step handlers, their registry and the orchestrator

mod deletion;
mod handler;
mod orchestrator;
mod registry;

pub use deletion::DeleteDocumentHandler;
pub use handler::{
    PipelineContext, StepError, StepErrorKind, StepHandler, StepOutput, CANCELLED_REASON,
};
pub use orchestrator::Orchestrator;
pub use registry::HandlerRegistry;

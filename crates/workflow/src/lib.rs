pub mod context;
pub mod engine;
pub mod registry;
pub mod run;

pub use context::{WorkflowContext, WorkflowHost};
pub use engine::WorkflowBody;
pub use registry::WorkflowRegistry;
pub use run::{Gate, RunState, WorkflowEvent, WorkflowRun};

pub mod command;
pub mod event;

pub use command::{Command, CommandResult, CommandType, ErrorPayload};
pub use event::{Event, EventFrame, EventSink};

mod claude;
mod gemini;
mod none;

pub use claude::ClaudeParser;
pub use gemini::GeminiParser;
pub use none::NoneParser;

use crate::parser::Parser;

/// Resolve a named parser, as used by `parser_override` on an
/// `ExecutionContext` or a terminal node's configured dialect.
pub fn by_name(name: &str) -> Option<Box<dyn Parser>> {
    match name {
        "claude" => Some(Box::new(ClaudeParser)),
        "gemini" => Some(Box::new(GeminiParser)),
        "none" => Some(Box::new(NoneParser)),
        _ => None,
    }
}

//! The `NONE` identity parser: returns the whole buffer as one text
//! section and always reports ready.

use nerve_domain::response::ParsedResponse;

use crate::parser::Parser;

pub struct NoneParser;

impl Parser for NoneParser {
    fn is_ready(&self, _buffer: &str) -> bool {
        true
    }

    fn parse(&self, buffer: &str) -> ParsedResponse {
        ParsedResponse::whole_buffer(buffer)
    }
}

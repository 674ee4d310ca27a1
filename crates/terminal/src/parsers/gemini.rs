//! Parser for a Gemini-style interactive CLI.
//!
//! No reference implementation exists for this dialect (the source
//! project only ships a Claude-style parser); marker strings below are
//! an invented but representative approximation of that CLI family's
//! status line and tool-call rendering, following the same scan-from-
//! the-tail readiness strategy as `ClaudeParser`. See DESIGN.md for the
//! explicit note on this choice.

use regex::Regex;
use std::sync::OnceLock;

use nerve_domain::response::{ParsedResponse, Section};

use crate::parser::Parser;

const STATUS_MARKERS: [&str; 2] = ["tokens used", "Type your message"];
const BUSY_MARKERS: [&str; 2] = ["Waiting for model", "esc to cancel"];

fn tool_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^●\s+(\w+)\((.*)$").unwrap())
}

fn tokens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*tokens used").unwrap())
}

pub struct GeminiParser;

impl GeminiParser {
    fn latest_status_line(lines: &[&str]) -> Option<usize> {
        let start = lines.len().saturating_sub(50);
        lines[start..]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| STATUS_MARKERS.iter().any(|m| l.contains(m)))
            .map(|(i, _)| start + i)
    }
}

impl Parser for GeminiParser {
    fn is_ready(&self, buffer: &str) -> bool {
        let lines: Vec<&str> = buffer.lines().collect();
        let Some(status_idx) = Self::latest_status_line(&lines) else {
            return false;
        };
        !lines[status_idx..]
            .iter()
            .any(|l| BUSY_MARKERS.iter().any(|m| l.contains(m)))
    }

    fn parse(&self, buffer: &str) -> ParsedResponse {
        let lines: Vec<&str> = buffer.lines().collect();
        let start = lines
            .iter()
            .rposition(|l| l.trim_start().starts_with('>'))
            .map(|i| i + 1)
            .unwrap_or(0);
        let end = lines
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, l)| STATUS_MARKERS.iter().any(|m| l.contains(m)))
            .map(|(i, _)| i)
            .unwrap_or(lines.len());

        let mut sections = Vec::new();
        for line in &lines[start..end] {
            let t = line.trim_start();
            if t.is_empty() {
                continue;
            }
            if let Some(caps) = tool_call_re().captures(t) {
                sections.push(Section::tool_call(caps.get(1).unwrap().as_str(), t));
            } else {
                sections.push(Section::text(t));
            }
        }

        let tokens = lines
            .iter()
            .rev()
            .find(|l| l.contains("tokens used"))
            .and_then(|l| tokens_re().captures(l))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());

        ParsedResponse {
            raw: buffer.to_string(),
            sections,
            is_complete: true,
            is_ready: self.is_ready(buffer),
            tokens,
        }
    }

    fn submit_sequence(&self) -> &'static [u8] {
        b"\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_while_waiting_for_model() {
        let buf = "> hi\nWaiting for model...\n120 tokens used\nWaiting for model\n";
        assert!(!GeminiParser.is_ready(buf));
    }

    #[test]
    fn ready_after_tokens_used_with_no_trailing_busy_marker() {
        let buf = "> hi\nhello there\n120 tokens used\n";
        assert!(GeminiParser.is_ready(buf));
    }

    #[test]
    fn parses_tool_call_section() {
        let buf = "> list files\n●  ls(-la)\n42 tokens used\n";
        let resp = GeminiParser.parse(buf);
        assert_eq!(resp.sections.len(), 1);
        assert_eq!(resp.sections[0].kind, nerve_domain::response::SectionType::ToolCall);
    }
}

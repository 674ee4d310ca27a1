//! Parser for a Claude-style interactive CLI.
//!
//! Grounded on the reference implementation's `core/parsers/claude.py`:
//! readiness is read off the trailing status line ("-- INSERT --" /
//! "? for shortcuts"), the response region runs from the last "> "
//! prompt to the next prompt line, and sections are split on the
//! "∴" (thinking) and "⏺ Tool(args" (tool call) markers.

use regex::Regex;
use std::sync::OnceLock;

use nerve_domain::response::{ParsedResponse, Section};

use crate::parser::Parser;

const STATUS_MARKERS: [&str; 2] = ["-- INSERT --", "? for shortcuts"];
const BUSY_MARKERS: [&str; 2] = ["esc to interrupt", "esc to cancel"];

fn tool_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^⏺\s+(\w+)\((.*)$").unwrap())
}

fn tokens_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*tokens").unwrap())
}

pub struct ClaudeParser;

impl ClaudeParser {
    /// Index of the latest status line among `lines`, scanning from
    /// the tail (last 50 lines, matching the reference implementation).
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

impl Parser for ClaudeParser {
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
        let response = extract_response(buffer);
        let sections = parse_sections(&response);
        let tokens = extract_tokens(buffer);
        ParsedResponse {
            raw: buffer.to_string(),
            sections,
            is_complete: true,
            is_ready: self.is_ready(buffer),
            tokens,
        }
    }
}

/// Find the last "> " prompt line (excluding tab-to-accept suggestion
/// lines) as the start of the response region, and the nearest prompt
/// line preceding an "-- INSERT --" status line as its end.
fn extract_response(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();

    let is_prompt_line = |l: &str| {
        let t = l.trim_start();
        (t.starts_with("> ") || t == ">") && !l.contains("(tab to accept)")
    };

    let Some(start) = lines.iter().rposition(|l| is_prompt_line(l)) else {
        return content.to_string();
    };

    let mut end = lines.len();
    for (i, l) in lines.iter().enumerate().skip(start + 1) {
        if l.contains("-- INSERT --") {
            // walk back to the nearest preceding prompt line.
            if let Some(p) = lines[start + 1..i].iter().rposition(|l2| is_prompt_line(l2)) {
                end = start + 1 + p;
            } else {
                end = i;
            }
            break;
        }
    }

    lines[start + 1..end].join("\n")
}

fn parse_sections(response: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut lines = response.lines().peekable();
    let mut thinking_buf: Option<Vec<&str>> = None;

    let flush_thinking = |buf: &mut Option<Vec<&str>>, sections: &mut Vec<Section>| {
        if let Some(b) = buf.take() {
            if !b.is_empty() {
                sections.push(Section::thinking(b.join("\n")));
            }
        }
    };

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix('∴') {
            flush_thinking(&mut thinking_buf, &mut sections);
            let mut buf = vec![rest.trim_start()];
            while let Some(next) = lines.peek() {
                let nt = next.trim_start();
                if nt.starts_with('⏺') || nt.starts_with('∴') {
                    break;
                }
                buf.push(lines.next().unwrap());
            }
            thinking_buf = Some(buf);
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('⏺') {
            flush_thinking(&mut thinking_buf, &mut sections);
            let rest = rest.trim_start();
            if let Some(caps) = tool_call_re().captures(trimmed) {
                let tool = caps.get(1).unwrap().as_str();
                sections.push(Section::tool_call(tool, rest));
            } else {
                sections.push(Section::text(rest));
            }
            continue;
        }

        if let Some(buf) = thinking_buf.as_mut() {
            buf.push(line);
        } else if !trimmed.is_empty() {
            sections.push(Section::text(trimmed));
        }
    }
    flush_thinking(&mut thinking_buf, &mut sections);
    sections
}

fn extract_tokens(content: &str) -> Option<u64> {
    let status_line = content
        .lines()
        .rev()
        .find(|l| (l.contains("-- INSERT --") || l.contains("? for shortcuts")) && l.contains("tokens"))?;
    tokens_re()
        .captures(status_line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_while_busy_marker_present_after_status() {
        let buf = "> hello\nesc to interrupt\n-- INSERT --\nfoo\nesc to interrupt\n";
        assert!(!ClaudeParser.is_ready(buf));
    }

    #[test]
    fn ready_when_no_busy_marker_after_latest_status() {
        let buf = "esc to interrupt\n-- INSERT --\n12000 tokens\n";
        assert!(ClaudeParser.is_ready(buf));
    }

    #[test]
    fn parses_tool_call_and_text_sections() {
        let response = "⏺ Bash(ls -la)\nsome text\n⏺ done";
        let sections = parse_sections(response);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].kind, nerve_domain::response::SectionType::ToolCall);
        assert_eq!(sections[1].kind, nerve_domain::response::SectionType::Text);
    }

    #[test]
    fn extracts_token_count_from_status_line() {
        let buf = "blah\n-- INSERT --  3500 tokens\n";
        assert_eq!(extract_tokens(buf), Some(3500));
    }

    #[test]
    fn idempotent_on_stable_buffer() {
        let buf = "> do the thing\n⏺ doing it\n-- INSERT --\n";
        let p = ClaudeParser;
        let a = p.parse(buf);
        let b = p.parse(buf);
        assert_eq!(a.raw, b.raw);
        assert_eq!(a.sections.len(), b.sections.len());
    }
}

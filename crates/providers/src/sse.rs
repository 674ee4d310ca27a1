//! Shared SSE plumbing: draining `data:` lines out of a growing text
//! buffer and turning a chunked HTTP response into a stream of parsed
//! events. Mirrors the teacher's `providers::sse` module.

use nerve_domain::error::{Error, Result};
use nerve_domain::stream::StreamEvent;

/// Drain complete `data: ...` lines from `buffer`, leaving any trailing
/// partial line in place for the next chunk.
pub fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        let Some(pos) = buffer.find('\n') else { break };
        let line = buffer[..pos].trim_end_matches('\r').to_string();
        buffer.drain(..=pos);
        if let Some(data) = line.strip_prefix("data:") {
            out.push(data.trim_start().to_string());
        }
    }
    out
}

/// Turn a chunked `reqwest::Response` into a stream of `StreamEvent`s
/// using `parse_data` to interpret each `data:` payload. Emits a
/// fallback `Done` if the upstream closed without ever sending one.
pub fn sse_response_stream<F>(
    mut response: reqwest::Response,
    parse_data: F,
) -> nerve_domain::stream::BoxStream<'static, Result<StreamEvent>>
where
    F: Fn(&str) -> Vec<Result<StreamEvent>> + Send + Sync + 'static,
{
    Box::pin(async_stream::stream! {
        let mut buffer = String::new();
        let mut done_emitted = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        for event in parse_data(&data) {
                            if let Ok(StreamEvent::Done { .. }) = &event {
                                done_emitted = true;
                            }
                            yield event;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    yield Err(Error::Http(format!("stream read error: {e}")));
                    break;
                }
            }
        }

        if !buffer.trim().is_empty() {
            for event in parse_data(&buffer) {
                if let Ok(StreamEvent::Done { .. }) = &event {
                    done_emitted = true;
                }
                yield event;
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done { usage: None, finish_reason: None });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_complete_lines_only() {
        let mut buf = "data: {\"a\":1}\nda".to_string();
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["{\"a\":1}"]);
        assert_eq!(buf, "da");
    }

    #[test]
    fn ignores_non_data_lines() {
        let mut buf = "event: ping\ndata: ok\n\n".to_string();
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["ok"]);
    }
}

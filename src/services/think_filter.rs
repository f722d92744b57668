// Thinking Tag Filter
// Removes <think>/<thinking> reasoning spans from model output, both for
// live token streams and for complete response bodies

use crate::services::providers::ProviderError;
use futures_core::Stream;
use futures_util::StreamExt;
use regex::Regex;
use std::sync::OnceLock;

/// Characters held back while outside a tag, so a marker split across two
/// network chunks is still recognised.
pub const THINKING_TAG_BUFFER_SIZE: usize = 20;

const OPEN_MARKERS: [&str; 2] = ["<think>", "<thinking>"];
const CLOSE_MARKERS: [&str; 2] = ["</think>", "</thinking>"];

// Longest closing marker minus one.
const CLOSE_MARKER_TAIL: usize = 10;

/// Finds the earliest marker, ASCII case-insensitively. Returns (byte offset, marker length).
fn find_marker(buffer: &str, markers: &[&str]) -> Option<(usize, usize)> {
    // ASCII lowering keeps byte offsets identical to `buffer`.
    let lowered = buffer.to_ascii_lowercase();
    markers
        .iter()
        .filter_map(|m| lowered.find(m).map(|pos| (pos, m.len())))
        .min_by_key(|(pos, _)| *pos)
}

/// Byte offset where the last `keep` characters of `s` begin.
fn tail_start(s: &str, keep: usize) -> usize {
    if keep == 0 {
        return s.len();
    }
    s.char_indices()
        .rev()
        .nth(keep - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Stateful single-stream filter.
///
/// Feed chunks in arrival order with [`ThinkFilter::push`] and call
/// [`ThinkFilter::finish`] once the source ends. Output is delayed by at most
/// [`THINKING_TAG_BUFFER_SIZE`] characters.
///
/// Inside a tag nothing is emitted, but the last 10
/// characters are kept so a closing marker split across chunks is still found.
///
/// An opening marker that is never closed suppresses everything after it,
/// including whatever is still buffered at end of stream.
#[derive(Debug, Default)]
pub struct ThinkFilter {
    buffer: String,
    in_tag: bool,
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_tag(&self) -> bool {
        self.in_tag
    }

    /// Returns the text that can be released after this chunk, if any.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buffer.push_str(chunk);
        let mut output = String::new();

        loop {
            if !self.in_tag {
                if let Some((pos, len)) = find_marker(&self.buffer, &OPEN_MARKERS) {
                    output.push_str(&self.buffer[..pos]);
                    self.buffer.drain(..pos + len);
                    self.in_tag = true;
                    continue;
                }
                let split = tail_start(&self.buffer, THINKING_TAG_BUFFER_SIZE);
                output.extend(self.buffer.drain(..split));
                break;
            }

            if let Some((pos, len)) = find_marker(&self.buffer, &CLOSE_MARKERS) {
                self.buffer.drain(..pos + len);
                self.in_tag = false;
                continue;
            }
            // Inside a tag nothing is released; only a possible partial
            // closing marker survives.
            let split = tail_start(&self.buffer, CLOSE_MARKER_TAIL);
            self.buffer.drain(..split);
            break;
        }

        if output.is_empty() {
            None
        } else {
            Some(output)
        }
    }

    /// Flush at end of stream. Nothing is released if a tag is still open.
    pub fn finish(self) -> Option<String> {
        if self.in_tag || self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }
}

/// Wrap a raw chunk stream so every yielded chunk has thinking spans removed.
///
/// The first `Err` from the source is forwarded and ends the stream; chunks
/// already yielded stay valid.
pub fn filter_thinking<S>(source: S) -> impl Stream<Item = Result<String, ProviderError>> + Send
where
    S: Stream<Item = Result<String, ProviderError>> + Send + 'static,
{
    async_stream::stream! {
        let mut filter = ThinkFilter::new();
        let mut source = Box::pin(source);

        while let Some(item) = source.next().await {
            match item {
                Ok(chunk) => {
                    if let Some(out) = filter.push(&chunk) {
                        yield Ok(out);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        if let Some(rest) = filter.finish() {
            yield Ok(rest);
        }
    }
}

fn stray_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</?think(?:ing)?>").unwrap())
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n\s*\n").unwrap())
}

/// Clean a complete (non-streamed) response body.
///
/// Runs the stream filter over the whole body, then drops stray unmatched
/// markers, collapses runs of blank lines and trims.
pub fn strip_thinking_tags(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut filter = ThinkFilter::new();
    let mut kept = filter.push(text).unwrap_or_default();
    if let Some(rest) = filter.finish() {
        kept.push_str(&rest);
    }

    let kept = stray_marker_re().replace_all(&kept, "");
    let kept = blank_run_re().replace_all(&kept, "\n\n");
    kept.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn run(chunks: &[&str]) -> (Vec<String>, String) {
        let mut filter = ThinkFilter::new();
        let mut out = Vec::new();
        for c in chunks {
            if let Some(s) = filter.push(c) {
                out.push(s);
            }
        }
        if let Some(s) = filter.finish() {
            out.push(s);
        }
        let joined = out.concat();
        (out, joined)
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let (_, joined) = run(&["He said <th", "ink>secret</think> done"]);
        assert_eq!(joined, "He said  done");
    }

    #[test]
    fn test_unterminated_tag_suppresses_rest_of_stream() {
        let (_, joined) = run(&["Before <think>never closes"]);
        assert_eq!(joined, "Before ");

        let (_, joined) = run(&["Before <thinking>", "still thinking", " and more text later"]);
        assert_eq!(joined, "Before ");
    }

    #[test]
    fn test_long_form_and_case_insensitive_markers() {
        let (_, joined) = run(&["A<THINKING>x</Thinking>B", "<think>y</THINK>C"]);
        assert_eq!(joined, "ABC");
    }

    #[test]
    fn test_closing_marker_split_across_chunks() {
        let (_, joined) = run(&["start <think>lots of hidden reasoning here </thi", "nk>visible"]);
        assert_eq!(joined, "start visible");
    }

    #[test]
    fn test_every_chunk_boundary() {
        let input = "前言<think>内部推理过程</think>正文内容，这里是一段比较长的输出文本。<thinking>再想想</thinking>结尾";
        let expected = "前言正文内容，这里是一段比较长的输出文本。结尾";
        let chars: Vec<char> = input.chars().collect();

        for cut in 0..=chars.len() {
            let a: String = chars[..cut].iter().collect();
            let b: String = chars[cut..].iter().collect();
            let (_, joined) = run(&[&a, &b]);
            assert_eq!(joined, expected, "cut at {}", cut);
        }

        let singles: Vec<String> = chars.iter().map(|c| c.to_string()).collect();
        let refs: Vec<&str> = singles.iter().map(|s| s.as_str()).collect();
        assert_eq!(run(&refs).1, expected);
    }

    #[test]
    fn test_release_delay_is_bounded() {
        let mut filter = ThinkFilter::new();
        let text = "x".repeat(50);
        let out = filter.push(&text).unwrap();
        assert_eq!(out.chars().count(), 50 - THINKING_TAG_BUFFER_SIZE);
        assert_eq!(filter.finish().unwrap().chars().count(), THINKING_TAG_BUFFER_SIZE);
    }

    #[test]
    fn test_multibyte_tail_is_char_aligned() {
        let mut filter = ThinkFilter::new();
        let out = filter.push(&"汉".repeat(30)).unwrap();
        assert_eq!(out, "汉".repeat(10));
    }

    #[test]
    fn test_strip_thinking_tags_body() {
        let body = "<think>plan the answer</think>\n\nFinal text.\n\n\n\nSecond para.</think>";
        assert_eq!(strip_thinking_tags(body), "Final text.\n\nSecond para.");
        assert_eq!(strip_thinking_tags("no tags here"), "no tags here");
        assert_eq!(strip_thinking_tags("kept <thinking>dropped forever"), "kept");
        assert_eq!(strip_thinking_tags(""), "");
    }

    #[tokio::test]
    async fn test_filter_thinking_stream() {
        let source = stream::iter(vec![
            Ok("Hello <th".to_string()),
            Ok("ink>hidden</think> world".to_string()),
        ]);
        let chunks: Vec<_> = filter_thinking(source).collect().await;
        let text: String = chunks.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(text, "Hello  world");
    }

    #[tokio::test]
    async fn test_filter_thinking_stream_stops_at_error() {
        let source = stream::iter(vec![
            Ok("a".repeat(30)),
            Err(ProviderError::StreamTerminated("connection reset".to_string())),
            Ok("never seen".to_string()),
        ]);
        let items: Vec<_> = filter_thinking(source).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &"a".repeat(10));
        assert!(matches!(items[1], Err(ProviderError::StreamTerminated(_))));
    }
}

// Text Processing Service
// Language profiling and length-bounded document segmentation

use crate::models::Segment;
use crate::services::providers::ProviderError;

/// CJK fraction above which a text counts as Chinese.
pub const DOMINANT_CHINESE_THRESHOLD: f64 = 0.1;

/// Default segment budget in effective-length units.
pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 500;

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Count CJK unified ideographs (U+4E00..=U+9FFF)
pub fn count_chinese_characters(text: &str) -> usize {
    text.chars().filter(|c| is_cjk_ideograph(*c)).count()
}

pub fn count_latin_letters(text: &str) -> usize {
    text.chars().filter(|c| c.is_ascii_alphabetic()).count()
}

/// Reader-perceived length of mixed-script text.
///
/// Any Chinese content makes the ideograph count the whole measure; Latin
/// letters only count for text without a single ideograph. Digits, spaces
/// and punctuation never contribute.
pub fn effective_length(text: &str) -> usize {
    let chinese = count_chinese_characters(text);
    if chinese > 0 {
        chinese
    } else {
        count_latin_letters(text)
    }
}

/// True iff the CJK share of all characters is strictly above `threshold`.
pub fn is_dominant_chinese_with(text: &str, threshold: f64) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    count_chinese_characters(text) as f64 / total as f64 > threshold
}

pub fn is_dominant_chinese(text: &str) -> bool {
    is_dominant_chinese_with(text, DOMINANT_CHINESE_THRESHOLD)
}

fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '；' | '!' | '?' | ';')
}

fn is_closing_mark(c: char) -> bool {
    matches!(c, '”' | '’' | '"' | '\'' | ')' | '）' | '】' | '」' | '』' | '》')
}

/// Split one paragraph into sentence units.
///
/// Units end at `。！？；` or their ASCII forms `!?;`. The ASCII period is not
/// a terminator, so English prose is only broken at `!?;`. Terminal
/// punctuation (and any closing quotes or brackets right after it) stays
/// attached to its sentence. Concatenating the units gives back the
/// paragraph unchanged.
pub fn split_sentences(paragraph: &str) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    let mut units = Vec::new();
    let mut buffer = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        buffer.push(ch);

        if is_sentence_terminal(ch) {
            while i + 1 < chars.len() && (is_closing_mark(chars[i + 1]) || is_sentence_terminal(chars[i + 1])) {
                i += 1;
                buffer.push(chars[i]);
            }
            units.push(std::mem::take(&mut buffer));
        }

        i += 1;
    }

    if !buffer.is_empty() {
        units.push(buffer);
    }

    units
}

fn push_segment(segments: &mut Vec<Segment>, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    segments.push(Segment {
        index: segments.len(),
        source_text: trimmed.to_string(),
        effective_length: effective_length(trimmed),
    });
}

/// Split a document into ordered segments of at most `max_chars` effective
/// length.
///
/// Paragraphs are newline-delimited and blank ones are dropped. A paragraph
/// within budget becomes one segment; a longer one is packed greedily from
/// whole sentences. A sentence that alone exceeds the budget is emitted as
/// its own segment, never cut.
pub fn split_text_into_segments(text: &str, max_chars: usize) -> Result<Vec<Segment>, ProviderError> {
    if max_chars == 0 {
        return Err(ProviderError::Configuration(
            "max segment length must be greater than zero".to_string(),
        ));
    }

    let mut segments = Vec::new();

    for para in text.split('\n') {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        if effective_length(para) <= max_chars {
            push_segment(&mut segments, para);
            continue;
        }

        let mut current = String::new();
        for sentence in split_sentences(para) {
            if current.is_empty() {
                current = sentence;
                continue;
            }
            let candidate_len = effective_length(&format!("{}{}", current, sentence));
            if candidate_len > max_chars {
                push_segment(&mut segments, &current);
                current = sentence;
            } else {
                current.push_str(&sentence);
            }
        }
        push_segment(&mut segments, &current);
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_blank_lines(text: &str) -> Vec<String> {
        text.split('\n')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_effective_length_counts_chinese_first() {
        assert_eq!(effective_length("你好世界"), 4);
        assert_eq!(effective_length("Hello, World 42!"), 10);
        // Latin letters are ignored as soon as one ideograph is present.
        assert_eq!(effective_length("AI模型 and API"), 2);
        assert_eq!(effective_length("123 !?"), 0);
        assert_eq!(effective_length(""), 0);
    }

    #[test]
    fn test_effective_length_ignores_order() {
        let text = "深度学习 model 训练";
        let reversed: String = text.chars().rev().collect();
        assert_eq!(effective_length(text), effective_length(&reversed));

        let latin = "abc def, ghi.";
        let shuffled: String = latin.chars().rev().collect();
        assert_eq!(effective_length(latin), effective_length(&shuffled));
    }

    #[test]
    fn test_dominant_chinese_threshold_is_strict() {
        // 1 ideograph in 10 characters: exactly 0.10, not dominant.
        let exact = format!("中{}", "a".repeat(9));
        assert!(!is_dominant_chinese(&exact));

        // 2 in 10 is above the threshold.
        let above = format!("中文{}", "a".repeat(8));
        assert!(is_dominant_chinese(&above));

        assert!(!is_dominant_chinese(""));
        assert!(!is_dominant_chinese("Plain English sentence."));
        assert!(is_dominant_chinese("这是一个中文段落，包含 API 术语。"));
    }

    #[test]
    fn test_split_sentences_keeps_punctuation() {
        let units = split_sentences("第一句。第二句！第三句？尾巴");
        assert_eq!(units, vec!["第一句。", "第二句！", "第三句？", "尾巴"]);

        let units = split_sentences("他说：“好。”然后离开；结束");
        assert_eq!(units, vec!["他说：“好。”", "然后离开；", "结束"]);

        let units = split_sentences("Pi is 3.14 here. Next one! Done");
        assert_eq!(units, vec!["Pi is 3.14 here. Next one!", " Done"]);
    }

    #[test]
    fn test_split_does_not_break_at_periods() {
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu.";
        assert_eq!(split_sentences(text), vec![text]);

        let segments = split_text_into_segments(text, 30).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].source_text, text);
        assert!(segments[0].effective_length > 30);
    }

    #[test]
    fn test_split_two_paragraphs() {
        let segments = split_text_into_segments("这是第一段。\n\nThis is a short English paragraph.", 500).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].index, 0);
        assert_eq!(segments[0].source_text, "这是第一段。");
        assert_eq!(segments[1].index, 1);
        assert_eq!(segments[1].source_text, "This is a short English paragraph.");
        assert!(segments.iter().all(|s| s.effective_length <= 500));
    }

    #[test]
    fn test_split_drops_blank_paragraphs() {
        let segments = split_text_into_segments("\n\n  第一段  \n   \n\t\n第二段\n", 500).unwrap();
        let texts: Vec<_> = segments.iter().map(|s| s.source_text.as_str()).collect();
        assert_eq!(texts, vec!["第一段", "第二段"]);
    }

    #[test]
    fn test_split_long_paragraph_packs_sentences() {
        // Each sentence holds 10 ideographs.
        let sentence = format!("{}。", "字".repeat(10));
        let text = sentence.repeat(7);
        let segments = split_text_into_segments(&text, 25).unwrap();

        let lens: Vec<_> = segments.iter().map(|s| s.effective_length).collect();
        assert_eq!(lens, vec![20, 20, 20, 10]);
        assert_eq!(segments.iter().map(|s| s.source_text.as_str()).collect::<String>(), text);
    }

    #[test]
    fn test_split_oversized_sentence_is_kept_whole() {
        let long = format!("{}。", "长".repeat(40));
        let text = format!("短句一。{}短句二。", long);
        let segments = split_text_into_segments(&text, 10).unwrap();

        let texts: Vec<_> = segments.iter().map(|s| s.source_text.clone()).collect();
        assert_eq!(texts, vec!["短句一。".to_string(), long.clone(), "短句二。".to_string()]);
        assert_eq!(segments[1].effective_length, 40);
    }

    #[test]
    fn test_split_respects_budget_and_preserves_content() {
        let samples = [
            "第一段包含一些内容。第二句在这里！第三句呢？\n\nSecond paragraph in English. It has two sentences.",
            &format!("{}\n{}", "甲乙丙丁。".repeat(30), "Alpha beta gamma; delta epsilon! ".repeat(20)),
            "单行没有标点但是很长很长很长很长很长很长很长很长很长很长很长",
            "\n\n\n",
        ];

        for (n, text) in samples.iter().enumerate() {
            for max_chars in [5usize, 12, 50, 500] {
                let segments = split_text_into_segments(text, max_chars).unwrap();

                for (i, seg) in segments.iter().enumerate() {
                    assert_eq!(seg.index, i);
                    assert!(!seg.source_text.is_empty());
                    if seg.effective_length > max_chars {
                        assert_eq!(
                            split_sentences(&seg.source_text).len(),
                            1,
                            "sample {} max {}: oversized segment must be a single sentence",
                            n,
                            max_chars
                        );
                    }
                }

                let rebuilt: String = segments.iter().map(|s| s.source_text.as_str()).collect();
                let original: String = non_blank_lines(text).concat();
                assert_eq!(strip_ws(&rebuilt), strip_ws(&original), "sample {} max {}", n, max_chars);
            }
        }
    }

    #[test]
    fn test_split_rejects_zero_budget() {
        assert!(matches!(
            split_text_into_segments("text", 0),
            Err(ProviderError::Configuration(_))
        ));
    }
}

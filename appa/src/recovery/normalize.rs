use regex::Regex;
use std::sync::OnceLock;

fn sentence_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([.!?])([A-Z])").unwrap())
}

fn comma_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([,;:])([A-Za-z])").unwrap())
}

fn blank_runs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

fn spaced_hyphen_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\p{L}) - (\p{L})").unwrap())
}

/// Paragraph-preserving cleanup of model prose: restore missing spaces
/// after punctuation, collapse runs of blank lines to exactly one, and
/// rejoin spaced-out hyphenated compounds. Fenced code segments pass
/// through untouched.
pub fn normalize_plain_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, segment) in text.split("```").enumerate() {
        if i > 0 {
            out.push_str("```");
        }
        if i % 2 == 0 {
            out.push_str(&normalize_prose(segment));
        } else {
            out.push_str(segment);
        }
    }
    out
}

fn normalize_prose(text: &str) -> String {
    let text = sentence_gap_re().replace_all(text, "$1 $2");
    let text = comma_gap_re().replace_all(&text, "$1 $2");
    let mut text = blank_runs_re().replace_all(&text, "\n\n").into_owned();

    // `a - b - c` needs a second pass because matches cannot overlap
    for _ in 0..2 {
        let joined = spaced_hyphen_re().replace_all(&text, "$1-$2").into_owned();
        if joined == text {
            break;
        }
        text = joined;
    }

    text
}

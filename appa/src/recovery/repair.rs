use regex::Regex;
use std::sync::OnceLock;

fn quoted_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'([A-Za-z_][A-Za-z0-9_]*)'\s*:").unwrap())
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").unwrap())
}

/// Bounded syntactic cleanup for near-JSON model output. Strips prose and
/// markdown fences around the first object, rewrites single-quoted keys,
/// drops trailing commas and closes unbalanced braces and brackets. Makes
/// no attempt at semantic repair.
pub fn repair_json(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}').map(|i| i + 1).unwrap_or(raw.len());
    if end <= start {
        return None;
    }
    let mut candidate = raw[start..end].to_string();

    candidate = quoted_key_re().replace_all(&candidate, "\"$1\":").into_owned();
    candidate = trailing_comma_re().replace_all(&candidate, "$1").into_owned();
    candidate.push_str(&closers_for(&candidate));

    Some(candidate)
}

/// Closing braces and brackets still owed at the end of `text`, ignoring
/// anything inside string literals.
fn closers_for(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    let mut closers = String::new();
    if in_string {
        closers.push('"');
    }
    while let Some(c) = stack.pop() {
        closers.push(c);
    }
    closers
}

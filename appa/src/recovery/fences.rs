use regex::{Captures, Regex};
use std::sync::OnceLock;

const KNOWN_LANGUAGES: &[&str] = &[
    "python", "javascript", "typescript", "rust", "go", "java", "html", "css", "sql", "bash",
    "json", "yaml", "toml", "c", "cpp", "csharp", "ruby", "php", "kotlin", "swift", "text",
];

const KEYWORDS_BEFORE_PAREN: &[&str] = &[
    "if", "while", "for", "return", "match", "switch", "catch", "in", "not", "and", "or",
];

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // opening fence with an optional run-on tag, lazily up to the closing fence
    RE.get_or_init(|| Regex::new(r"(?s)```([a-zA-Z]*)[ \t]*(.*?)```").unwrap())
}

fn spaced_dot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z0-9_\)\]])\s+\.\s+([A-Za-z_])").unwrap())
}

fn spaced_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z0-9_]+)\s+\(\s*([^()\n]*?)\s*\)").unwrap())
}

/// Repairs malformed fenced code blocks in model output: infers missing
/// language tags, untangles concatenated tags (`pythonhtml` keeps the
/// trailing `html`), forces a newline between tag and code, and rejoins
/// method calls the model spaced out (`obj . m ( x )`).
pub fn repair_code_fences(text: &str) -> String {
    fence_re()
        .replace_all(text, |caps: &Captures| {
            let tag = caps.get(1).map_or("", |m| m.as_str());
            let body = caps.get(2).map_or("", |m| m.as_str());
            let (tag, body) = split_runon_tag(tag, body);
            let tag = if tag.is_empty() { infer_language(&body) } else { tag };
            let body = fix_spaced_calls(body.trim_matches('\n'));
            format!("```{}\n{}\n```", tag, body)
        })
        .into_owned()
}

/// A tag like `pythonhtml` is two concatenated tags; the trailing one wins.
/// A tag like `pythonprint` is a tag with code glued on; the code moves
/// into the body.
fn split_runon_tag(tag: &str, body: &str) -> (String, String) {
    let lower = tag.to_lowercase();
    if KNOWN_LANGUAGES.contains(&lower.as_str()) {
        return (lower, body.to_string());
    }
    for lang in KNOWN_LANGUAGES {
        if lower.len() > lang.len() && lower.ends_with(lang) {
            let head = &lower[..lower.len() - lang.len()];
            if KNOWN_LANGUAGES.contains(&head) {
                return (lang.to_string(), body.to_string());
            }
        }
    }
    for lang in KNOWN_LANGUAGES {
        if lower.len() > lang.len() && lower.starts_with(lang) {
            let rest = &tag[lang.len()..];
            return (lang.to_string(), format!("{}{}", rest, body));
        }
    }
    (String::new(), format!("{}{}", tag, body))
}

fn infer_language(code: &str) -> String {
    let lang = if code.contains("def ") || code.contains("import ") && code.contains(":") {
        "python"
    } else if code.contains("fn ") || code.contains("let mut ") {
        "rust"
    } else if code.contains("function ") || code.contains("const ") || code.contains("=>") {
        "javascript"
    } else if code.contains("</") || code.to_lowercase().contains("<html") {
        "html"
    } else if code.to_uppercase().contains("SELECT ") && code.to_uppercase().contains("FROM ") {
        "sql"
    } else {
        "text"
    };
    lang.to_string()
}

fn fix_spaced_calls(code: &str) -> String {
    let code = spaced_dot_re().replace_all(code, "$1.$2");
    spaced_call_re()
        .replace_all(&code, |caps: &Captures| {
            let name = &caps[1];
            if KEYWORDS_BEFORE_PAREN.contains(&name) {
                caps[0].to_string()
            } else {
                format!("{}({})", name, &caps[2])
            }
        })
        .into_owned()
}

use crate::models::{placeholder, BlockKind, StructuredResponse};
use crate::recovery::fences::repair_code_fences;
use crate::recovery::normalize::normalize_plain_text;
use regex::Regex;
use std::sync::OnceLock;

fn leftover_code_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{CODE_BLOCK_(\d+)\}").unwrap())
}

fn any_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(CODE_BLOCK|TABLE|IMAGE|MATH_BLOCK)_\d+\}").unwrap())
}

/// Flattens a structured payload to display text. Text blocks, when present,
/// supersede the plain `text` field. Block placeholders are substituted by
/// index; placeholders pointing past the block list are dropped rather than
/// surfaced, and blocks the text never referenced are appended at the end.
pub fn render_structured(response: &StructuredResponse) -> String {
    let mut text = match &response.text_blocks {
        Some(blocks) if !blocks.is_empty() => blocks
            .iter()
            .map(|b| b.render())
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => response.text.clone(),
    };

    for (i, block) in response.code_blocks.iter().enumerate() {
        let token = placeholder(BlockKind::Code, i);
        if text.contains(&token) {
            text = text.replace(&token, &block.to_fenced());
        } else {
            text.push_str(&block.to_fenced());
        }
    }
    for (i, table) in response.tables.iter().flatten().enumerate() {
        text = substitute_or_append(text, &placeholder(BlockKind::Table, i), &table.to_markdown());
    }
    for (i, image) in response.images.iter().flatten().enumerate() {
        text = substitute_or_append(text, &placeholder(BlockKind::Image, i), &image.to_markdown());
    }
    for (i, math) in response.math_blocks.iter().flatten().enumerate() {
        text = substitute_or_append(text, &placeholder(BlockKind::Math, i), &math.to_markdown());
    }

    let text = drop_dangling_placeholders(&text);

    if response.preserve_paragraphs {
        repair_code_fences(&normalize_plain_text(&text))
    } else {
        text
    }
}

fn substitute_or_append(text: String, token: &str, rendered: &str) -> String {
    if text.contains(token) {
        text.replace(token, rendered)
    } else {
        let mut text = text;
        text.push_str("\n\n");
        text.push_str(rendered);
        text
    }
}

/// Placeholders that survived substitution reference blocks the payload
/// never delivered; they are removed instead of leaking to the user.
fn drop_dangling_placeholders(text: &str) -> String {
    let text = leftover_code_placeholder_re().replace_all(text, "");
    any_placeholder_re().replace_all(&text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CodeBlock, TableBlock, TextBlock};

    fn response_with_text(text: &str) -> StructuredResponse {
        StructuredResponse {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_code_placeholder_substitution() {
        let mut response = response_with_text("Before {CODE_BLOCK_0} after");
        response.code_blocks = vec![CodeBlock {
            language: "rust".to_string(),
            code: "fn main() {}".to_string(),
        }];
        let rendered = render_structured(&response);
        assert!(rendered.contains("```rust\nfn main() {}\n```"));
        assert!(!rendered.contains("{CODE_BLOCK_0}"));
    }

    #[test]
    fn test_unreferenced_block_is_appended() {
        let mut response = response_with_text("No placeholder here");
        response.code_blocks = vec![CodeBlock {
            language: "python".to_string(),
            code: "print(1)".to_string(),
        }];
        let rendered = render_structured(&response);
        assert!(rendered.starts_with("No placeholder here"));
        assert!(rendered.contains("```python\nprint(1)\n```"));
    }

    #[test]
    fn test_dangling_placeholder_is_dropped() {
        let rendered = render_structured(&response_with_text("See {CODE_BLOCK_3} and {TABLE_0}"));
        assert!(!rendered.contains("{CODE_BLOCK_3}"));
        assert!(!rendered.contains("{TABLE_0}"));
    }

    #[test]
    fn test_text_blocks_supersede_text() {
        let mut response = response_with_text("ignored");
        response.text_blocks = Some(vec![
            TextBlock {
                content: "Title".to_string(),
                format_type: "heading".to_string(),
            },
            TextBlock {
                content: "body".to_string(),
                format_type: "paragraph".to_string(),
            },
        ]);
        assert_eq!(render_structured(&response), "## Title\n\nbody");
    }

    #[test]
    fn test_table_substitution() {
        let mut response = response_with_text("Data: {TABLE_0}");
        response.tables = Some(vec![TableBlock {
            headers: vec!["a".to_string()],
            rows: vec![vec!["1".to_string()]],
        }]);
        let rendered = render_structured(&response);
        assert!(rendered.contains("| a |"));
        assert!(rendered.contains("| 1 |"));
    }

    #[test]
    fn test_preserve_paragraphs_triggers_normalization() {
        let mut response = response_with_text("One.Two\n\n\n\nThree");
        response.preserve_paragraphs = true;
        assert_eq!(render_structured(&response), "One. Two\n\nThree");
    }
}

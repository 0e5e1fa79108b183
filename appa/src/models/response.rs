use serde::{Deserialize, Serialize};

/// Typed decomposition of a model response: prose plus addressable blocks
/// referenced from the text by index placeholders (`{CODE_BLOCK_0}`,
/// `{TABLE_1}`, ...). Each placeholder must appear exactly once per block;
/// leftovers are repaired downstream, never surfaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuredResponse {
    pub text: String,
    pub code_blocks: Vec<CodeBlock>,
    /// When present, supersedes `text` for rendering.
    pub text_blocks: Option<Vec<TextBlock>>,
    pub tables: Option<Vec<TableBlock>>,
    pub images: Option<Vec<ImageBlock>>,
    pub math_blocks: Option<Vec<MathBlock>>,
    pub preserve_paragraphs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeBlock {
    #[serde(default)]
    pub language: String,
    pub code: String,
}

impl CodeBlock {
    /// Render as a fenced block, newline-padded so it survives inline substitution.
    pub fn to_fenced(&self) -> String {
        format!("\n```{}\n{}\n```\n", self.language, self.code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    pub content: String,
    #[serde(default)]
    pub format_type: String,
}

impl TextBlock {
    pub fn render(&self) -> String {
        match self.format_type.as_str() {
            "heading" => format!("## {}", self.content),
            "list_item" => format!("- {}", self.content),
            "quote" => format!("> {}", self.content),
            _ => self.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableBlock {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl TableBlock {
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("| {} |\n", self.headers.join(" | ")));
        out.push_str(&format!(
            "|{}\n",
            " --- |".repeat(self.headers.len().max(1))
        ));
        for row in &self.rows {
            out.push_str(&format!("| {} |\n", row.join(" | ")));
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlock {
    pub url: String,
    #[serde(default)]
    pub alt: Option<String>,
}

impl ImageBlock {
    pub fn to_markdown(&self) -> String {
        format!("![{}]({})", self.alt.as_deref().unwrap_or(""), self.url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MathBlock {
    pub latex: String,
}

impl MathBlock {
    pub fn to_markdown(&self) -> String {
        format!("$$\n{}\n$$", self.latex)
    }
}

/// Placeholder token for a block of the given kind at the given index.
pub fn placeholder(kind: BlockKind, index: usize) -> String {
    format!("{{{}_{index}}}", kind.tag())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Code,
    Table,
    Image,
    Math,
}

impl BlockKind {
    pub fn tag(&self) -> &'static str {
        match self {
            BlockKind::Code => "CODE_BLOCK",
            BlockKind::Table => "TABLE",
            BlockKind::Image => "IMAGE",
            BlockKind::Math => "MATH_BLOCK",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_payload_parses() {
        let raw = r#"{
            "text": "Intro {CODE_BLOCK_0} outro",
            "codeBlocks": [{"language": "rust", "code": "fn main() {}"}],
            "preserveParagraphs": true
        }"#;
        let parsed: StructuredResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.code_blocks.len(), 1);
        assert!(parsed.preserve_paragraphs);
        assert!(parsed.text_blocks.is_none());
    }

    #[test]
    fn test_text_block_rendering() {
        let heading = TextBlock {
            content: "Setup".to_string(),
            format_type: "heading".to_string(),
        };
        let item = TextBlock {
            content: "install rustup".to_string(),
            format_type: "list_item".to_string(),
        };
        let quote = TextBlock {
            content: "fearless concurrency".to_string(),
            format_type: "quote".to_string(),
        };
        let plain = TextBlock {
            content: "just text".to_string(),
            format_type: "paragraph".to_string(),
        };
        assert_eq!(heading.render(), "## Setup");
        assert_eq!(item.render(), "- install rustup");
        assert_eq!(quote.render(), "> fearless concurrency");
        assert_eq!(plain.render(), "just text");
    }

    #[test]
    fn test_table_markdown_shape() {
        let table = TableBlock {
            headers: vec!["name".to_string(), "age".to_string()],
            rows: vec![vec!["alice".to_string(), "30".to_string()]],
        };
        let md = table.to_markdown();
        assert!(md.starts_with("| name | age |\n"));
        assert!(md.contains("| --- | --- |"));
        assert!(md.contains("| alice | 30 |"));
    }

    #[test]
    fn test_placeholder_tokens() {
        assert_eq!(placeholder(BlockKind::Code, 0), "{CODE_BLOCK_0}");
        assert_eq!(placeholder(BlockKind::Table, 2), "{TABLE_2}");
        assert_eq!(placeholder(BlockKind::Math, 1), "{MATH_BLOCK_1}");
    }
}

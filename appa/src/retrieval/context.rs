use crate::models::{format_history, ConversationTurn, RetrievedChunk};

/// Sentinel emitted instead of raw context when retrieval comes up empty or
/// too thin. Prompt assembly keys off this to forbid fabricated grounding.
pub const INSUFFICIENT_CONTEXT_NOTE: &str =
    "No relevant context was found in the document collection for this query.";

/// Search string for the vector store: the query, optionally suffixed with
/// the tail of the formatted conversation so follow-up questions carry their
/// referents.
pub fn build_search_string(
    query: &str,
    history: &[ConversationTurn],
    suffix_chars: usize,
) -> String {
    if history.is_empty() || suffix_chars == 0 {
        return query.to_string();
    }

    let formatted = format_history(history);
    let chars: Vec<char> = formatted.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(suffix_chars)..]
        .iter()
        .collect();

    format!("{query}\n{tail}")
}

/// Numbered context blocks, `[n]` matching the citation indices handed to
/// the model, joined by blank lines.
pub fn format_context_blocks(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] Source: {}, Tags: {}, Folder: {}\n\n{}",
                i + 1,
                chunk.filename,
                chunk.tags.join(", "),
                chunk.folder.as_deref().unwrap_or("-"),
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(n: u32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("c{n}"),
            content: format!("content {n}"),
            document_id: format!("d{n}"),
            filename: format!("file{n}.md"),
            tags: vec!["a".to_string(), "b".to_string()],
            folder: Some("docs".to_string()),
            distance: 0.1,
            relevance_score: None,
        }
    }

    #[test]
    fn test_search_string_without_history() {
        assert_eq!(build_search_string("q", &[], 200), "q");
    }

    #[test]
    fn test_search_string_takes_history_tail() {
        let history = vec![ConversationTurn::user("a".repeat(300))];
        let s = build_search_string("q", &history, 200);
        assert!(s.starts_with("q\n"));
        // query + newline + 200-char tail
        assert_eq!(s.chars().count(), 1 + 1 + 200);
    }

    #[test]
    fn test_context_blocks_are_numbered_from_one() {
        let ctx = format_context_blocks(&[chunk(1), chunk(2)]);
        assert!(ctx.starts_with("[1] Source: file1.md, Tags: a, b, Folder: docs\n\ncontent 1"));
        assert!(ctx.contains("\n\n[2] Source: file2.md"));
    }
}

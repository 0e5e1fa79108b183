use crate::models::{format_history, ConversationTurn};
use regex::Regex;
use std::sync::OnceLock;

pub const RAG_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions using the user's own documents. \
Ground every claim in the numbered context passages and cite them inline as [n]. \
Never fabricate sources or invent content that the passages do not support. \
If the passages do not contain the answer, say so plainly before offering anything else.";

pub const CODE_SYSTEM_PROMPT: &str = "You are an expert programming assistant. \
Answer with working, idiomatic code inside fenced blocks tagged with the language, \
and keep the surrounding explanation short and precise. \
When the user's documents are provided as numbered passages, prefer them over general knowledge and cite them as [n].";

pub const DIRECT_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
Answer directly and concisely from your general knowledge.";

const CODE_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "compile",
    "implement",
    "debug",
    "refactor",
    "stack trace",
    "exception",
    "syntax",
    "regex",
    "algorithm",
    "script",
    "snippet",
    "api call",
    "unit test",
];

fn code_signal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // structural hints that keyword matching misses: fences, call syntax,
    // paths with extensions, language names used as nouns
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            ``` |
            \w+\s*\(\s*\)? |
            \w+\.(rs|py|js|ts|go|java|c|cpp|sql|sh|toml|json|ya?ml)\b |
            \b(rust|python|javascript|typescript|golang|sql|bash)\b
            ",
        )
        .unwrap()
    })
}

pub fn is_code_question(query: &str) -> bool {
    let lower = query.to_lowercase();
    CODE_KEYWORDS.iter().any(|kw| lower.contains(kw)) || code_signal_re().is_match(query)
}

/// Picks the system prompt from the request shape and the query itself.
/// Code questions get the programming persona even when retrieval runs.
pub fn system_prompt_for(query: &str, use_rag: bool) -> &'static str {
    if is_code_question(query) {
        CODE_SYSTEM_PROMPT
    } else if use_rag {
        RAG_SYSTEM_PROMPT
    } else {
        DIRECT_SYSTEM_PROMPT
    }
}

/// Assembles the user prompt: retrieved context, the tail of the
/// conversation, the question, and grounding instructions. When retrieval
/// came back insufficient the instructions flip to general-knowledge mode
/// so the model does not cite passages that are not there.
pub fn build_user_prompt(
    query: &str,
    context: &str,
    history: &[ConversationTurn],
    history_turns: usize,
    insufficient: bool,
) -> String {
    let mut prompt = String::new();

    if !context.is_empty() {
        prompt.push_str("Context from the user's documents:\n\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    if !history.is_empty() {
        let start = history.len().saturating_sub(history_turns);
        prompt.push_str("Recent conversation:\n");
        prompt.push_str(&format_history(&history[start..]));
        prompt.push_str("\n\n");
    }

    prompt.push_str("Question: ");
    prompt.push_str(query);
    prompt.push_str("\n\n");

    if insufficient {
        prompt.push_str(
            "The document context was insufficient for this question. \
Answer from general knowledge and state clearly that the answer does not come from the user's documents.",
        );
    } else {
        prompt.push_str(
            "Answer using the numbered context passages above, citing them inline as [n]. \
Do not invent citations or content the passages do not support.",
        );
    }

    prompt
}

/// Prompt for a request that ran without retrieval.
pub fn build_direct_prompt(
    query: &str,
    history: &[ConversationTurn],
    history_turns: usize,
) -> String {
    let mut prompt = String::new();
    if !history.is_empty() {
        let start = history.len().saturating_sub(history_turns);
        prompt.push_str("Recent conversation:\n");
        prompt.push_str(&format_history(&history[start..]));
        prompt.push_str("\n\n");
    }
    prompt.push_str(query);
    prompt
}

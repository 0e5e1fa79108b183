mod pipeline;
mod prompts;

pub use pipeline::{GeneratedAnswer, GenerationPipeline};
pub use prompts::{
    build_direct_prompt, build_user_prompt, is_code_question, system_prompt_for,
    CODE_SYSTEM_PROMPT, DIRECT_SYSTEM_PROMPT, RAG_SYSTEM_PROMPT,
};

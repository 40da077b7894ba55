pub mod client;
pub mod parse;

pub use client::{Conversation, LlmClient, Role};
pub use parse::final_code_block;

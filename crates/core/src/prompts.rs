//! Fixed texts of the tutor persona.

/// System instruction sent with every chat request.
pub const SYSTEM_INSTRUCTION: &str = include_str!("../prompts/system_instruction.md");

/// Greeting that seeds every new conversation. Never sent to the model.
pub const WELCOME_MESSAGE: &str = include_str!("../prompts/welcome.md");

/// Text a pending reply is finalized with when the chat call fails.
pub const REPLY_FAILURE_TEXT: &str = "오류가 발생했습니다. 다시 시도해주세요.";

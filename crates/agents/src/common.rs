//! Message-list assembly shared by all agents.

use intervo_llm::{ChatMessage, ChatRole};

/// Builds the message list for an LM call: system prompt, optional
/// conversation history, then the per-call context block as the final user
/// message.
///
/// Two adjustments keep the role alternation valid for strict providers:
/// a history that ends with a user message loses that tail (the context
/// block replaces it), and a history that starts with an assistant message
/// gets a synthetic opening user message in front.
pub fn assemble_messages(
    system_prompt: &str,
    history: Vec<ChatMessage>,
    user_content: String,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];

    let mut history = history;
    if history.last().is_some_and(|m| m.role == ChatRole::User) {
        history.pop();
    }
    if history.first().is_some_and(|m| m.role == ChatRole::Assistant) {
        messages.push(ChatMessage::user("Let's begin the interview."));
    }
    messages.extend(history);

    messages.push(ChatMessage::user(user_content));
    messages
}

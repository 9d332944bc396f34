//! System prompts for the assistant's chat modes.

/// Placeholder used when a volume-scoped search found nothing.
pub const NO_CONTEXT_PLACEHOLDER: &str = "No relevant context found from previous volumes.";

/// The system prompt for general document chat.
///
/// Without context (or with a blank one) this is a plain assistant prompt;
/// otherwise the context is embedded with instructions to answer from it.
pub fn general_system_prompt(context: Option<&str>) -> String {
    let Some(context) = context.filter(|c| !c.trim().is_empty()) else {
        return "You are a helpful AI assistant. Answer questions clearly and concisely. \
                Use markdown formatting when appropriate."
            .to_string();
    };

    format!(
        "You are a helpful AI assistant. Use the following document context to answer \
questions accurately. If the answer cannot be found in the context, say so clearly.

DOCUMENT CONTEXT:
{context}

INSTRUCTIONS:
- Answer based on the document context provided
- If information is not in the context, acknowledge this
- Be concise but thorough
- Use markdown formatting for better readability"
    )
}

/// The spoiler-safe system prompt for a reader on `current_volume`.
///
/// `context` is normally the output of
/// [`VolumeRetriever::format_context`](crate::VolumeRetriever::format_context).
/// A reader on volume 1 is told that no earlier volume may be discussed.
pub fn novel_system_prompt(current_volume: u32, context: &str) -> String {
    let context = if context.trim().is_empty() { NO_CONTEXT_PLACEHOLDER } else { context };
    let last_allowed = current_volume.saturating_sub(1);
    let allowed = if last_allowed == 0 {
        "- You may NOT discuss content from any volume yet; the reader has no earlier volumes"
            .to_string()
    } else {
        format!("- You may ONLY discuss content from Volumes 1 through {last_allowed}")
    };
    let history = if last_allowed == 0 {
        "so far".to_string()
    } else {
        format!("up to Volume {last_allowed}")
    };

    format!(
        "You are a Novel Reading Assistant helping readers understand and enjoy their book series.

CRITICAL - SPOILER PREVENTION:
- The reader is currently reading Volume {current_volume}
{allowed}
- NEVER reveal plot points, character fates, twists, or events from Volume {current_volume} or later
- If asked about future content, respond: \"I can't discuss that yet to avoid spoilers - keep reading!\"

CONTEXT FROM PREVIOUS VOLUMES:
{context}

YOUR ROLE:
- Help identify characters: \"Who is [name]?\" - explain their role and history {history}
- Clarify plot points: Explain events and timelines from earlier volumes
- Remind readers of relationships, alliances, conflicts from past volumes
- Discuss world-building, magic systems, locations already introduced
- Provide brief recaps of key events when asked

RESPONSE STYLE:
- Reference specific volume numbers when citing events (e.g., \"In Volume 2, ...\")
- Be helpful but protective of the reading experience
- Use markdown for formatting
- Keep responses focused and relevant"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_prompt_without_context() {
        let prompt = general_system_prompt(None);
        assert!(prompt.starts_with("You are a helpful AI assistant."));
        assert!(!prompt.contains("DOCUMENT CONTEXT"));
        assert_eq!(general_system_prompt(Some("  ")), prompt);
    }

    #[test]
    fn test_general_prompt_with_context() {
        let prompt = general_system_prompt(Some("The lamp is blue."));
        assert!(prompt.contains("DOCUMENT CONTEXT:\nThe lamp is blue.\n"));
    }

    #[test]
    fn test_novel_prompt_states_allowed_range() {
        let prompt = novel_system_prompt(4, "[Volume 1]: text");
        assert!(prompt.contains("currently reading Volume 4"));
        assert!(prompt.contains("Volumes 1 through 3"));
        assert!(prompt.contains("events from Volume 4 or later"));
        assert!(prompt.contains("history up to Volume 3"));
        assert!(prompt.contains("CONTEXT FROM PREVIOUS VOLUMES:\n[Volume 1]: text\n"));
    }

    #[test]
    fn test_novel_prompt_empty_context_uses_placeholder() {
        let prompt = novel_system_prompt(2, "");
        assert!(prompt.contains(NO_CONTEXT_PLACEHOLDER));
    }

    #[test]
    fn test_novel_prompt_first_volume() {
        let prompt = novel_system_prompt(1, "");
        assert!(!prompt.contains("Volumes 1 through 0"));
        assert!(prompt.contains("no earlier volumes"));
    }
}

//! Fixed prompts and message constants for conversation summarization.

/// System prompt for the summarization call.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful assistant that creates structured \
state_snapshot summaries. Always output valid XML in the exact format requested.";

/// Synthetic assistant acknowledgement appended after every summary.
/// Mandatory to preserve the user/assistant alternation that downstream
/// chat APIs require.
pub const SUMMARY_ACK: &str = "Got it. Thanks for the additional context!";

/// Fixed sentence prefixed to every summary, announcing that it replaces
/// an earlier, longer history.
pub const SUMMARY_PREFIX: &str = "The following content is a brief summary of previously \
executed actions. The original content was too long and has been summarized:\n\n";

/// Build the summarization prompt around the serialized conversation
/// history.
pub fn build_summary_prompt(conversation_history: &str) -> String {
    format!(
        "First, reason in your scratchpad. Then, generate the <state_snapshot>.\n\
         \n\
         Analyze the following conversation history and create a structured state_snapshot XML.\n\
         \n\
         Required XML structure:\n\
         <state_snapshot>\n\
         <key_knowledge>\n\
         [Important facts, commands, configurations, URLs, file paths, and key information discovered]\n\
         </key_knowledge>\n\
         <previous_actions_summary>\n\
         [Briefly summarize what the system has already done previously]\n\
         </previous_actions_summary>\n\
         <recent_actions>\n\
         [Recent tool calls, commands executed, searches performed, and actions taken]\n\
         </recent_actions>\n\
         <current_plan>\n\
         [Current plan items with status: [DONE], [IN PROGRESS], [PENDING]]\n\
         </current_plan>\n\
         </state_snapshot>\n\
         \n\
         Guidelines:\n\
         - ALL XML tags are REQUIRED and MUST contain content. Each tag must have meaningful content, cannot be empty.\n\
         - Preserve all critical information: URLs, file paths, commands, configurations\n\
         - Include tool names and their results when relevant\n\
         - Maintain plan status and progress\n\
         - Output the XML content directly, no additional text before or after\n\
         \n\
         Conversation history:\n\
         {conversation_history}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_history_and_required_tags() {
        let prompt = build_summary_prompt("[{\"role\":\"user\"}]");
        assert!(prompt.contains("[{\"role\":\"user\"}]"));
        for tag in [
            "<state_snapshot>",
            "<key_knowledge>",
            "<previous_actions_summary>",
            "<recent_actions>",
            "<current_plan>",
        ] {
            assert!(prompt.contains(tag), "missing {tag}");
        }
        assert!(prompt.contains("[DONE]"));
        assert!(prompt.contains("[IN PROGRESS]"));
        assert!(prompt.contains("[PENDING]"));
    }
}

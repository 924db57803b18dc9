//! Prompt templates for the generator backend.

pub const PLAN_SYSTEM_PROMPT: &str = "You are Studly, a study planning assistant. \
You turn a learner's request into a realistic, structured study plan. \
Respect any goals, deadlines and preferences mentioned in the conversation context.";

pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You summarize study planning conversations accurately and briefly.";

pub fn study_plan_prompt(query: &str, context: &str) -> String {
    format!(
        r#"Conversation context:
{context}

Request: {query}

Write a study plan in markdown with these sections:
## Duration
## Daily Goals
## Time Estimates
## Tips

Keep it under 400 words."#
    )
}

pub fn summary_prompt(history: &str) -> String {
    format!(
        r#"Summarize the following conversation in 2-3 sentences.
Focus on the learner's goals, subjects, deadlines and stated preferences.

{history}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prompt_embeds_inputs() {
        let prompt =
            study_plan_prompt("Learn Rust in 2 weeks", "No previous conversation history.");
        assert!(prompt.contains("Learn Rust in 2 weeks"));
        assert!(prompt.contains("No previous conversation history."));
        assert!(prompt.contains("## Daily Goals"));
        assert!(prompt.contains("under 400 words"));
    }

    #[test]
    fn test_summary_prompt_embeds_history() {
        let prompt = summary_prompt("user: hi\nagent: hello");
        assert!(prompt.starts_with("Summarize"));
        assert!(prompt.ends_with("agent: hello"));
    }
}

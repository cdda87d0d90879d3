//! Prompt assembly.
//!
//! Every template embeds a numbered reference block built from the turn's
//! search results. The bracketed index of each entry is its 1-based position
//! in the slice handed in, so citations in the generated answer map straight
//! back onto the `results` array the client receives for that turn.

use crate::data_models::SearchResult;

/// Instructions for the single-prompt (completion) shape.
const COMPLETION_INSTRUCTIONS: &str = "\
- Provide a comprehensive answer to the user's question based on the search results above
- Use inline citations in the format [1], [2], etc. to reference the search results
- Be concise but thorough
- If the search results don't contain enough information to answer the question, say so
- Synthesize information from multiple sources when relevant";

/// Instructions for the multi-turn (chat) shape.
const CHAT_INSTRUCTIONS: &str = "\
- Answer the latest user message using only the references above
- Cite every claim inline with the bracketed index of its reference, e.g. [1] or [2]
- Cite each reference separately ([1][2]); never combine citations into ranges like [1-3]
- Be concise but thorough
- Keep the context of the earlier conversation in mind when the user asks a follow-up
- If the references don't contain enough information to answer, say so instead of guessing";

/// The numbered references for one turn, derived fresh on every request.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    results: &'a [SearchResult],
}

impl<'a> PromptContext<'a> {
    pub fn new(results: &'a [SearchResult]) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// `[n] title\nsnippet\nSource: link` blocks separated by blank lines.
    pub fn reference_block(&self) -> String {
        self.results
            .iter()
            .enumerate()
            .map(|(idx, result)| {
                format!(
                    "[{}] {}\n{}\nSource: {}",
                    idx + 1,
                    result.title,
                    result.snippet,
                    result.link
                )
            })
            .collect::<Vec<String>>()
            .join("\n\n")
    }

    /// A single combined prompt carrying the question, references and
    /// instructions.
    pub fn completion_prompt(&self, question: &str) -> String {
        format!(
            "You are a helpful AI assistant that answers questions based on search results.\n\
             \n\
             User question: {question}\n\
             \n\
             Search results:\n\
             {references}\n\
             \n\
             Instructions:\n\
             {COMPLETION_INSTRUCTIONS}\n\
             \n\
             Answer:",
            references = self.reference_block(),
        )
    }

    /// A system prompt to send ahead of the conversation history.
    pub fn chat_system_prompt(&self) -> String {
        format!(
            "You are a helpful AI assistant that answers questions in an ongoing conversation \
             using web search results.\n\
             \n\
             References:\n\
             {references}\n\
             \n\
             Instructions:\n\
             {CHAT_INSTRUCTIONS}",
            references = self.reference_block(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> Vec<SearchResult> {
        vec![
            SearchResult::new(
                "Paris - Wikipedia".into(),
                "https://en.wikipedia.org/wiki/Paris".into(),
                "Paris is the capital of France.".into(),
                1,
            ),
            SearchResult::new(
                "France".into(),
                "https://example.com/france".into(),
                "France is a country.".into(),
                2,
            ),
        ]
    }

    #[test]
    fn test_reference_block_numbering() {
        let results = results();
        let block = PromptContext::new(&results).reference_block();
        assert_eq!(
            block,
            "[1] Paris - Wikipedia\nParis is the capital of France.\nSource: https://en.wikipedia.org/wiki/Paris\n\n\
             [2] France\nFrance is a country.\nSource: https://example.com/france"
        );
    }

    #[test]
    fn test_numbering_follows_slice_order_not_provider_position() {
        let mut results = results();
        results.reverse();
        let block = PromptContext::new(&results).reference_block();
        assert!(block.starts_with("[1] France"));
        assert!(block.contains("[2] Paris - Wikipedia"));
    }

    #[test]
    fn test_completion_prompt_layout() {
        let results = results();
        let prompt = PromptContext::new(&results).completion_prompt("What is the capital of France?");
        assert!(prompt.contains("User question: What is the capital of France?\n\nSearch results:\n[1] Paris"));
        assert!(prompt.contains("Use inline citations in the format [1], [2]"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_chat_system_prompt_forbids_ranges() {
        let results = results();
        let system = PromptContext::new(&results).chat_system_prompt();
        assert!(system.contains("References:\n[1] Paris - Wikipedia"));
        assert!(system.contains("never combine citations into ranges"));
        assert!(system.contains("say so instead of guessing"));
    }

    #[test]
    fn test_same_input_same_prompt() {
        let results = results();
        let ctx = PromptContext::new(&results);
        assert_eq!(ctx.completion_prompt("q"), ctx.completion_prompt("q"));
    }
}

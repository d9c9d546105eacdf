//! Final answer generation from the assembled context.

use std::fmt::Write as _;

use tracing::{info, instrument};

use brain_shared::{AssembledContext, Query, Result};

use crate::client::InferenceClient;

/// Told to the model when search produced nothing usable.
const NO_CONTEXT_NOTICE: &str = "No matching notes were found in the knowledge base for this \
query. Say so plainly, then answer from general knowledge only if you are confident, and \
make clear that the answer is not based on the user's notes.";

/// Builds the answer prompt and makes one inference call.
#[derive(Debug, Clone, Default)]
pub struct ResponseGenerator;

impl ResponseGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate an answer. An empty context still calls the model, with an
    /// explicit no-context notice in the prompt.
    #[instrument(skip_all, fields(model = %client.model(), sources = context.entries.len()))]
    pub async fn generate(
        &self,
        client: &dyn InferenceClient,
        query: &Query,
        context: &AssembledContext,
    ) -> Result<String> {
        let prompt = self.build_prompt(query, context);
        let answer = client.complete(&prompt).await?;
        info!(answer_chars = answer.len(), "response generated");
        Ok(answer)
    }

    /// Query plus rank-ordered context, each entry labelled by source path.
    pub fn build_prompt(&self, query: &Query, context: &AssembledContext) -> String {
        let mut prompt = String::from(
            "Use the following information from the user's notes to answer the query. \
             Only use the provided information and don't make up facts. \
             When you use a source, cite its path.\n\n",
        );

        if context.is_empty() {
            prompt.push_str("INFORMATION:\n");
            prompt.push_str(NO_CONTEXT_NOTICE);
            prompt.push_str("\n\n");
        } else {
            prompt.push_str("INFORMATION:\n");
            for entry in &context.entries {
                let marker = if entry.truncated { " (truncated)" } else { "" };
                // Writing into a String cannot fail.
                let _ = writeln!(
                    prompt,
                    "### Source: {}{marker}\n{}\n",
                    entry.path.display(),
                    entry.content.trim_end()
                );
            }
        }

        let _ = write!(prompt, "QUERY:\n{query}\n\nANSWER:");
        prompt
    }
}

//! Keyword extraction: query → bounded list of literal search terms.
//!
//! The model is asked for one term per line, but replies drift: numbered
//! lists, comma-separated runs, a JSON array, a chatty "Here are the
//! keywords:" line. [`parse_keywords`] accepts all of those.

use tracing::{debug, info, instrument};

use brain_shared::{KeywordSet, Query, Result};

use crate::client::InferenceClient;

/// A fragment with more words than this is prose, not a search term.
const MAX_TERM_WORDS: usize = 4;

/// Longest `Label:` prefix that is stripped rather than kept.
const MAX_LABEL_WORDS: usize = 5;

/// Openers that mark a line as conversation rather than a term.
const FILLER_WORDS: [&str; 9] = [
    "sure", "okay", "ok", "here", "hope", "i", "certainly", "these", "based",
];

/// Default number of terms kept.
pub const DEFAULT_MAX_KEYWORDS: usize = 5;

/// Derives search terms from a query with one inference call.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    max_keywords: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEYWORDS)
    }
}

impl KeywordExtractor {
    pub fn new(max_keywords: usize) -> Self {
        Self {
            max_keywords: max_keywords.max(1),
        }
    }

    /// Extract keywords for `query`.
    ///
    /// An unusable reply yields an empty [`KeywordSet`]; only transport,
    /// timeout, and status failures are errors.
    #[instrument(skip_all, fields(model = %client.model()))]
    pub async fn extract(&self, client: &dyn InferenceClient, query: &Query) -> Result<KeywordSet> {
        let prompt = self.build_prompt(query);
        let reply = client.complete(&prompt).await?;
        debug!(reply = %reply, "keyword extraction reply");

        let keywords = KeywordSet::from_terms(parse_keywords(&reply)).truncated(self.max_keywords);

        info!(count = keywords.len(), keywords = ?keywords.as_slice(), "keywords extracted");
        Ok(keywords)
    }

    /// The fixed instruction prompt with the query embedded.
    pub fn build_prompt(&self, query: &Query) -> String {
        format!(
            "Extract the most important search keywords from this query. \
             Return at most {max} keywords, one per line, with no numbering, \
             no additional text and no explanation. Prefer single words or short \
             phrases that would literally appear in a note about the topic.\n\n\
             QUERY:\n{query}",
            max = self.max_keywords,
        )
    }
}

/// Split a model reply into raw candidate terms.
///
/// Output is not yet deduplicated; feed it to [`KeywordSet::from_terms`].
pub fn parse_keywords(reply: &str) -> Vec<String> {
    if let Some(terms) = parse_json_array(reply) {
        return terms;
    }

    reply
        .lines()
        .map(|line| strip_list_marker(line.trim()))
        .filter(|line| !line.is_empty())
        .filter_map(|line| match split_label(line) {
            Some(tail) if tail.is_empty() => None,
            Some(tail) => Some(tail),
            None if reads_as_prose(line) => None,
            None => Some(line),
        })
        .flat_map(|line| line.split([',', ';']))
        .filter_map(clean_term)
        .collect()
}

/// Accept `["a", "b"]` anywhere in the reply.
fn parse_json_array(reply: &str) -> Option<Vec<String>> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<String>>(&reply[start..=end]).ok()
}

/// The text after a short `Label:` prefix, if the line has one.
///
/// The label must be plain words and the colon must be followed by
/// whitespace or end the line, so `std::fs`, `https://..` and `10:30` stay
/// whole.
fn split_label(line: &str) -> Option<&str> {
    let colon = line.char_indices().find_map(|(i, c)| {
        let next = line[i + c.len_utf8()..].chars().next();
        (c == ':' && next.is_none_or(char::is_whitespace)).then_some(i)
    })?;

    let head = &line[..colon];
    let words = head.split_whitespace().count();
    let is_label = (1..=MAX_LABEL_WORDS).contains(&words)
        && head.chars().all(|c| c.is_alphabetic() || c.is_whitespace());
    is_label.then(|| line[colon + 1..].trim())
}

/// Chatty lines around the list: "Sure, here they are.", "Hope this helps!".
fn reads_as_prose(line: &str) -> bool {
    let first = line
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric());
    if FILLER_WORDS.iter().any(|w| w.eq_ignore_ascii_case(first)) {
        return true;
    }

    let multi_word = line.split_whitespace().nth(1).is_some();
    let sentence_break = [". ", "! ", "? "].iter().any(|p| line.contains(p));
    multi_word && (sentence_break || line.ends_with(['.', '!', '?', ':']))
}

/// Strip list markers, quotes, and trailing punctuation; reject long fragments.
fn clean_term(raw: &str) -> Option<String> {
    let term = strip_list_marker(raw.trim())
        .trim_matches(['"', '\'', '`', '*', '_'])
        .trim_end_matches(['.', '!', '?'])
        .trim();

    if term.is_empty() || term.split_whitespace().count() > MAX_TERM_WORDS {
        return None;
    }
    Some(term.to_string())
}

fn strip_list_marker(s: &str) -> &str {
    let s = s.trim_start_matches(['-', '*', '•', '+']).trim_start();
    let digits = s.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = s[digits..].strip_prefix(['.', ')']) {
            return rest.trim_start();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brain_shared::{BrainError, InferenceFailure};

    struct FixedReply(std::result::Result<&'static str, InferenceFailure>);

    #[async_trait]
    impl InferenceClient for FixedReply {
        fn model(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(failure) => Err(BrainError::inference(failure, "scripted failure")),
            }
        }
    }

    fn query(text: &str) -> Query {
        Query::new(text).unwrap()
    }

    #[test]
    fn parses_one_per_line() {
        assert_eq!(parse_keywords("project\nfeatures\n"), ["project", "features"]);
    }

    #[test]
    fn parses_numbered_and_bulleted_lists() {
        let reply = "1. ownership\n2) borrowing\n- lifetimes\n* traits\n• macros";
        assert_eq!(
            parse_keywords(reply),
            ["ownership", "borrowing", "lifetimes", "traits", "macros"]
        );
    }

    #[test]
    fn parses_comma_and_semicolon_runs() {
        assert_eq!(
            parse_keywords("garden, tomatoes;  compost"),
            ["garden", "tomatoes", "compost"]
        );
    }

    #[test]
    fn tolerates_surrounding_prose() {
        let reply = "Here are the keywords:\n\n\"sourdough\"\n`starter`\n\n\
                     I hope these help you find what you are looking for in your notes.";
        assert_eq!(parse_keywords(reply), ["sourdough", "starter"]);
    }

    #[test]
    fn strips_inline_label() {
        assert_eq!(parse_keywords("Keywords: tax, receipts."), ["tax", "receipts"]);
    }

    #[test]
    fn drops_trailing_sign_off() {
        assert_eq!(
            parse_keywords("project\nfeatures\n\nHope this helps!"),
            ["project", "features"]
        );
    }

    #[test]
    fn drops_comma_preamble() {
        assert_eq!(
            parse_keywords("Sure, here they are.\nproject\nfeatures"),
            ["project", "features"]
        );
        assert_eq!(
            parse_keywords("Based on your query, the keywords would be:\n- tax\n- receipts"),
            ["tax", "receipts"]
        );
    }

    #[test]
    fn keeps_single_terms_with_trailing_punctuation() {
        assert_eq!(parse_keywords("1. ownership.\n2. borrowing"), ["ownership", "borrowing"]);
    }

    #[test]
    fn colons_inside_terms_are_kept() {
        assert_eq!(
            parse_keywords("std::collections\nHashMap"),
            ["std::collections", "HashMap"]
        );
        assert_eq!(
            parse_keywords("https://example.com/notes\n10:30"),
            ["https://example.com/notes", "10:30"]
        );
        assert_eq!(parse_keywords("Keywords: std::fs, 10:30"), ["std::fs", "10:30"]);
    }

    #[test]
    fn accepts_json_array() {
        let reply = "Sure! [\"project\", \"features\"]";
        assert_eq!(parse_keywords(reply), ["project", "features"]);
    }

    #[test]
    fn keeps_numbers_that_are_terms() {
        assert_eq!(parse_keywords("2024\nbudget"), ["2024", "budget"]);
    }

    #[test]
    fn empty_reply_yields_nothing() {
        assert!(parse_keywords("").is_empty());
        assert!(parse_keywords("   \n\n").is_empty());
    }

    #[test]
    fn prompt_embeds_query_and_limit() {
        let prompt = KeywordExtractor::new(3).build_prompt(&query("how do I prune roses?"));
        assert!(prompt.contains("how do I prune roses?"));
        assert!(prompt.contains("at most 3 keywords"));
    }

    #[tokio::test]
    async fn extract_normalizes_and_caps() {
        let client = FixedReply(Ok("rust\n rust \n\ncargo\nclippy\nrustfmt\n"));
        let keywords = KeywordExtractor::new(3)
            .extract(&client, &query("rust tooling"))
            .await
            .unwrap();
        assert_eq!(keywords.as_slice(), ["rust", "cargo", "clippy"]);
    }

    #[tokio::test]
    async fn unusable_reply_is_empty_not_error() {
        let client = FixedReply(Ok("I cannot determine any keywords from that question at all."));
        let keywords = KeywordExtractor::default()
            .extract(&client, &query("hmm"))
            .await
            .unwrap();
        assert!(keywords.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let client = FixedReply(Err(InferenceFailure::Unreachable));
        let err = KeywordExtractor::default()
            .extract(&client, &query("anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrainError::Inference { .. }));
    }
}

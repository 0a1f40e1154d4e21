//! Grounding replies in the job's knowledge base.
//!
//! An inbound reply is first cleaned of quoted history, then reduced by the
//! model to a single search query (or a greeting marker). The query is embedded
//! and matched against the job's namespace; only matches at or above the
//! relevance threshold contribute context to the composed reply.

mod pinecone;

pub use pinecone::{
    KnowledgeBase, PineconeClient, PineconeConfig, ScoredMatch, DEFAULT_EMBED_MODEL,
    DEFAULT_PINECONE_API_URL,
};

use regex::Regex;
use tracing::{debug, info};

use crate::error::ConversationError;
use crate::llm::TextGenerator;
use crate::retry::RetryPolicy;

/// Answer the extraction model gives for messages that ask nothing.
pub const GREETING_MARKER: &str = "GREETING_ONLY";

pub const GREETING_ACKNOWLEDGMENT: &str = "Thank you so much for your kind message! \
     Please feel free to reach out if you have any questions about the role.";

pub const OUT_OF_SCOPE_REFUSAL: &str = "Your question is not related to the job in question. \
     Please refrain from asking questions that are not related to this role.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    pub threshold: f32,
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedContext {
    pub has_relevant_matches: bool,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExtraction {
    Greeting,
    Query(String),
}

pub struct ContextRetriever<'a> {
    knowledge: &'a dyn KnowledgeBase,
    llm: &'a dyn TextGenerator,
    settings: RetrievalSettings,
    retry: RetryPolicy,
}

impl<'a> ContextRetriever<'a> {
    pub fn new(
        knowledge: &'a dyn KnowledgeBase,
        llm: &'a dyn TextGenerator,
        settings: RetrievalSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            knowledge,
            llm,
            settings,
            retry,
        }
    }

    pub fn context_for(
        &self,
        namespace: &str,
        free_text: &str,
    ) -> Result<RetrievedContext, ConversationError> {
        let vector = self
            .retry
            .run("kb.embed", || self.knowledge.embed(free_text))?;
        let matches = self.retry.run("kb.query", || {
            self.knowledge.query(namespace, &vector, self.settings.top_k)
        })?;
        let context = build_context(&matches, self.settings.threshold);
        debug!(
            "namespace {}: {} matches, relevant={}",
            namespace,
            matches.len(),
            context.has_relevant_matches
        );
        Ok(context)
    }

    /// Reduces an inbound reply to one search query, ignoring the sender's
    /// own salutation and any quoted history.
    pub fn extract_query(
        &self,
        body: &str,
        recipient_name: Option<&str>,
    ) -> Result<QueryExtraction, ConversationError> {
        let cleaned = strip_quoted_reply(body);
        if cleaned.trim().is_empty() {
            return Ok(QueryExtraction::Greeting);
        }
        let prompt = extraction_prompt(&cleaned, recipient_name);
        let raw = self.retry.run("llm.extract", || self.llm.complete(&prompt))?;
        let extraction = parse_extraction(&raw);
        if extraction == QueryExtraction::Greeting {
            info!("inbound message classified as greeting");
        }
        Ok(extraction)
    }

    pub fn compose_reply(&self, context: &str) -> Result<String, ConversationError> {
        let prompt = format!(
            "Provide a simple 2 sentences response that is strictly based on the following \
             text {} in a professional tone.",
            context.trim()
        );
        Ok(self.retry.run("llm.compose", || self.llm.complete(&prompt))?)
    }
}

pub(crate) fn extraction_prompt(cleaned_body: &str, recipient_name: Option<&str>) -> String {
    let sender = recipient_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| format!(" from {}", name))
        .unwrap_or_default();
    format!(
        "Below is an email reply{sender}. Ignore the greeting, the salutation line and the \
         sign-off. Rewrite what the sender is asking or wants to know as one sentence suitable \
         for a semantic search. If the email only contains a greeting, thanks or pleasantries \
         and asks nothing, answer exactly {marker}. Answer with the sentence only.\n\n\
         Email:\n{body}",
        sender = sender,
        marker = GREETING_MARKER,
        body = cleaned_body.trim()
    )
}

pub(crate) fn parse_extraction(raw: &str) -> QueryExtraction {
    let answer = raw.trim().trim_matches('"').trim();
    if answer.is_empty() || answer.to_ascii_uppercase().contains(GREETING_MARKER) {
        QueryExtraction::Greeting
    } else {
        QueryExtraction::Query(answer.to_string())
    }
}

/// Drops `>` quoted lines and everything from an `On ... wrote:` attribution down.
pub fn strip_quoted_reply(body: &str) -> String {
    let attribution = Regex::new(r"^\s*On\s.+wrote:\s*$").ok();
    let mut kept = Vec::new();
    for line in body.lines() {
        if attribution.as_ref().map_or(false, |re| re.is_match(line)) {
            break;
        }
        if line.trim_start().starts_with('>') {
            continue;
        }
        kept.push(line);
    }
    kept.join("\n").trim().to_string()
}

pub fn build_context(matches: &[ScoredMatch], threshold: f32) -> RetrievedContext {
    let mut context = String::new();
    let mut relevant = false;
    for m in matches.iter().filter(|m| m.score >= threshold) {
        relevant = true;
        if let Some(text) = m.text.as_deref() {
            context.push_str(text);
            context.push_str("\n\n");
        }
    }
    RetrievedContext {
        has_relevant_matches: relevant,
        context: context.trim_end().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, score: f32, text: &str) -> ScoredMatch {
        ScoredMatch {
            id: id.to_string(),
            score,
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn only_matches_above_threshold_contribute() {
        let matches = vec![
            scored("a", 0.91, "Salary range is 90k-110k."),
            scored("b", 0.80, "The role is remote."),
            scored("c", 0.79, "Unrelated."),
        ];
        let context = build_context(&matches, 0.8);
        assert!(context.has_relevant_matches);
        assert_eq!(context.context, "Salary range is 90k-110k.\n\nThe role is remote.");
    }

    #[test]
    fn nothing_above_threshold_is_out_of_domain() {
        let context = build_context(&[scored("a", 0.5, "x")], 0.8);
        assert_eq!(
            context,
            RetrievedContext {
                has_relevant_matches: false,
                context: String::new()
            }
        );
    }

    #[test]
    fn quoted_history_is_removed() {
        let body = "Hi Sam,\nIs the role remote?\n\nOn Tue, Mar 5, 2024 at 10:00 AM Sam <sam@example.com> wrote:\n> Hello Jane\n> We have a role";
        assert_eq!(strip_quoted_reply(body), "Hi Sam,\nIs the role remote?");

        let inline = "Thanks!\n> earlier text\nWhat is the salary?";
        assert_eq!(strip_quoted_reply(inline), "Thanks!\nWhat is the salary?");
    }

    #[test]
    fn greeting_marker_is_recognised() {
        assert_eq!(parse_extraction("GREETING_ONLY"), QueryExtraction::Greeting);
        assert_eq!(parse_extraction(" \"greeting_only\"\n"), QueryExtraction::Greeting);
        assert_eq!(parse_extraction(""), QueryExtraction::Greeting);
        assert_eq!(
            parse_extraction("What is the salary range for this role?"),
            QueryExtraction::Query("What is the salary range for this role?".to_string())
        );
    }

    #[test]
    fn extraction_prompt_names_sender() {
        let prompt = extraction_prompt("Is it remote?", Some("Jane"));
        assert!(prompt.contains("reply from Jane"));
        assert!(prompt.contains(GREETING_MARKER));
        assert!(prompt.ends_with("Is it remote?"));
    }
}

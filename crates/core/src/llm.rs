use crate::error::CompletionError;
use crate::models::{RankedCandidate, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Clone)]
pub struct CompletionServiceConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub retry: RetryPolicy,
}

impl CompletionServiceConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// HTTP adapter for the external language-model service, with the same
/// transient-retry policy as the embedding adapter.
pub struct RemoteCompletionModel {
    config: CompletionServiceConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
}

impl RemoteCompletionModel {
    pub fn new(config: CompletionServiceConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn request_completion(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&CompletionRequest {
                prompt,
                model: self.config.model.as_deref(),
            });
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() || error.is_connect() {
                CompletionError::Transient(error.to_string())
            } else {
                CompletionError::Permanent(error.to_string())
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(CompletionError::Transient(status.to_string()));
        }
        if !status.is_success() {
            return Err(CompletionError::Permanent(status.to_string()));
        }

        let payload: CompletionResponse = response
            .json()
            .await
            .map_err(|error| CompletionError::MalformedResponse(error.to_string()))?;

        Ok(payload.text)
    }
}

#[async_trait]
impl CompletionModel for RemoteCompletionModel {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut last_failure = None;

        for attempt in 1..=self.config.retry.max_attempts {
            match self.request_completion(prompt).await {
                Ok(text) => return Ok(text),
                Err(CompletionError::Transient(details)) => {
                    tracing::debug!(attempt, %details, "transient completion failure");
                    last_failure = Some(details);
                    if attempt < self.config.retry.max_attempts {
                        tokio::time::sleep(self.config.retry.base_delay * attempt as u32).await;
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Err(CompletionError::Transient(
            last_failure.unwrap_or_else(|| "retries exhausted".to_string()),
        ))
    }
}

/// Grounding prompt for a question: the top-ranked chunks, each prefixed
/// with its source page so the model can stay inside the citations.
pub fn answer_prompt(question: &str, context: &[RankedCandidate]) -> String {
    let joined = context
        .iter()
        .map(|candidate| match candidate.chunk.page {
            Some(page) => format!("[Page {}] {}", page, candidate.chunk.text),
            None => format!("[Page unknown] {}", candidate.chunk.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful assistant answering ONLY from the provided context.\n\n\
         Style:\n\
         - Clear, human, single paragraph, 2-4 sentences, at most 80 words.\n\
         - Start with the direct answer. No markdown.\n\n\
         Context:\n{joined}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// Prompt for explaining a highlighted term from its single best-matching
/// passage.
pub fn lookup_prompt(term: &str, passage: &str) -> String {
    let flattened = passage.split_whitespace().collect::<Vec<_>>().join(" ");

    format!(
        "You must return valid Markdown only.\n\n\
         Required sections in this order:\n\
         1. Operational Context\n\
         2. Other Use-cases\n\n\
         Each section starts with its label in bold and contains a single \
         paragraph of at most 50 words.\n\
         Explain the specific meaning and context of the term '{term}' based \
         EXCLUSIVELY on this technical document passage.\n\n\
         Passage: {flattened}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::make_chunk_id;
    use crate::models::Chunk;

    fn candidate(text: &str, page: Option<u32>) -> RankedCandidate {
        RankedCandidate {
            score: 0.5,
            vector_similarity: 0.5,
            lexical_overlap: 0.5,
            chunk: Chunk {
                id: make_chunk_id("doc.pdf", page, 0, text),
                text: text.to_string(),
                page,
                source: "doc.pdf".to_string(),
                sequence_index: 0,
            },
        }
    }

    #[test]
    fn answer_prompt_tags_context_with_pages() {
        let prompt = answer_prompt(
            "what accuracy?",
            &[
                candidate("results show 92 percent", Some(2)),
                candidate("a section chunk", None),
            ],
        );

        assert!(prompt.contains("[Page 2] results show 92 percent"));
        assert!(prompt.contains("[Page unknown] a section chunk"));
        assert!(prompt.contains("Question: what accuracy?"));
    }

    #[test]
    fn lookup_prompt_flattens_passage_whitespace() {
        let prompt = lookup_prompt("dropout", "line one\nline   two");
        assert!(prompt.contains("Passage: line one line two"));
        assert!(prompt.contains("'dropout'"));
    }
}

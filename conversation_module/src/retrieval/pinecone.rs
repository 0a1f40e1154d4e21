use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{http_client, read_json, ApiError};

pub const DEFAULT_PINECONE_API_URL: &str = "https://api.pinecone.io";
pub const DEFAULT_EMBED_MODEL: &str = "multilingual-e5-large";
const PINECONE_API_VERSION: &str = "2024-10";

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    pub text: Option<String>,
}

/// Semantic search over per-job document namespaces.
pub trait KnowledgeBase {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError>;

    fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    pub api_url: String,
    /// Data-plane host of the index, e.g. `my-index-abc123.svc.us-east-1.pinecone.io`.
    pub index_host: String,
    pub embed_model: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    parameters: EmbedParameters,
    inputs: Vec<EmbedInput<'a>>,
}

#[derive(Serialize)]
struct EmbedParameters {
    input_type: &'static str,
    truncate: &'static str,
}

#[derive(Serialize)]
struct EmbedInput<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<Embedding>,
}

#[derive(Deserialize)]
struct Embedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_values: bool,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub struct PineconeClient {
    client: Client,
    config: PineconeConfig,
    index_url: String,
}

impl PineconeClient {
    pub fn new(config: PineconeConfig) -> Result<Self, ApiError> {
        let host = config.index_host.trim().trim_end_matches('/');
        let index_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            config,
            index_url,
        })
    }
}

impl KnowledgeBase for PineconeClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let request = EmbedRequest {
            model: &self.config.embed_model,
            parameters: EmbedParameters {
                input_type: "query",
                truncate: "END",
            },
            inputs: vec![EmbedInput { text }],
        };
        let response = self
            .client
            .post(format!("{}/embed", self.config.api_url.trim_end_matches('/')))
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&request)
            .send()
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let parsed: EmbedResponse = read_json("pinecone", response)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|embedding| embedding.values)
            .filter(|values| !values.is_empty())
            .ok_or(ApiError::Unexpected {
                service: "pinecone",
                message: "embed response carried no vector".to_string(),
            })
    }

    fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>, ApiError> {
        debug!("querying namespace {} (top_k={})", namespace, top_k);
        let request = QueryRequest {
            namespace,
            vector,
            top_k,
            include_values: false,
            include_metadata: true,
        };
        let response = self
            .client
            .post(format!("{}/query", self.index_url))
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&request)
            .send()
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let parsed: QueryResponse = read_json("pinecone", response)?;
        Ok(parsed
            .matches
            .into_iter()
            .map(|m| ScoredMatch {
                text: m
                    .metadata
                    .as_ref()
                    .and_then(|meta| meta.get("text"))
                    .and_then(|text| text.as_str())
                    .map(str::to_string),
                id: m.id,
                score: m.score,
            })
            .collect())
    }
}

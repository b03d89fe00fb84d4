//! LLM-backed Cypher synthesis
//!
//! Turns a natural-language question into a graph query via an
//! OpenAI-compatible chat-completions endpoint. The prompt template is a
//! process-wide snapshot that can be replaced at runtime; in-flight calls
//! keep the snapshot they started with.
//!
//! Generated text is untrusted: it is stripped of markdown fences and must
//! pass a structural sanity check before it becomes an executable query.
//! Generation is a single round trip with no retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::envelope::GraphQuery;
use crate::error::{QueryError, Result};

/// Default timeout in seconds for generation calls
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// System message sent with every generation request
const SYSTEM_INSTRUCTION: &str = "You translate questions about SEC filing entities into Cypher. \
     Respond with a single Cypher statement and nothing else.";

/// Fixed description of the SEC filing graph, rendered into the template
const GRAPH_SCHEMA: &str = r#"Node properties:
Company {companyName: STRING, cusip6: STRING, cusip: STRING}
Manager {managerName: STRING, managerCik: STRING, managerAddress: STRING}
Address {city: STRING, state: STRING, country: STRING, location: POINT}
Form {formId: STRING, source: STRING}
Chunk {chunkId: STRING, text: STRING}
Relationship properties:
SECTION {f10kItem: STRING}
The relationships:
(:Company)-[:LOCATED_AT]->(:Address)
(:Manager)-[:LOCATED_AT]->(:Address)
(:Company)-[:FILED]->(:Form)
(:Form)-[:SECTION]->(:Chunk)
(:Manager)-[:OWNS_STOCK_IN]->(:Company)"#;

/// Default generation template with worked examples
const DEFAULT_TEMPLATE: &str = r#"Task:Generate Cypher statement to query a graph database.
Instructions:
Use only the provided relationship types and properties in the schema.
Do not use any other relationship types or properties that are not provided.
Schema:
{schema}
Note: Do not include any explanations or apologies in your responses.
Do not respond to any questions that might ask anything else than for you to construct a Cypher statement.
Do not include any text except the generated Cypher statement.
Examples: Here are a few examples of generated Cypher statements for particular questions:

# What investment firms are in San Francisco?
MATCH (mgr:Manager)-[:LOCATED_AT]->(mgrAddress:Address)
    WHERE mgrAddress.city = 'San Francisco'
RETURN mgr.managerName

# What investment firms are near Santa Clara?
MATCH (address:Address)
    WHERE address.city = "Santa Clara"
MATCH (mgr:Manager)-[:LOCATED_AT]->(managerAddress:Address)
    WHERE point.distance(address.location, managerAddress.location) < 10000
RETURN mgr.managerName, mgr.managerAddress

# What companies are in Santa Clara?
MATCH (com:Company)-[:LOCATED_AT]->(address:Address)
    WHERE address.city = "Santa Clara"
RETURN com.companyName

# What does Palo Alto Networks do?
CALL db.index.fulltext.queryNodes("fullTextCompanyNames", "Palo Alto Networks") YIELD node, score
WITH node as com
MATCH (com)-[:FILED]->(f:Form),
    (f)-[s:SECTION]->(c:Chunk)
WHERE s.f10kItem = "item1"
RETURN c.text

# Which state has the most investment firms?
MATCH (mgr:Manager)-[:LOCATED_AT]->(address:Address)
RETURN address.state as state, count(address.state) as numManagers
ORDER BY numManagers DESC
LIMIT 10

The question is:
{question}"#;

/// Configuration for the model endpoint
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL for the API (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    /// API key (optional for local endpoints)
    pub api_key: Option<String>,
    /// Chat model used for query generation
    pub model: String,
    /// Sampling temperature; zero keeps generation as repeatable as the model allows
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4-turbo".to_string(),
            temperature: 0.0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ModelConfig {
    /// Create config for the OpenAI API
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Producers of executable graph queries from natural-language questions
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Translate a question into an executable graph query
    async fn synthesize(&self, question: &str) -> Result<GraphQuery>;

    /// Replace the generation template for subsequent calls
    async fn update_template(&self, template: &str) -> Result<()>;

    /// Cheap connectivity check against the model endpoint
    async fn probe(&self) -> Result<()>;
}

/// Chat-completions request body
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat-completions response body (fields we consume)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Synthesizer backed by an OpenAI-compatible chat-completions endpoint
pub struct ModelSynthesizer {
    client: Client,
    config: ModelConfig,
    template: RwLock<Arc<str>>,
}

impl ModelSynthesizer {
    /// Create a new synthesizer with the default generation template
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QueryError::Generation(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            config,
            template: RwLock::new(Arc::from(DEFAULT_TEMPLATE)),
        })
    }

    /// Snapshot of the template currently used for generation
    pub async fn current_template(&self) -> Arc<str> {
        self.template.read().await.clone()
    }

    /// Resolve the chat-completions endpoint URL
    fn chat_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        // Handle both /v1 and non-/v1 base URLs
        if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Resolve the models listing URL used by the probe
    fn models_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/models", base)
        } else {
            format!("{}/v1/models", base)
        }
    }

    /// One generation round trip: send the rendered prompt, return the raw text
    async fn send_chat(&self, prompt: &str) -> Result<String> {
        let request_body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_INSTRUCTION.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.config.temperature,
        };

        let mut request = self
            .client
            .post(self.chat_url())
            .header("Content-Type", "application/json")
            .json(&request_body);

        if let Some(ref api_key) = self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                QueryError::Generation("Model call timed out".to_string())
            } else if e.is_connect() {
                QueryError::Generation(format!("Model endpoint unreachable: {}", e))
            } else {
                QueryError::Generation(format!("Model call failed: {}", e))
            }
        })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let chat: ChatResponse = response
                    .json()
                    .await
                    .map_err(|e| QueryError::Generation(format!("Invalid model response: {}", e)))?;

                chat.choices
                    .into_iter()
                    .next()
                    .map(|choice| choice.message.content)
                    .ok_or_else(|| {
                        QueryError::Generation("Model response contained no choices".to_string())
                    })
            }
            StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                Err(QueryError::Generation(format!(
                    "Model authentication failed: {}",
                    body
                )))
            }
            StatusCode::NOT_FOUND => {
                let body = response.text().await.unwrap_or_default();
                Err(QueryError::Generation(format!(
                    "Model '{}' not found: {}",
                    self.config.model, body
                )))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(QueryError::Generation(
                "Model endpoint rate limited".to_string(),
            )),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(QueryError::Generation(format!(
                    "Model call failed with status {}: {}",
                    status, body
                )))
            }
        }
    }
}

#[async_trait]
impl Synthesizer for ModelSynthesizer {
    async fn synthesize(&self, question: &str) -> Result<GraphQuery> {
        let template = self.current_template().await;
        let prompt = render_template(&template, GRAPH_SCHEMA, question);

        debug!(model = %self.config.model, "Requesting query generation");
        let raw = self.send_chat(&prompt).await?;

        let cleaned = strip_code_fences(&raw);
        if !looks_like_cypher(&cleaned) {
            warn!(output = %raw, "Model output failed the structural check");
            return Err(QueryError::Generation(
                "Model returned text that does not look like a graph query".to_string(),
            ));
        }

        debug!(query = %cleaned, "Generated graph query");
        Ok(GraphQuery::new(cleaned))
    }

    async fn update_template(&self, template: &str) -> Result<()> {
        if !template.contains("{question}") {
            return Err(QueryError::InvalidArgument(
                "Template must contain a {question} placeholder".to_string(),
            ));
        }

        // Swap the whole snapshot; readers holding the old Arc are unaffected
        let snapshot: Arc<str> = Arc::from(template);
        *self.template.write().await = snapshot;
        info!("Query generation template updated");
        Ok(())
    }

    async fn probe(&self) -> Result<()> {
        let mut request = self.client.get(self.models_url());
        if let Some(ref api_key) = self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request.send().await.map_err(|e| {
            QueryError::Generation(format!("Model endpoint unreachable: {}", e))
        })?;

        let status = response.status();
        // Rate limiting still proves the endpoint is reachable
        if status.is_success() || status == StatusCode::TOO_MANY_REQUESTS {
            Ok(())
        } else {
            Err(QueryError::Generation(format!(
                "Model endpoint returned status {}",
                status
            )))
        }
    }
}

impl std::fmt::Debug for ModelSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSynthesizer")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("temperature", &self.config.temperature)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish()
    }
}

/// Render the template by filling the schema and question slots
fn render_template(template: &str, schema: &str, question: &str) -> String {
    template
        .replace("{schema}", schema)
        .replace("{question}", question)
}

/// Drop a leading/trailing markdown code fence if the model added one
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```cypher")
        .or_else(|| trimmed.strip_prefix("```json"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let without_close = without_open.strip_suffix("```").unwrap_or(without_open);
    without_close.trim().to_string()
}

/// Structural sanity check on generated text before it becomes executable.
///
/// The first word must be a clause that can open a query; a verb buried
/// later in the text is not enough, since refusal prose like "I cannot help
/// with that" contains ordinary English words that double as clause names.
/// Delimiters must balance outside string literals; escape sequences inside
/// literals are not handled.
fn looks_like_cypher(text: &str) -> bool {
    let upper = text.to_uppercase();
    let Some(first_word) = upper
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find(|token| !token.is_empty())
    else {
        return false;
    };

    const OPENING_CLAUSES: [&str; 7] =
        ["MATCH", "OPTIONAL", "RETURN", "CALL", "WITH", "UNWIND", "SHOW"];
    if !OPENING_CLAUSES.contains(&first_word) {
        return false;
    }

    balanced_delimiters(text)
}

fn balanced_delimiters(text: &str) -> bool {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => quote = Some(ch),
            '(' | '[' | '{' => stack.push(ch),
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            _ => {}
        }
    }

    stack.is_empty() && quote.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20}
        })
    }

    fn test_config(server: &MockServer) -> ModelConfig {
        ModelConfig {
            base_url: server.uri(),
            api_key: Some("test-key".into()),
            model: "test-model".into(),
            temperature: 0.0,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_synthesize_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_string_contains("What companies are in Santa Clara?"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                "MATCH (com:Company)-[:LOCATED_AT]->(a:Address) WHERE a.city = 'Santa Clara' RETURN com.companyName",
            )))
            .mount(&server)
            .await;

        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();
        let query = synthesizer
            .synthesize("What companies are in Santa Clara?")
            .await
            .unwrap();

        assert!(query.text.starts_with("MATCH"));
        assert!(query.params.is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_strips_code_fences() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                "```cypher\nMATCH (n:Manager) RETURN n.managerName\n```",
            )))
            .mount(&server)
            .await;

        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();
        let query = synthesizer.synthesize("list managers").await.unwrap();

        assert_eq!(query.text, "MATCH (n:Manager) RETURN n.managerName");
    }

    #[tokio::test]
    async fn test_synthesize_rejects_prose() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                "I'm sorry, I can only answer questions about the graph.",
            )))
            .mount(&server)
            .await;

        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();
        let result = synthesizer.synthesize("tell me a joke").await;

        assert!(matches!(result, Err(QueryError::Generation(_))));
    }

    #[tokio::test]
    async fn test_synthesize_no_retry_on_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream error"))
            .expect(1)
            .mount(&server)
            .await;

        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();
        let result = synthesizer.synthesize("anything").await;

        assert!(matches!(result, Err(QueryError::Generation(_))));
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .mount(&server)
            .await;

        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();
        let result = synthesizer.synthesize("test").await;

        match result {
            Err(QueryError::Generation(message)) => {
                assert!(message.contains("authentication failed"));
            }
            other => panic!("Expected Generation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(404).set_body_string("No such model"))
            .mount(&server)
            .await;

        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();
        let result = synthesizer.synthesize("test").await;

        match result {
            Err(QueryError::Generation(message)) => {
                assert!(message.contains("not found"));
            }
            other => panic!("Expected Generation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_template_visible_to_next_call() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("CUSTOM PROMPT"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_body("MATCH (n) RETURN n")),
            )
            .mount(&server)
            .await;

        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();
        synthesizer
            .update_template("CUSTOM PROMPT\n{question}")
            .await
            .unwrap();

        let result = synthesizer.synthesize("list everything").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_update_template_requires_question_slot() {
        let server = MockServer::start().await;
        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();

        let result = synthesizer.update_template("no placeholder here").await;
        assert!(matches!(result, Err(QueryError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_concurrent_updates_yield_whole_snapshots() {
        let server = MockServer::start().await;
        let synthesizer = Arc::new(ModelSynthesizer::new(test_config(&server)).unwrap());

        let long_a = format!("{}\n{{question}}", "A".repeat(4096));
        let long_b = format!("{}\n{{question}}", "B".repeat(4096));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let synthesizer = synthesizer.clone();
            let template = if i % 2 == 0 {
                long_a.clone()
            } else {
                long_b.clone()
            };
            tasks.push(tokio::spawn(async move {
                synthesizer.update_template(&template).await.unwrap();
            }));
        }
        for i in 0..8 {
            let synthesizer = synthesizer.clone();
            let long_a = long_a.clone();
            let long_b = long_b.clone();
            tasks.push(tokio::spawn(async move {
                let _ = i;
                let seen = synthesizer.current_template().await;
                let seen = seen.as_ref();
                assert!(
                    seen == long_a || seen == long_b || seen.starts_with("Task:"),
                    "observed a torn template snapshot"
                );
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_probe_healthy() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();
        assert!(synthesizer.probe().await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_reports_bad_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let synthesizer = ModelSynthesizer::new(test_config(&server)).unwrap();
        assert!(matches!(
            synthesizer.probe().await,
            Err(QueryError::Generation(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4-turbo");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_render_template_fills_slots() {
        let rendered = render_template("S: {schema}\nQ: {question}", "the schema", "the question");
        assert_eq!(rendered, "S: the schema\nQ: the question");
    }

    #[test]
    fn test_default_template_renders_question() {
        let rendered = render_template(DEFAULT_TEMPLATE, GRAPH_SCHEMA, "Where is Acme?");
        assert!(rendered.contains("Where is Acme?"));
        assert!(rendered.contains("Company {companyName: STRING"));
        assert!(!rendered.contains("{schema}"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            strip_code_fences("```cypher\nMATCH (n) RETURN n\n```"),
            "MATCH (n) RETURN n"
        );
        assert_eq!(
            strip_code_fences("```\nMATCH (n) RETURN n\n```"),
            "MATCH (n) RETURN n"
        );
        assert_eq!(strip_code_fences("MATCH (n) RETURN n"), "MATCH (n) RETURN n");
    }

    #[test]
    fn test_looks_like_cypher_accepts_queries() {
        assert!(looks_like_cypher("MATCH (n:Company) RETURN n.companyName"));
        assert!(looks_like_cypher(
            "CALL db.index.fulltext.queryNodes(\"idx\", \"acme\") YIELD node RETURN node"
        ));
        // Parens inside string literals must not confuse the scanner
        assert!(looks_like_cypher(
            "MATCH (n) WHERE n.name = 'Acme (Holdings' RETURN n"
        ));
        assert!(looks_like_cypher(
            "OPTIONAL MATCH (n:Manager) RETURN n.managerName"
        ));
    }

    #[test]
    fn test_looks_like_cypher_rejects_junk() {
        assert!(!looks_like_cypher(""));
        assert!(!looks_like_cypher("MATCH (n:Company RETURN n"));
        assert!(!looks_like_cypher("MATCH (n) RETURN n'"));
    }

    #[test]
    fn test_looks_like_cypher_rejects_refusal_prose() {
        // English words that double as clause names must not slip prose
        // through when they appear mid-sentence
        assert!(!looks_like_cypher("I cannot help with that."));
        assert!(!looks_like_cypher(
            "Sorry, I am unable to match that question to the schema."
        ));
        assert!(!looks_like_cypher(
            "Please call support to show your account details."
        ));
    }
}

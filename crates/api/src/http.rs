use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use url::Url;

use super::error::{
    ApiResult, BuildClientSnafu, DecodeSnafu, InvalidBaseUrlSnafu, RejectedSnafu, StatusSnafu,
    TransportSnafu, UnsupportedBaseUrlSnafu,
};
use super::ids::ConversationId;
use super::types::{
    CompressRequest, CompressionReport, Conversation, ConversationContext, ConversationSummary,
    CostEstimate, EstimateMessage, HealthStatus, MemorySearchHit, MemorySearchRequest, Message,
    Model, ModelInfo, NewConversation, NewMessage,
};
use super::{BoxFuture, ConversationApi, MemoryApi, ModelApi};

const API_ROOT: [&str; 2] = ["api", "v1"];

/// Model endpoints answer unknown names with `200 {"error": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Rejected { error: String },
    Accepted(T),
}

/// REST client for the ContextLink backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    /// Client with a `contextlink/<version>` user agent and no timeouts.
    pub fn new(base_url: &str) -> ApiResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("contextlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(BuildClientSnafu {
                stage: "http-backend-build-client",
            })?;
        Self::with_client(client, base_url)
    }

    /// Uses a caller-configured client, e.g. one with proxies or timeouts set.
    pub fn with_client(client: Client, base_url: &str) -> ApiResult<Self> {
        let raw = base_url.trim();
        let parsed = Url::parse(raw).context(InvalidBaseUrlSnafu {
            stage: "http-backend-parse-base-url",
            raw: raw.to_string(),
        })?;
        ensure!(
            !parsed.cannot_be_a_base(),
            UnsupportedBaseUrlSnafu {
                stage: "http-backend-check-base-url",
                raw: raw.to_string(),
            }
        );

        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// Root every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded segments to the base URL, keeping any base path prefix.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn api_endpoint(&self, segments: &[&str]) -> Url {
        let full = API_ROOT
            .iter()
            .chain(segments.iter())
            .copied()
            .collect::<Vec<_>>();
        self.endpoint(&full)
    }

    async fn execute(
        &self,
        stage: &'static str,
        url: &Url,
        request: RequestBuilder,
    ) -> ApiResult<String> {
        let response = request.send().await.context(TransportSnafu {
            stage,
            url: url.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.context(TransportSnafu {
            stage,
            url: url.to_string(),
        })?;

        if !status.is_success() {
            return StatusSnafu {
                stage,
                url: url.to_string(),
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        tracing::debug!(stage, %url, status = status.as_u16(), "backend request completed");
        Ok(body)
    }

    fn decode<T: DeserializeOwned>(stage: &'static str, url: &Url, body: &str) -> ApiResult<T> {
        serde_json::from_str(body).context(DecodeSnafu {
            stage,
            url: url.to_string(),
        })
    }

    fn accept<T>(stage: &'static str, envelope: Envelope<T>) -> ApiResult<T> {
        match envelope {
            Envelope::Accepted(value) => Ok(value),
            Envelope::Rejected { error } => RejectedSnafu {
                stage,
                message: error,
            }
            .fail(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, stage: &'static str, url: Url) -> ApiResult<T> {
        let body = self
            .execute(stage, &url, self.client.get(url.clone()))
            .await?;
        Self::decode(stage, &url, &body)
    }

    async fn post_json<B, T>(&self, stage: &'static str, url: Url, payload: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(url.clone()).json(payload);
        let body = self.execute(stage, &url, request).await?;
        Self::decode(stage, &url, &body)
    }
}

impl ConversationApi for HttpBackend {
    fn list_conversations(&self) -> BoxFuture<'_, ApiResult<Vec<Conversation>>> {
        Box::pin(async move {
            let url = self.api_endpoint(&["conversations", ""]);
            self.get_json("list-conversations", url).await
        })
    }

    fn create_conversation(
        &self,
        input: NewConversation,
    ) -> BoxFuture<'_, ApiResult<Conversation>> {
        Box::pin(async move {
            let stage = "create-conversation";
            let url = self.api_endpoint(&["conversations", ""]);

            // The server reads these as query parameters; the JSON body keeps the documented shape.
            let mut query = vec![("initial_model", input.initial_model.clone())];
            if let Some(title) = &input.title {
                query.push(("title", title.clone()));
            }

            let request = self.client.post(url.clone()).query(&query).json(&input);
            let body = self.execute(stage, &url, request).await?;
            Self::decode(stage, &url, &body)
        })
    }

    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, ApiResult<Conversation>> {
        Box::pin(async move {
            let id = conversation_id.to_string();
            let url = self.api_endpoint(&["conversations", id.as_str()]);
            self.get_json("get-conversation", url).await
        })
    }

    fn send_message(
        &self,
        conversation_id: ConversationId,
        input: NewMessage,
    ) -> BoxFuture<'_, ApiResult<Message>> {
        Box::pin(async move {
            let id = conversation_id.to_string();
            let url = self.api_endpoint(&["conversations", id.as_str(), "messages"]);
            self.post_json("send-message", url, &input).await
        })
    }

    fn delete_conversation(&self, conversation_id: ConversationId) -> BoxFuture<'_, ApiResult<()>> {
        Box::pin(async move {
            let id = conversation_id.to_string();
            let url = self.api_endpoint(&["conversations", id.as_str()]);
            self.execute("delete-conversation", &url, self.client.delete(url.clone()))
                .await?;
            Ok(())
        })
    }
}

impl ModelApi for HttpBackend {
    fn list_models(&self) -> BoxFuture<'_, ApiResult<Vec<Model>>> {
        Box::pin(async move {
            let url = self.api_endpoint(&["models", ""]);
            self.get_json("list-models", url).await
        })
    }

    fn model_info(&self, model_name: String) -> BoxFuture<'_, ApiResult<ModelInfo>> {
        Box::pin(async move {
            let stage = "model-info";
            let url = self.api_endpoint(&["models", model_name.as_str(), "info"]);
            let envelope: Envelope<ModelInfo> = self.get_json(stage, url).await?;
            Self::accept(stage, envelope)
        })
    }

    fn estimate_cost(
        &self,
        model_name: String,
        messages: Vec<EstimateMessage>,
    ) -> BoxFuture<'_, ApiResult<CostEstimate>> {
        Box::pin(async move {
            let stage = "estimate-cost";
            let url = self.api_endpoint(&["models", model_name.as_str(), "estimate-cost"]);
            let envelope: Envelope<CostEstimate> = self.post_json(stage, url, &messages).await?;
            Self::accept(stage, envelope)
        })
    }
}

impl MemoryApi for HttpBackend {
    fn conversation_summary(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'_, ApiResult<ConversationSummary>> {
        Box::pin(async move {
            let id = conversation_id.to_string();
            let url = self.api_endpoint(&["memory", "conversation", id.as_str(), "summary"]);
            self.get_json("conversation-summary", url).await
        })
    }

    fn search_memory(
        &self,
        request: MemorySearchRequest,
    ) -> BoxFuture<'_, ApiResult<Vec<MemorySearchHit>>> {
        Box::pin(async move {
            let url = self.api_endpoint(&["memory", "search"]);
            self.post_json("search-memory", url, &request).await
        })
    }

    fn conversation_context(
        &self,
        conversation_id: ConversationId,
        max_messages: u32,
    ) -> BoxFuture<'_, ApiResult<ConversationContext>> {
        Box::pin(async move {
            let id = conversation_id.to_string();
            let mut url = self.api_endpoint(&["memory", "conversation", id.as_str(), "context"]);
            url.query_pairs_mut()
                .append_pair("max_messages", &max_messages.to_string());
            self.get_json("conversation-context", url).await
        })
    }

    fn compress_context(
        &self,
        request: CompressRequest,
    ) -> BoxFuture<'_, ApiResult<CompressionReport>> {
        Box::pin(async move {
            let url = self.api_endpoint(&["memory", "compress"]);
            self.post_json("compress-context", url, &request).await
        })
    }

    fn health(&self) -> BoxFuture<'_, ApiResult<HealthStatus>> {
        Box::pin(async move {
            let url = self.endpoint(&["health"]);
            self.get_json("health", url).await
        })
    }
}

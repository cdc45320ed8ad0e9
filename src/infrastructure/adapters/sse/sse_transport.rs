//! SSE Stream Transport - 连接 InkFlow 后端的章节生成流
//!
//! 实现 StreamTransportPort trait，通过 HTTP + Server-Sent Events 接收生成事件
//!
//! 后端 API:
//! POST {base_url}/stories/{story_id}/chapters/generate/stream
//! Request: {"type": "first"} 或 {"type": "continue", ...}  (JSON)
//! Response: text/event-stream，每个 data 行是一个 JSON 事件
//!
//! 备用（非流式）:
//! POST {base_url}/stories/{story_id}/chapters/generate
//! Response: 整章 JSON

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::{header, Client, RequestBuilder, Response};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::wire::{
    decode_event, decode_generated_chapter, generation_path, stream_path, GenerateChapterBody,
    GeneratedChapter,
};
use crate::application::ports::{StreamHandle, StreamItem, StreamTransportPort, TransportError};
use crate::domain::generation::GenerationRequest;

const EVENT_BUFFER: usize = 64;

/// SSE 传输配置
#[derive(Debug, Clone)]
pub struct SseTransportConfig {
    /// 后端 API 基础 URL（包含 `/api` 前缀）
    pub base_url: String,
    /// 建立连接的超时时间（秒）
    pub connect_timeout_secs: u64,
    /// 两个事件之间允许的最长间隔（秒）
    pub idle_timeout_secs: u64,
    /// 非流式生成请求的超时时间（秒）
    pub request_timeout_secs: u64,
    /// 可选的访问令牌
    pub auth_token: Option<String>,
}

impl Default for SseTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:20001/api".to_string(),
            connect_timeout_secs: 30,
            idle_timeout_secs: 120,
            request_timeout_secs: 300,
            auth_token: None,
        }
    }
}

impl SseTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_idle_timeout(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// SSE 生成流客户端
pub struct SseStreamTransport {
    client: Client,
    config: SseTransportConfig,
}

impl SseStreamTransport {
    /// 创建新的 SSE 传输
    pub fn new(config: SseTransportConfig) -> Result<Self, TransportError> {
        // 流本身是长连接，只限制建立连接的时间
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| TransportError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SseTransportConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// 获取生成流 URL
    fn stream_url(&self, request: &GenerationRequest) -> String {
        format!("{}{}", self.base_url(), stream_path(request))
    }

    /// 获取非流式生成 URL
    fn generation_url(&self, request: &GenerationRequest) -> String {
        format!("{}{}", self.base_url(), generation_path(request))
    }

    /// 获取健康检查 URL
    fn health_url(&self) -> String {
        format!("{}/health", self.base_url())
    }

    /// 构造带鉴权的生成请求
    fn generation_post(&self, url: &str, request: &GenerationRequest) -> RequestBuilder {
        let builder = self.client.post(url).json(&GenerateChapterBody::from(request));
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token).query(&[("token", token)]),
            None => builder,
        }
    }

    /// 非流式生成一章（流式接口不可用时的备用方案）
    ///
    /// 整章生成完毕后一次性返回，不经过状态机。
    pub async fn generate_chapter(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedChapter, TransportError> {
        let url = self.generation_url(request);

        tracing::debug!(
            url = %url,
            story_id = %request.story_id(),
            kind = request.kind().as_str(),
            "Requesting chapter generation"
        );

        let response = self
            .generation_post(&url, request)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::NetworkError(e.to_string()))?;
        let generated = decode_generated_chapter(&body)?;

        tracing::info!(
            story_id = %request.story_id(),
            choices = generated.choices.len(),
            "Chapter generated"
        );
        Ok(generated)
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::NetworkError(format!("Cannot connect to story service: {}", e))
    } else {
        TransportError::NetworkError(e.to_string())
    }
}

async fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    Err(TransportError::ServiceError(format!(
        "HTTP {}: {}",
        status, error_text
    )))
}

#[async_trait]
impl StreamTransportPort for SseStreamTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<StreamHandle, TransportError> {
        let url = self.stream_url(request);

        tracing::debug!(
            url = %url,
            story_id = %request.story_id(),
            kind = request.kind().as_str(),
            "Opening chapter generation stream"
        );

        let response = self
            .generation_post(&url, request)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(map_send_error)?;
        let response = ensure_success(response).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let closer = CancellationToken::new();
        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);

        tokio::spawn(forward_events(response, tx, closer.clone(), idle_timeout));

        tracing::info!(story_id = %request.story_id(), "Chapter generation stream opened");
        Ok(StreamHandle::new(rx, closer))
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// 读取 SSE 响应体并转发为领域事件
///
/// 遇到传输错误或空闲超时时发送一次错误后退出；
/// `closer` 被取消或接收端被丢弃时直接退出并释放连接。
async fn forward_events(
    response: Response,
    tx: mpsc::Sender<StreamItem>,
    closer: CancellationToken,
    idle_timeout: Duration,
) {
    let mut events = std::pin::pin!(response.bytes_stream().eventsource());

    loop {
        let next = tokio::select! {
            _ = closer.cancelled() => {
                tracing::debug!("Generation stream closed by consumer");
                break;
            }
            next = tokio::time::timeout(idle_timeout, events.next()) => next,
        };

        let item = match next {
            Err(_) => {
                tracing::warn!(idle_secs = idle_timeout.as_secs(), "Generation stream idle timeout");
                Err(TransportError::Timeout)
            }
            Ok(None) => {
                tracing::debug!("Generation stream ended by server");
                break;
            }
            Ok(Some(Err(e))) => Err(TransportError::NetworkError(e.to_string())),
            Ok(Some(Ok(event))) => match decode_event(&event.event, &event.data) {
                Ok(Some(event)) => Ok(event),
                Ok(None) => continue,
                Err(e) => Err(e),
            },
        };

        let is_error = item.is_err();
        if tx.send(item).await.is_err() || is_error {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::generation::{Choice, GenerationEvent};
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::sse::{Event, Sse};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use futures_util::stream;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        story_id: String,
        body: serde_json::Value,
        token: Option<String>,
        authorization: Option<String>,
    }

    #[derive(Clone, Default)]
    struct TestState {
        captured: Arc<Mutex<Vec<CapturedRequest>>>,
    }

    fn scripted_events() -> Vec<Result<Event, Infallible>> {
        vec![
            Ok(Event::default().data(r#"{"type":"start","chapter_id":"c1"}"#)),
            Ok(Event::default().data(r#"{"type":"heartbeat"}"#)),
            Ok(Event::default().data(r#"{"type":"title","title":"夜色"}"#)),
            Ok(Event::default().event("content").data(r#"{"content":"从前"}"#)),
            Ok(Event::default().data(
                r#"{"type":"complete","chapter":{"id":"c1","title":"夜色","content":"从前"},"choices":[{"id":1,"text":"逃跑"}]}"#,
            )),
        ]
    }

    async fn generate_stream(
        State(state): State<TestState>,
        Path(story_id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> AxumResponse {
        state.captured.lock().push(CapturedRequest {
            story_id: story_id.clone(),
            body,
            token: query.get("token").cloned(),
            authorization: headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });

        match story_id.as_str() {
            "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "model unavailable").into_response(),
            "slow" => {
                let first = stream::iter(vec![Ok::<_, Infallible>(
                    Event::default().data(r#"{"type":"start"}"#),
                )]);
                Sse::new(first.chain(stream::pending())).into_response()
            }
            "garbled" => Sse::new(stream::iter(vec![Ok::<_, Infallible>(
                Event::default().data("{not json"),
            )]))
            .into_response(),
            _ => Sse::new(stream::iter(scripted_events())).into_response(),
        }
    }

    async fn generate_whole(
        State(state): State<TestState>,
        Path(story_id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> AxumResponse {
        state.captured.lock().push(CapturedRequest {
            story_id: story_id.clone(),
            body,
            token: query.get("token").cloned(),
            authorization: headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });

        match story_id.as_str() {
            "broken" => (StatusCode::SERVICE_UNAVAILABLE, "model unavailable").into_response(),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({})).into_response()
            }
            _ => Json(serde_json::json!({
                "data": {
                    "chapter": {"id": "c2", "title": "黎明", "content": "天亮了"},
                    "choices": [{"id": 1, "text": "出发"}]
                }
            }))
            .into_response(),
        }
    }

    async fn spawn_server() -> (String, TestState) {
        let state = TestState::default();
        let app = Router::new()
            .route(
                "/api/stories/:story_id/chapters/generate/stream",
                post(generate_stream),
            )
            .route(
                "/api/stories/:story_id/chapters/generate",
                post(generate_whole),
            )
            .route("/api/health", get(|| async { "ok" }))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/api", addr), state)
    }

    async fn collect(handle: &mut StreamHandle) -> Vec<StreamItem> {
        let mut items = Vec::new();
        while let Some(item) = handle.next_event().await {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_config_default() {
        let config = SseTransportConfig::default();
        assert_eq!(config.base_url, "http://localhost:20001/api");
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.idle_timeout_secs, 120);
        assert_eq!(config.request_timeout_secs, 300);
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_urls_ignore_trailing_slash() {
        let transport =
            SseStreamTransport::new(SseTransportConfig::new("http://story.local/api/")).unwrap();
        let request = GenerationRequest::first("s1").unwrap();

        assert_eq!(
            transport.stream_url(&request),
            "http://story.local/api/stories/s1/chapters/generate/stream"
        );
        assert_eq!(
            transport.generation_url(&request),
            "http://story.local/api/stories/s1/chapters/generate"
        );
        assert_eq!(transport.health_url(), "http://story.local/api/health");
    }

    #[tokio::test]
    async fn test_stream_delivers_events_in_order() {
        let (base_url, state) = spawn_server().await;
        let transport = SseStreamTransport::new(SseTransportConfig::new(base_url)).unwrap();

        let mut handle = transport
            .open(&GenerationRequest::first("s1").unwrap())
            .await
            .unwrap();
        let events: Vec<GenerationEvent> = collect(&mut handle)
            .await
            .into_iter()
            .map(|item| item.unwrap())
            .collect();

        let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["start", "title", "content", "complete"]);
        assert_eq!(events[2], GenerationEvent::content("从前"));
        if let GenerationEvent::Complete { choices, .. } = &events[3] {
            assert_eq!(choices, &vec![Choice::new(1, "逃跑")]);
        } else {
            panic!("expected complete event");
        }

        let captured = state.captured.lock().clone();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].story_id, "s1");
        assert_eq!(captured[0].body, serde_json::json!({"type": "first"}));
        assert!(captured[0].token.is_none());
    }

    #[tokio::test]
    async fn test_continue_request_sends_choice_and_token() {
        let (base_url, state) = spawn_server().await;
        let transport = SseStreamTransport::new(
            SseTransportConfig::new(base_url).with_auth_token("secret"),
        )
        .unwrap();
        let request = GenerationRequest::continuation("s2", "c1", Some(0), "逃跑").unwrap();

        let mut handle = transport.open(&request).await.unwrap();
        collect(&mut handle).await;

        let captured = state.captured.lock().clone();
        assert_eq!(
            captured[0].body,
            serde_json::json!({
                "type": "continue",
                "previous_chapter_id": "c1",
                "choice_index": 0,
                "choice_text": "逃跑",
            })
        );
        assert_eq!(captured[0].token.as_deref(), Some("secret"));
        assert_eq!(captured[0].authorization.as_deref(), Some("Bearer secret"));
    }

    #[tokio::test]
    async fn test_error_status_is_service_error() {
        let (base_url, _state) = spawn_server().await;
        let transport = SseStreamTransport::new(SseTransportConfig::new(base_url)).unwrap();

        let result = transport
            .open(&GenerationRequest::first("broken").unwrap())
            .await;

        match result {
            Err(TransportError::ServiceError(message)) => {
                assert!(message.contains("500"));
                assert!(message.contains("model unavailable"));
            }
            other => panic!("expected service error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_malformed_event_ends_stream_with_error() {
        let (base_url, _state) = spawn_server().await;
        let transport = SseStreamTransport::new(SseTransportConfig::new(base_url)).unwrap();

        let mut handle = transport
            .open(&GenerationRequest::first("garbled").unwrap())
            .await
            .unwrap();
        let items = collect(&mut handle).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(TransportError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_idle_stream_times_out() {
        let (base_url, _state) = spawn_server().await;
        let transport =
            SseStreamTransport::new(SseTransportConfig::new(base_url).with_idle_timeout(1))
                .unwrap();

        let mut handle = transport
            .open(&GenerationRequest::first("slow").unwrap())
            .await
            .unwrap();

        assert_eq!(
            handle.next_event().await.unwrap().unwrap(),
            GenerationEvent::start()
        );
        assert!(matches!(
            handle.next_event().await,
            Some(Err(TransportError::Timeout))
        ));
        assert!(handle.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_close_stops_forwarding() {
        let (base_url, _state) = spawn_server().await;
        let transport = SseStreamTransport::new(SseTransportConfig::new(base_url)).unwrap();

        let mut handle = transport
            .open(&GenerationRequest::first("slow").unwrap())
            .await
            .unwrap();
        assert!(handle.next_event().await.is_some());

        handle.close();

        assert!(handle.is_closed());
        assert!(handle.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_generate_chapter_returns_whole_chapter() {
        let (base_url, state) = spawn_server().await;
        let transport = SseStreamTransport::new(
            SseTransportConfig::new(base_url).with_auth_token("secret"),
        )
        .unwrap();
        let request = GenerationRequest::continuation("s3", "c1", Some(1), "战斗").unwrap();

        let generated = transport.generate_chapter(&request).await.unwrap();

        assert_eq!(generated.chapter.id.as_ref().map(|id| id.as_str()), Some("c2"));
        assert_eq!(generated.chapter.title.as_deref(), Some("黎明"));
        assert_eq!(generated.chapter.content.as_deref(), Some("天亮了"));
        assert_eq!(generated.choices, vec![Choice::new(1, "出发")]);

        let captured = state.captured.lock().clone();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].story_id, "s3");
        assert_eq!(captured[0].body["type"], "continue");
        assert_eq!(captured[0].body["choice_index"], 1);
        assert_eq!(captured[0].token.as_deref(), Some("secret"));
        assert_eq!(captured[0].authorization.as_deref(), Some("Bearer secret"));
    }

    #[tokio::test]
    async fn test_generate_chapter_error_status() {
        let (base_url, _state) = spawn_server().await;
        let transport = SseStreamTransport::new(SseTransportConfig::new(base_url)).unwrap();

        let result = transport
            .generate_chapter(&GenerationRequest::first("broken").unwrap())
            .await;

        match result {
            Err(TransportError::ServiceError(message)) => {
                assert!(message.contains("503"));
                assert!(message.contains("model unavailable"));
            }
            other => panic!("expected service error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_chapter_request_timeout() {
        let (base_url, _state) = spawn_server().await;
        let transport =
            SseStreamTransport::new(SseTransportConfig::new(base_url).with_request_timeout(1))
                .unwrap();

        let result = transport
            .generate_chapter(&GenerationRequest::first("slow").unwrap())
            .await;

        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (base_url, _state) = spawn_server().await;
        let transport = SseStreamTransport::new(SseTransportConfig::new(base_url)).unwrap();
        assert!(transport.health_check().await);

        let unreachable = SseStreamTransport::new(
            SseTransportConfig::new("http://127.0.0.1:1/api").with_connect_timeout(1),
        )
        .unwrap();
        assert!(!unreachable.health_check().await);
    }
}

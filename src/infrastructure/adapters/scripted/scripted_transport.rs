//! Scripted Transport - 内存中的生成流
//!
//! 不连接后端，每次 `open()` 创建一个由调用方手动推送事件的流。
//! 用于测试和离线演示。

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{StreamHandle, StreamItem, StreamTransportPort, TransportError};
use crate::domain::generation::{GenerationEvent, GenerationRequest};

const STREAM_BUFFER: usize = 64;

/// 已打开流的控制端
pub struct ScriptedStream {
    request: GenerationRequest,
    sender: mpsc::Sender<StreamItem>,
    closer: CancellationToken,
}

impl ScriptedStream {
    /// 打开该流时使用的请求
    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    /// 推送事件；接收端已关闭时返回 `false`
    pub async fn send(&self, event: GenerationEvent) -> bool {
        self.sender.send(Ok(event)).await.is_ok()
    }

    /// 推送传输错误
    pub async fn send_error(&self, error: TransportError) -> bool {
        self.sender.send(Err(error)).await.is_ok()
    }

    /// 模拟对端关闭连接
    pub fn finish(self) {
        drop(self.sender);
    }

    /// 消费端是否已关闭该流
    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// 等待消费端关闭该流
    pub async fn closed(&self) {
        self.closer.cancelled().await;
    }
}

/// 脚本化传输
pub struct ScriptedTransport {
    streams: Mutex<VecDeque<ScriptedStream>>,
    open_failures: Mutex<VecDeque<TransportError>>,
    opened: AtomicUsize,
    healthy: AtomicBool,
    stalled: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(VecDeque::new()),
            open_failures: Mutex::new(VecDeque::new()),
            opened: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
            stalled: AtomicBool::new(false),
        }
    }

    /// 下一次 `open()` 返回该错误
    pub fn fail_next_open(&self, error: TransportError) {
        self.open_failures.lock().push_back(error);
    }

    /// 取出最早打开且尚未取出的流
    pub fn take_stream(&self) -> Option<ScriptedStream> {
        self.streams.lock().pop_front()
    }

    /// 成功打开的流数量
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// 之后的 `open()` 永不返回（模拟接受连接却不响应的后端）
    pub fn stall_opens(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamTransportPort for ScriptedTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<StreamHandle, TransportError> {
        if self.stalled.load(Ordering::SeqCst) {
            tracing::debug!(story_id = %request.story_id(), "ScriptedTransport: stalling open");
            std::future::pending::<()>().await;
        }

        if let Some(error) = self.open_failures.lock().pop_front() {
            tracing::debug!(story_id = %request.story_id(), error = %error, "ScriptedTransport: failing open");
            return Err(error);
        }

        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        let closer = CancellationToken::new();
        self.streams.lock().push_back(ScriptedStream {
            request: request.clone(),
            sender,
            closer: closer.clone(),
        });
        self.opened.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(story_id = %request.story_id(), "ScriptedTransport: stream opened");
        Ok(StreamHandle::new(receiver, closer))
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_hands_out_streams_in_order() {
        let transport = ScriptedTransport::new();
        let mut first = transport
            .open(&GenerationRequest::first("s1").unwrap())
            .await
            .unwrap();
        let _second = transport
            .open(&GenerationRequest::first("s2").unwrap())
            .await
            .unwrap();

        assert_eq!(transport.open_count(), 2);
        let stream = transport.take_stream().unwrap();
        assert_eq!(stream.request().story_id().as_str(), "s1");

        assert!(stream.send(GenerationEvent::start()).await);
        assert_eq!(first.next_event().await.unwrap().unwrap(), GenerationEvent::start());

        first.close();
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn test_fail_next_open() {
        let transport = ScriptedTransport::new();
        transport.fail_next_open(TransportError::Timeout);

        let result = transport.open(&GenerationRequest::first("s1").unwrap()).await;

        assert!(matches!(result, Err(TransportError::Timeout)));
        assert_eq!(transport.open_count(), 0);
        assert!(transport.take_stream().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_open_never_resolves() {
        let transport = ScriptedTransport::new();
        transport.stall_opens(true);

        let request = GenerationRequest::first("s1").unwrap();
        let result =
            tokio::time::timeout(std::time::Duration::from_secs(3600), transport.open(&request))
                .await;

        assert!(result.is_err());
        assert_eq!(transport.open_count(), 0);
    }
}

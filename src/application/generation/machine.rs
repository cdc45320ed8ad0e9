//! Generation State Machine
//!
//! 持有唯一的 [`GenerationSession`]，保证同一时刻最多只有一个进行中的生成，
//! 并通过 `watch` 通道向订阅者发布快照。状态机本身不做 I/O，
//! 只持有当前流的关闭令牌。

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::generation::{
    EventOutcome, GenerationError, GenerationEvent, GenerationFailure, GenerationId,
    GenerationRequest, GenerationSession, GenerationStatus, ProgressPolicy,
};

/// 发布给订阅者的不可变快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationSnapshot {
    /// 快照数据所属的会话；从未开始或 reset 之后为 `None`
    pub generation_id: Option<GenerationId>,
    pub session: GenerationSession,
}

impl GenerationSnapshot {
    /// 会话是否已经不再进行（完成、失败、停止或从未开始）
    pub fn is_settled(&self) -> bool {
        !self.session.status().is_active()
    }

    /// 失败会话对应的错误；未失败时为 `None`
    pub fn error(&self) -> Option<GenerationError> {
        self.session.error().map(GenerationError::from)
    }
}

/// 事件投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 事件属于已被停止或替换的会话，已丢弃
    Stale,
    /// 会话已处于终态，事件被忽略
    Ignored,
    /// 会话已更新
    Applied,
    /// 会话进入终态，流已关闭
    Finished,
}

impl Delivery {
    /// 投递方是否应停止读取该流
    pub fn ends_stream(&self) -> bool {
        !matches!(self, Self::Applied)
    }
}

struct ActiveGeneration {
    id: GenerationId,
    stream: Option<CancellationToken>,
}

impl ActiveGeneration {
    fn close(self) {
        if let Some(stream) = self.stream {
            stream.cancel();
        }
    }
}

/// 章节生成状态机
pub struct GenerationStateMachine {
    session: GenerationSession,
    policy: ProgressPolicy,
    last_issued: GenerationId,
    session_id: Option<GenerationId>,
    active: Option<ActiveGeneration>,
    snapshots: watch::Sender<GenerationSnapshot>,
}

impl GenerationStateMachine {
    pub fn new(policy: ProgressPolicy) -> Self {
        let (snapshots, _) = watch::channel(GenerationSnapshot::default());
        Self {
            session: GenerationSession::new(),
            policy,
            last_issued: GenerationId::from_raw(0),
            session_id: None,
            active: None,
            snapshots,
        }
    }

    /// 订阅快照
    pub fn subscribe(&self) -> watch::Receiver<GenerationSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> GenerationSnapshot {
        GenerationSnapshot {
            generation_id: self.session_id,
            session: self.session.clone(),
        }
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    pub fn status(&self) -> GenerationStatus {
        self.session.status()
    }

    /// 当前是否接受该会话的事件
    pub fn is_current(&self, id: GenerationId) -> bool {
        self.active.as_ref().is_some_and(|active| active.id == id)
    }

    /// 开始新会话
    ///
    /// 进行中的会话存在时返回 `AlreadyGenerating`，现有会话不受影响。
    pub fn begin(&mut self, request: GenerationRequest) -> Result<GenerationId, GenerationError> {
        if self.session.status().is_active() {
            tracing::warn!(
                active = ?self.session_id,
                story_id = %request.story_id(),
                "Chapter generation already in progress"
            );
            return Err(GenerationError::AlreadyGenerating);
        }

        let id = self.last_issued.next();
        self.last_issued = id;

        tracing::info!(
            generation_id = %id,
            story_id = %request.story_id(),
            kind = request.kind().as_str(),
            "Chapter generation started"
        );

        self.session.begin(request, Utc::now());
        self.session_id = Some(id);
        self.active = Some(ActiveGeneration { id, stream: None });
        self.publish();
        Ok(id)
    }

    /// 登记会话的流关闭令牌
    ///
    /// 会话已被停止或替换时返回 `false`，调用方应自行关闭该流。
    pub fn attach_stream(&mut self, id: GenerationId, stream: CancellationToken) -> bool {
        match self.active.as_mut() {
            Some(active) if active.id == id => {
                active.stream = Some(stream);
                true
            }
            _ => {
                tracing::debug!(generation_id = %id, "Stream opened for stale generation");
                false
            }
        }
    }

    /// 投递一个传输事件
    pub fn accept(&mut self, id: GenerationId, event: GenerationEvent) -> Delivery {
        if !self.is_current(id) {
            tracing::debug!(
                generation_id = %id,
                event = event.kind(),
                "Dropping event from stale generation"
            );
            return Delivery::Stale;
        }

        let kind = event.kind();
        match self.session.apply(event, &self.policy) {
            EventOutcome::Ignored => {
                tracing::debug!(generation_id = %id, event = kind, "Event ignored");
                Delivery::Ignored
            }
            EventOutcome::Updated => {
                tracing::trace!(
                    generation_id = %id,
                    event = kind,
                    progress = self.session.progress_percent(),
                    "Generation progressed"
                );
                self.publish();
                Delivery::Applied
            }
            EventOutcome::Finished => {
                self.finish(id);
                self.publish();
                Delivery::Finished
            }
        }
    }

    /// 以失败结束会话（连接错误、超时等）
    pub fn fail(&mut self, id: GenerationId, failure: GenerationFailure) -> Delivery {
        if !self.is_current(id) {
            tracing::debug!(generation_id = %id, "Dropping failure from stale generation");
            return Delivery::Stale;
        }

        match self.session.fail(failure) {
            EventOutcome::Finished => {
                self.finish(id);
                self.publish();
                Delivery::Finished
            }
            _ => Delivery::Ignored,
        }
    }

    /// 停止生成；对已空闲的状态机无影响
    pub fn stop(&mut self) {
        let active = self.active.take();
        let was_idle = self.session.status() == GenerationStatus::Idle;

        if let Some(active) = active {
            tracing::info!(generation_id = %active.id, "Chapter generation stopped");
            active.close();
        }

        if was_idle {
            return;
        }
        self.session.halt();
        self.publish();
    }

    /// 停止并清空所有会话字段
    pub fn reset(&mut self) {
        if let Some(active) = self.active.take() {
            active.close();
        }
        self.session.clear();
        self.session_id = None;
        self.publish();
    }

    /// 清除上一次的错误，为重新生成做准备
    pub fn clear_error(&mut self) -> Result<(), GenerationError> {
        if self.session.status().is_active() {
            return Err(GenerationError::AlreadyGenerating);
        }
        if self.session.error().is_some() {
            self.session.clear_error();
            self.publish();
        }
        Ok(())
    }

    fn finish(&mut self, id: GenerationId) {
        if let Some(active) = self.active.take() {
            active.close();
        }

        match self.session.error() {
            Some(failure) => tracing::warn!(
                generation_id = %id,
                kind = ?failure.kind,
                error = %failure.message,
                "Chapter generation failed"
            ),
            None => tracing::info!(
                generation_id = %id,
                title = %self.session.title(),
                content_len = self.session.content().len(),
                choices = self.session.choices().len(),
                "Chapter generation completed"
            ),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

impl Default for GenerationStateMachine {
    fn default() -> Self {
        Self::new(ProgressPolicy::default())
    }
}

//! Generation Facade
//!
//! 面向展示层的入口：校验参数、打开生成流、驱动状态机，
//! 并提供快照与派生视图。每个 facade 持有自己的状态机，
//! 被丢弃时会停止正在进行的生成。

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::machine::{GenerationSnapshot, GenerationStateMachine};
use super::view::{generation_stats, GenerationView};
use crate::application::ports::{StreamHandle, StreamTransportPort};
use crate::domain::generation::{
    GenerationError, GenerationFailure, GenerationId, GenerationRequest, GenerationStats,
    ProgressPolicy,
};

/// Facade 配置
#[derive(Debug, Clone)]
pub struct GenerationFacadeConfig {
    /// 进度调度
    pub progress: ProgressPolicy,
    /// 单次生成的最长时间，超过后强制失败
    pub max_duration: Duration,
    /// 剩余时间估算使用的单章预计耗时
    pub estimated_duration: Duration,
}

impl Default for GenerationFacadeConfig {
    fn default() -> Self {
        Self {
            progress: ProgressPolicy::default(),
            max_duration: Duration::from_secs(300),
            estimated_duration: Duration::from_secs(30),
        }
    }
}

impl GenerationFacadeConfig {
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }
}

type SharedMachine = Arc<Mutex<GenerationStateMachine>>;

/// 章节生成 Facade
pub struct GenerationFacade {
    machine: SharedMachine,
    transport: Arc<dyn StreamTransportPort>,
    config: GenerationFacadeConfig,
}

impl GenerationFacade {
    pub fn new(transport: Arc<dyn StreamTransportPort>, config: GenerationFacadeConfig) -> Self {
        Self {
            machine: Arc::new(Mutex::new(GenerationStateMachine::new(config.progress))),
            transport,
            config,
        }
    }

    /// 生成第一章
    pub async fn start_first_chapter(
        &self,
        story_id: &str,
    ) -> Result<GenerationId, GenerationError> {
        let request = GenerationRequest::first(story_id)?;
        self.start(request).await
    }

    /// 根据读者的选择续写下一章
    ///
    /// `choice_index` 为 `None` 视为缺失；`Some(0)` 是合法的第一个选项。
    pub async fn continue_story(
        &self,
        story_id: &str,
        previous_chapter_id: &str,
        choice_index: Option<u32>,
        choice_text: &str,
    ) -> Result<GenerationId, GenerationError> {
        let request =
            GenerationRequest::continuation(story_id, previous_chapter_id, choice_index, choice_text)?;
        self.start(request).await
    }

    /// 开始一次生成
    ///
    /// 只有参数错误和 `AlreadyGenerating` 会以 `Err` 返回；
    /// 连接失败会让会话进入 `Failed`，通过快照观察。
    ///
    /// 打开流与读取事件都在后台任务中进行并受超时看门狗约束；
    /// 本方法等待流打开（或失败）后返回，被取消时后台任务照常运行。
    pub async fn start(&self, request: GenerationRequest) -> Result<GenerationId, GenerationError> {
        let opening = CancellationToken::new();
        let id = {
            let mut machine = self.machine.lock();
            let id = machine.begin(request.clone())?;
            machine.attach_stream(id, opening.clone());
            id
        };
        let deadline = Instant::now() + self.config.max_duration;
        let (opened_tx, opened_rx) = oneshot::channel();

        tokio::spawn(run_generation(
            self.machine.clone(),
            self.transport.clone(),
            id,
            request,
            opening,
            deadline,
            self.config.max_duration,
            opened_tx,
        ));

        // 发送端被丢弃同样表示打开阶段已结束
        let _ = opened_rx.await;
        Ok(id)
    }

    /// 停止当前生成（幂等）
    pub fn stop(&self) {
        self.machine.lock().stop();
    }

    /// 为重新生成做准备：进行中时返回 `AlreadyGenerating`，否则清除错误
    pub fn retry(&self) -> Result<(), GenerationError> {
        self.machine.lock().clear_error()
    }

    /// 清除错误信息
    pub fn clear_error(&self) {
        if let Err(e) = self.machine.lock().clear_error() {
            tracing::debug!(error = %e, "Error not cleared");
        }
    }

    /// 停止并清空所有状态
    pub fn reset(&self) {
        self.machine.lock().reset();
    }

    pub fn snapshot(&self) -> GenerationSnapshot {
        self.machine.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationSnapshot> {
        self.machine.lock().subscribe()
    }

    pub fn view(&self) -> GenerationView {
        GenerationView::from_session(self.machine.lock().session())
    }

    pub fn stats(&self) -> GenerationStats {
        generation_stats(
            self.machine.lock().session(),
            self.config.estimated_duration,
            Utc::now(),
        )
    }

    /// 等待当前会话结束（完成、失败或停止）
    pub async fn wait_for_outcome(&self) -> GenerationSnapshot {
        let mut rx = self.subscribe();
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if snapshot.is_settled() {
                return snapshot;
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// 检查后端是否可用
    pub async fn health_check(&self) -> bool {
        self.transport.health_check().await
    }
}

impl Drop for GenerationFacade {
    fn drop(&mut self) {
        self.machine.lock().stop();
    }
}

/// 打开生成流并读取到会话结束
///
/// `opening` 在打开阶段代表该会话登记在状态机上的关闭令牌，
/// 打开成功后替换为流自身的关闭令牌。
#[allow(clippy::too_many_arguments)]
async fn run_generation(
    machine: SharedMachine,
    transport: Arc<dyn StreamTransportPort>,
    id: GenerationId,
    request: GenerationRequest,
    opening: CancellationToken,
    deadline: Instant,
    max_duration: Duration,
    opened: oneshot::Sender<()>,
) {
    let handle = tokio::select! {
        biased;

        _ = opening.cancelled() => {
            tracing::debug!(generation_id = %id, "Generation stopped while opening stream");
            return;
        }
        _ = tokio::time::sleep_until(deadline) => {
            tracing::warn!(
                generation_id = %id,
                limit_secs = max_duration.as_secs(),
                "Timed out opening generation stream"
            );
            machine
                .lock()
                .fail(id, GenerationFailure::timeout(max_duration.as_secs()));
            return;
        }
        result = transport.open(&request) => match result {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(generation_id = %id, error = %e, "Failed to open generation stream");
                machine.lock().fail(id, e.into());
                return;
            }
        },
    };

    let attached = machine.lock().attach_stream(id, handle.closer());
    if !attached {
        // 打开完成前已被 stop()/reset() 取消
        handle.close();
        return;
    }
    let _ = opened.send(());

    pump_events(machine, id, handle, deadline, max_duration).await;
}

/// 读取一个生成流直到会话结束
async fn pump_events(
    machine: SharedMachine,
    id: GenerationId,
    mut handle: StreamHandle,
    deadline: Instant,
    max_duration: Duration,
) {
    let closer = handle.closer();
    let watchdog = tokio::time::sleep_until(deadline);
    tokio::pin!(watchdog);

    loop {
        tokio::select! {
            biased;

            _ = closer.cancelled() => {
                tracing::debug!(generation_id = %id, "Generation stream closed");
                break;
            }
            _ = &mut watchdog => {
                tracing::warn!(
                    generation_id = %id,
                    limit_secs = max_duration.as_secs(),
                    "Chapter generation timed out"
                );
                machine
                    .lock()
                    .fail(id, GenerationFailure::timeout(max_duration.as_secs()));
                break;
            }
            item = handle.next_event() => {
                let delivery = match item {
                    Some(Ok(event)) => machine.lock().accept(id, event),
                    Some(Err(e)) => {
                        tracing::warn!(generation_id = %id, error = %e, "Generation stream error");
                        machine.lock().fail(id, e.into())
                    }
                    None => machine.lock().fail(
                        id,
                        GenerationFailure::connection("连接已关闭，章节未生成完成"),
                    ),
                };
                if delivery.ends_stream() {
                    break;
                }
            }
        }
    }

    handle.close();
}

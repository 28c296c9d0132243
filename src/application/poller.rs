//! Job Status Poller - 作业状态轮询
//!
//! 固定频率轮询原语: 按间隔拉取状态快照，直到判定谓词满足、超出
//! tick 上限或被取消。每个作业持有自己的取消句柄，句柄被丢弃即
//! 取消——不存在跨作业共享的定时器。

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::ServiceError;
use crate::domain::knowledge::FileStatus;

/// 轮询配置
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// 轮询间隔
    pub interval: Duration,
    /// 最大 tick 数，超出后以 TimedOut 结束
    pub max_ticks: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_ticks: 300,
        }
    }
}

/// 轮询事件
///
/// 每次拉取成功都会先发 Tick（调用方据此刷新失败子集等视图），
/// Done / TimedOut / Error 为终止事件，此后通道关闭
#[derive(Debug)]
pub enum PollEvent {
    Tick(Vec<FileStatus>),
    Done(Vec<FileStatus>),
    TimedOut,
    Error(ServiceError),
}

/// 轮询取消句柄
///
/// 由启动方独占持有；cancel（或 drop）之后保证零事件投递——
/// 取消瞬间在途的拉取结果到达后直接丢弃，不进通道
#[derive(Debug)]
pub struct PollHandle {
    token: CancellationToken,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// 作业状态轮询器
pub struct JobStatusPoller;

impl JobStatusPoller {
    /// 启动轮询循环
    ///
    /// 首次拉取发生在一个间隔之后。循环内同一时刻至多一个在途
    /// 拉取: 慢请求期间错过的 tick 不会补发（MissedTickBehavior::Delay），
    /// 因此不存在并发的重复拉取。
    pub fn start<F, Fut, D>(
        config: PollerConfig,
        fetch: F,
        is_done: D,
    ) -> (PollHandle, mpsc::Receiver<PollEvent>)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<FileStatus>, ServiceError>> + Send + 'static,
        D: Fn(&[FileStatus]) -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        let token = CancellationToken::new();
        let task_token = token.clone();

        tokio::spawn(async move {
            let mut interval =
                time::interval_at(Instant::now() + config.interval, config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks: u32 = 0;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                ticks += 1;

                // 取消与拉取竞争: 取消获胜时在途结果被丢弃
                let result = tokio::select! {
                    _ = task_token.cancelled() => break,
                    result = fetch() => result,
                };

                match result {
                    Ok(snapshot) => {
                        let finished = is_done(&snapshot);
                        if !deliver(&tx, &task_token, PollEvent::Tick(snapshot.clone())).await {
                            break;
                        }
                        if finished {
                            deliver(&tx, &task_token, PollEvent::Done(snapshot)).await;
                            break;
                        }
                        if ticks >= config.max_ticks {
                            tracing::warn!(ticks = ticks, "Job status poll exceeded max ticks");
                            deliver(&tx, &task_token, PollEvent::TimedOut).await;
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Job status fetch failed, stopping poll");
                        deliver(&tx, &task_token, PollEvent::Error(e)).await;
                        break;
                    }
                }
            }
        });

        (PollHandle { token }, rx)
    }
}

/// 投递事件；取消后返回 false 且不投递
async fn deliver(
    tx: &mpsc::Sender<PollEvent>,
    token: &CancellationToken,
    event: PollEvent,
) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{status, FileId};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    fn snapshot(code: i32) -> Vec<FileStatus> {
        vec![FileStatus::new(FileId::new("f1"), code)]
    }

    fn scripted_fetch(
        script: Vec<Vec<FileStatus>>,
    ) -> impl Fn() -> std::pin::Pin<
        Box<dyn Future<Output = Result<Vec<FileStatus>, ServiceError>> + Send>,
    > + Send
           + 'static {
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        move || {
            let script = script.clone();
            Box::pin(async move {
                let next = script.lock().unwrap().pop_front();
                // 脚本耗尽后停在"处理中"
                Ok(next.unwrap_or_else(|| snapshot(0)))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_done() {
        let fetch = scripted_fetch(vec![snapshot(0), snapshot(3), snapshot(5)]);
        let (_handle, mut rx) =
            JobStatusPoller::start(PollerConfig::default(), fetch, status::slice_poll_finished);

        let mut ticks = 0;
        loop {
            match rx.recv().await.expect("poller closed early") {
                PollEvent::Tick(_) => ticks += 1,
                PollEvent::Done(snap) => {
                    assert_eq!(snap[0].status, 5);
                    break;
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        // 三次拉取各有一个 Tick，最后一次还伴随 Done
        assert_eq!(ticks, 3);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_tick_delivered_before_done() {
        let fetch = scripted_fetch(vec![snapshot(0), snapshot(1)]);
        let (_handle, mut rx) =
            JobStatusPoller::start(PollerConfig::default(), fetch, status::slice_poll_finished);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert!(matches!(events[0], PollEvent::Tick(_)));
        assert!(matches!(events[1], PollEvent::Tick(_)));
        assert!(matches!(events[2], PollEvent::Done(_)));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_in_flight_fetch() {
        let entered = Arc::new(Notify::new());
        let entered_signal = entered.clone();
        let fetch = move || {
            let entered = entered_signal.clone();
            Box::pin(async move {
                entered.notify_one();
                // 挂起直到被取消
                std::future::pending::<()>().await;
                Ok(snapshot(5))
            })
                as std::pin::Pin<
                    Box<dyn Future<Output = Result<Vec<FileStatus>, ServiceError>> + Send>,
                >
        };

        let (handle, mut rx) =
            JobStatusPoller::start(PollerConfig::default(), fetch, status::slice_poll_finished);

        // 等到拉取真正在途后再取消
        entered.notified().await;
        handle.cancel();

        // 零事件: 通道直接关闭
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_ticks() {
        let config = PollerConfig {
            interval: Duration::from_millis(1000),
            max_ticks: 3,
        };
        let fetch = scripted_fetch(vec![]);
        let (_handle, mut rx) =
            JobStatusPoller::start(config, fetch, status::slice_poll_finished);

        let mut ticks = 0;
        loop {
            match rx.recv().await.expect("poller closed early") {
                PollEvent::Tick(_) => ticks += 1,
                PollEvent::TimedOut => break,
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(ticks, 3);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_terminates_poll() {
        let calls = Arc::new(Mutex::new(0u32));
        let calls_in_fetch = calls.clone();
        let fetch = move || {
            let calls = calls_in_fetch.clone();
            Box::pin(async move {
                *calls.lock().unwrap() += 1;
                Err(ServiceError::NetworkError("connection refused".to_string()))
            })
                as std::pin::Pin<
                    Box<dyn Future<Output = Result<Vec<FileStatus>, ServiceError>> + Send>,
                >
        };

        let (_handle, mut rx) =
            JobStatusPoller::start(PollerConfig::default(), fetch, status::slice_poll_finished);

        assert!(matches!(rx.recv().await, Some(PollEvent::Error(_))));
        assert!(rx.recv().await.is_none());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let fetch = scripted_fetch(vec![]);
        let (handle, mut rx) =
            JobStatusPoller::start(PollerConfig::default(), fetch, status::slice_poll_finished);
        drop(handle);

        let mut remaining = 0;
        while rx.recv().await.is_some() {
            remaining += 1;
        }
        // drop 发生在首个间隔之前，不应有任何事件
        assert_eq!(remaining, 0);
    }
}

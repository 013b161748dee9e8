use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select, unbounded};

use crate::error::QueueError;
use crate::frame::Frame;

struct SignalState {
    tx: Option<Sender<()>>,
    rx: Receiver<()>,
}

impl SignalState {
    fn armed() -> Self {
        let (tx, rx) = bounded(0);
        Self { tx: Some(tx), rx }
    }
}

/// 一次性的广播信号
///
/// 触发时丢弃发送端，所有通过 [`Signal::waiter`] 获得的接收端立即返回断开错误，
/// 因此可以直接放进 `select!` 中等待。
#[derive(Clone)]
pub struct Signal {
    state: Arc<Mutex<SignalState>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("triggered", &self.is_triggered()).finish()
    }
}

impl Signal {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(SignalState::armed())) }
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 触发信号，重复调用无副作用
    pub fn trigger(&self) {
        self.lock().tx.take();
    }

    pub fn is_triggered(&self) -> bool {
        self.lock().tx.is_none()
    }

    pub fn waiter(&self) -> Receiver<()> {
        self.lock().rx.clone()
    }

    /// 恢复到未触发状态，之前取得的 waiter 不受影响
    pub fn rearm(&self) {
        *self.lock() = SignalState::armed();
    }
}

/// 队列容量策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    Unbounded,
    /// 队列满时 `push` 阻塞，`try_push` 返回 [`QueueError::Full`]
    Bounded(usize),
}

impl QueuePolicy {
    /// 容量为 0 表示不限制
    pub fn from_capacity(capacity: usize) -> Self {
        match capacity {
            0 => QueuePolicy::Unbounded,
            n => QueuePolicy::Bounded(n),
        }
    }
}

/// 单生产者单消费者的先进先出帧队列
///
/// 生产者调用 [`FrameQueue::close`] 表示数据结束，消费者仍会取完剩余的帧；
/// 会话级的关闭信号则让所有阻塞方立即返回。
#[derive(Debug, Clone)]
pub struct FrameQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    closed: Signal,
    shutdown: Signal,
}

impl FrameQueue {
    pub fn new(policy: QueuePolicy, shutdown: Signal) -> Self {
        let (tx, rx) = match policy {
            QueuePolicy::Unbounded => unbounded(),
            QueuePolicy::Bounded(n) => bounded(n),
        };
        Self { tx, rx, closed: Signal::new(), shutdown }
    }

    fn check_open(&self) -> Result<(), QueueError> {
        if self.shutdown.is_triggered() {
            Err(QueueError::Shutdown)
        } else if self.closed.is_triggered() {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }

    /// 放入一帧，队列满时阻塞直到有空位或会话关闭
    pub fn push(&self, frame: Frame) -> Result<(), QueueError> {
        self.check_open()?;
        let shutdown = self.shutdown.waiter();
        let closed = self.closed.waiter();
        select! {
            send(self.tx, frame) -> res => res.map_err(|_| QueueError::Closed),
            recv(shutdown) -> _ => Err(QueueError::Shutdown),
            recv(closed) -> _ => Err(QueueError::Closed),
        }
    }

    pub fn try_push(&self, frame: Frame) -> Result<(), QueueError> {
        self.check_open()?;
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Disconnected(_) => QueueError::Closed,
        })
    }

    /// 取出一帧，队列空时阻塞
    ///
    /// 返回 `None` 表示会话已关闭，或队列已结束且没有剩余的帧。
    pub fn pop(&self) -> Option<Frame> {
        if self.shutdown.is_triggered() {
            return None;
        }
        let shutdown = self.shutdown.waiter();
        let closed = self.closed.waiter();
        select! {
            recv(self.rx) -> frame => frame.ok(),
            recv(shutdown) -> _ => None,
            recv(closed) -> _ => self.rx.try_recv().ok(),
        }
    }

    /// 标记数据结束，之后的 `push` 返回 [`QueueError::Closed`]
    pub fn close(&self) {
        self.closed.trigger();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }

    /// 丢弃所有未取出的帧，返回丢弃的数量
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub(crate) fn rearm(&self) {
        self.closed.rearm();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

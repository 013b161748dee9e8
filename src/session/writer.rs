use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};

use super::queue::{FrameQueue, QueuePolicy, Signal};
use crate::error::{FrameError, QueueError};
use crate::frame::Frame;

/// 帧的落盘目标
pub trait FrameSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<(), FrameError>;
}

/// 将每一帧以 PNG 格式写入目录，文件名为帧序号
pub struct ImageDirSink {
    dir: PathBuf,
    prefix: String,
}

impl ImageDirSink {
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self, FrameError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, prefix: prefix.into() })
    }

    pub fn path_of(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{}{:06}.png", self.prefix, index))
    }
}

impl FrameSink for ImageDirSink {
    fn write(&mut self, frame: &Frame) -> Result<(), FrameError> {
        frame.image.save(self.path_of(frame.index))?;
        Ok(())
    }
}

/// 写入失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// 直接丢弃该帧
    Drop,
    /// 最多重试 N 次后丢弃
    Retry(u32),
}

impl WritePolicy {
    pub fn from_retries(retries: u32) -> Self {
        match retries {
            0 => WritePolicy::Drop,
            n => WritePolicy::Retry(n),
        }
    }

    fn attempts(self) -> u32 {
        match self {
            WritePolicy::Drop => 1,
            WritePolicy::Retry(n) => n + 1,
        }
    }
}

/// 写入线程通过状态通道上报的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    Written { index: u64 },
    Failed { index: u64, attempts: u32, error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterSummary {
    pub written: usize,
    pub failed: usize,
}

/// 异步写入缓冲区
///
/// `push` 从不阻塞处理线程，写入由 [`WriteBuffer::spawn_writer`] 启动的专用线程完成。
#[derive(Debug, Clone)]
pub struct WriteBuffer {
    queue: FrameQueue,
    status_tx: Sender<WriteStatus>,
    status_rx: Receiver<WriteStatus>,
    policy: WritePolicy,
}

impl WriteBuffer {
    pub fn new(policy: WritePolicy, shutdown: Signal) -> Self {
        let (status_tx, status_rx) = bounded(num_cpus::get() * 64);
        Self { queue: FrameQueue::new(QueuePolicy::Unbounded, shutdown), status_tx, status_rx, policy }
    }

    pub fn push(&self, frame: Frame) -> Result<(), QueueError> {
        self.queue.try_push(frame)
    }

    /// 丢弃所有未写入的帧
    pub fn clear(&self) -> usize {
        self.queue.clear()
    }

    /// 不再接收新帧，写入线程写完剩余的帧后退出
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// 状态通道的接收端，通道满时新的状态会被丢弃
    pub fn status(&self) -> Receiver<WriteStatus> {
        self.status_rx.clone()
    }

    pub(crate) fn rearm(&self) {
        self.queue.rearm();
    }

    pub fn spawn_writer<S: FrameSink + 'static>(&self, name: &str, mut sink: S) -> std::io::Result<JoinHandle<WriterSummary>> {
        let queue = self.queue.clone();
        let status_tx = self.status_tx.clone();
        let attempts = self.policy.attempts();
        thread::Builder::new().name(format!("writer-{name}")).spawn(move || {
            let mut summary = WriterSummary::default();
            while let Some(frame) = queue.pop() {
                let status = write_with_retry(&mut sink, &frame, attempts);
                match &status {
                    WriteStatus::Written { .. } => summary.written += 1,
                    WriteStatus::Failed { index, error, .. } => {
                        warn!("写入第 {} 帧失败: {}", index, error);
                        summary.failed += 1;
                    }
                }
                if status_tx.try_send(status).is_err() {
                    debug!("状态通道已满，丢弃第 {} 帧的状态", frame.index);
                }
            }
            summary
        })
    }
}

fn write_with_retry<S: FrameSink>(sink: &mut S, frame: &Frame, attempts: u32) -> WriteStatus {
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match sink.write(frame) {
            Ok(()) => return WriteStatus::Written { index: frame.index },
            Err(e) => {
                debug!("写入第 {} 帧失败 ({}/{}): {}", frame.index, attempt, attempts, e);
                last_error = e.to_string();
            }
        }
    }
    WriteStatus::Failed { index: frame.index, attempts, error: last_error }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use image::GrayImage;

    use super::*;

    /// 前 `failures` 次写入失败，之后记录写入的帧序号
    struct FlakySink {
        failures: u32,
        written: Arc<Mutex<Vec<u64>>>,
    }

    impl FrameSink for FlakySink {
        fn write(&mut self, frame: &Frame) -> Result<(), FrameError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::other("disk full").into());
            }
            self.written.lock().unwrap().push(frame.index);
            Ok(())
        }
    }

    fn frame(index: u64) -> Frame {
        Frame::new(index, "", GrayImage::new(2, 2))
    }

    #[test]
    fn test_drop_policy() {
        let buffer = WriteBuffer::new(WritePolicy::Drop, Signal::new());
        let written = Arc::new(Mutex::new(vec![]));
        for i in 0..3 {
            buffer.push(frame(i)).unwrap();
        }
        buffer.close();
        let handle = buffer.spawn_writer("test", FlakySink { failures: 1, written: written.clone() }).unwrap();
        let summary = handle.join().unwrap();

        assert_eq!(summary, WriterSummary { written: 2, failed: 1 });
        assert_eq!(*written.lock().unwrap(), vec![1, 2]);
        let status = buffer.status().try_iter().collect::<Vec<_>>();
        assert!(matches!(&status[0], WriteStatus::Failed { index: 0, attempts: 1, error } if error.contains("disk full")));
        assert_eq!(status[1], WriteStatus::Written { index: 1 });
    }

    #[test]
    fn test_retry_policy() {
        let buffer = WriteBuffer::new(WritePolicy::from_retries(2), Signal::new());
        let written = Arc::new(Mutex::new(vec![]));
        buffer.push(frame(7)).unwrap();
        buffer.close();
        let handle = buffer.spawn_writer("test", FlakySink { failures: 2, written: written.clone() }).unwrap();
        assert_eq!(handle.join().unwrap(), WriterSummary { written: 1, failed: 0 });
        assert_eq!(*written.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_clear() {
        let buffer = WriteBuffer::new(WritePolicy::Drop, Signal::new());
        buffer.push(frame(0)).unwrap();
        buffer.push(frame(1)).unwrap();
        assert_eq!(buffer.pending(), 2);
        assert_eq!(buffer.clear(), 2);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_image_dir_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageDirSink::new(dir.path().join("raw"), "raw_").unwrap();
        sink.write(&frame(3)).unwrap();
        assert!(dir.path().join("raw/raw_000003.png").exists());
    }
}

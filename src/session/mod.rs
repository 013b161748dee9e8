//! 一次运行的共享状态：帧队列、写入缓冲区与特征记录

mod queue;
mod writer;

use log::info;

pub use queue::{FrameQueue, QueuePolicy, Signal};
pub use writer::{FrameSink, ImageDirSink, WriteBuffer, WritePolicy, WriteStatus, WriterSummary};

use crate::config::{QueueOptions, SessionConfig};
use crate::feature::{FeatureStore, FieldSet};

pub struct Session {
    config: SessionConfig,
    shutdown: Signal,
    raw: FrameQueue,
    processed: FrameQueue,
    write_raw: WriteBuffer,
    write_processed: WriteBuffer,
    stores: Vec<FeatureStore>,
    object_count: usize,
}

impl Session {
    pub fn new(config: SessionConfig, options: &QueueOptions) -> Self {
        let shutdown = Signal::new();
        let policy = QueuePolicy::from_capacity(options.queue_capacity);
        let write_policy = WritePolicy::from_retries(options.write_retries);
        Self {
            config,
            raw: FrameQueue::new(policy, shutdown.clone()),
            processed: FrameQueue::new(policy, shutdown.clone()),
            write_raw: WriteBuffer::new(write_policy, shutdown.clone()),
            write_processed: WriteBuffer::new(write_policy, shutdown.clone()),
            shutdown,
            stores: vec![],
            object_count: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    /// 采集端写入、处理循环读取的原始帧队列
    pub fn raw(&self) -> &FrameQueue {
        &self.raw
    }

    /// 处理后的帧，供显示或进度统计使用
    pub fn processed(&self) -> &FrameQueue {
        &self.processed
    }

    pub fn write_raw(&self) -> &WriteBuffer {
        &self.write_raw
    }

    pub fn write_processed(&self) -> &WriteBuffer {
        &self.write_processed
    }

    pub fn shutdown_signal(&self) -> Signal {
        self.shutdown.clone()
    }

    /// 通知所有阻塞在队列上的线程退出，可重复调用
    pub fn shutdown(&self) {
        if !self.shutdown.is_triggered() {
            info!("会话关闭");
        }
        self.shutdown.trigger();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// 新建一个特征记录并设为当前记录
    pub fn new_store(&mut self, flags: FieldSet) -> &mut FeatureStore {
        let index = self.stores.len();
        self.stores.push(FeatureStore::new(flags));
        &mut self.stores[index]
    }

    /// 当前使用的特征记录，没有时创建一个记录全部字段的
    pub fn active_store_mut(&mut self) -> &mut FeatureStore {
        if self.stores.is_empty() {
            return self.new_store(FieldSet::all());
        }
        let index = self.stores.len() - 1;
        &mut self.stores[index]
    }

    pub fn stores(&self) -> &[FeatureStore] {
        &self.stores
    }

    /// 分配一个新的对象编号
    pub fn next_object(&mut self) -> usize {
        let id = self.object_count;
        self.object_count += 1;
        id
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }

    /// 清空队列、写入缓冲区和特征记录，并恢复所有信号
    ///
    /// 调用方需保证此时没有其他线程在使用该会话。
    pub fn reset(&mut self) {
        let dropped = self.raw.clear() + self.processed.clear() + self.write_raw.clear() + self.write_processed.clear();
        if dropped > 0 {
            info!("重置会话，丢弃 {} 帧", dropped);
        }
        self.stores.clear();
        self.object_count = 0;
        self.shutdown.rearm();
        self.raw.rearm();
        self.processed.rearm();
        self.write_raw.rearm();
        self.write_processed.rearm();
    }
}

#[cfg(test)]
mod tests {
    use image::GrayImage;

    use super::*;
    use crate::error::QueueError;
    use crate::feature::Field;
    use crate::frame::Frame;

    #[test]
    fn test_stores() {
        let mut session = Session::new(SessionConfig::default(), &QueueOptions::default());
        assert_eq!(session.active_store_mut().flags(), FieldSet::all());
        session.new_store(Field::Area | Field::Circularity);
        assert_eq!(session.stores().len(), 2);
        assert_eq!(session.active_store_mut().flags(), Field::Area | Field::Circularity);
        assert_eq!(session.next_object(), 0);
        assert_eq!(session.next_object(), 1);
        assert_eq!(session.object_count(), 2);
    }

    #[test]
    fn test_reset() {
        let mut session = Session::new(SessionConfig::default(), &QueueOptions::default());
        let frame = Frame::new(0, "", GrayImage::new(1, 1));
        session.raw().push(frame.clone()).unwrap();
        session.write_raw().push(frame.clone()).unwrap();
        session.raw().close();
        session.shutdown();
        assert_eq!(session.raw().push(frame.clone()), Err(QueueError::Shutdown));
        session.active_store_mut().append_new();
        session.next_object();

        session.reset();
        assert!(!session.is_shutdown());
        assert!(!session.raw().is_closed());
        assert!(session.raw().is_empty());
        assert_eq!(session.write_raw().pending(), 0);
        assert!(session.stores().is_empty());
        assert_eq!(session.object_count(), 0);
        session.raw().push(frame).unwrap();
        assert_eq!(session.raw().len(), 1);
    }
}

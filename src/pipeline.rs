use std::time::Instant;

use image::GrayImage;
use log::{debug, info, warn};

use crate::error::{PipelineError, QueueError};
use crate::process::ProcessChain;
use crate::session::Session;
use crate::tracker::ObjectTracker;

/// 一次运行的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: usize,
    pub objects: usize,
    pub evicted: usize,
    /// 与背景差异低于强度阈值而跳过的帧
    pub skipped: usize,
    /// 处理后队列已满而没有交给下游的帧
    pub dropped: usize,
}

/// 帧与背景逐像素差的最大值
pub fn background_difference(image: &GrayImage, background: &GrayImage) -> f64 {
    image
        .pixels()
        .zip(background.pixels())
        .map(|(a, b)| a[0].abs_diff(b[0]))
        .max()
        .map_or(0., f64::from)
}

/// 处理循环：原始帧 -> 处理流程 -> 跟踪 -> 写入与下游队列
pub struct Pipeline {
    chain: ProcessChain,
    tracker: ObjectTracker,
    background: Option<GrayImage>,
    persist: bool,
}

impl Pipeline {
    pub fn new(chain: ProcessChain, tracker: ObjectTracker) -> Self {
        Self { chain, tracker, background: None, persist: true }
    }

    /// 固定背景图像，不设置时使用第一帧
    pub fn with_background(mut self, background: GrayImage) -> Self {
        self.background = Some(background);
        self
    }

    /// 不把帧放入写入缓冲区，用于不需要保存图像的运行
    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn chain(&self) -> &ProcessChain {
        &self.chain
    }

    pub fn tracker(&self) -> &ObjectTracker {
        &self.tracker
    }

    /// 处理原始队列中的所有帧，直到队列结束或会话关闭
    ///
    /// 结束时关闭处理后队列和两个写入缓冲区，下游线程会在处理完剩余的帧后退出。
    pub fn run(&mut self, session: &mut Session) -> Result<RunSummary, PipelineError> {
        let result = self.run_loop(session);
        session.processed().close();
        session.write_raw().close();
        session.write_processed().close();
        result
    }

    fn run_loop(&mut self, session: &mut Session) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();
        let start = Instant::now();
        let raw = session.raw().clone();

        while let Some(frame) = raw.pop() {
            let background = self.background.get_or_insert_with(|| {
                info!("使用第 {} 帧作为背景", frame.index);
                frame.image.clone()
            });

            if let Some(threshold) = session.config().intensity_threshold {
                let difference = background_difference(&frame.image, background);
                if difference < threshold {
                    debug!("第 {} 帧与背景差异 {} 低于阈值，跳过", frame.index, difference);
                    summary.skipped += 1;
                    if self.persist {
                        if let Err(e) = session.write_raw().push(frame) {
                            warn!("无法写入原始帧: {}", e);
                        }
                    }
                    continue;
                }
            }

            let mut image = frame.image.clone();
            self.chain.run(&mut image, background, session.config())?;
            let processed = frame.with_image(image);

            self.tracker.set_frame(processed.clone());
            self.tracker.set_conditions(session.config());
            summary.objects += self.tracker.find_objects(session)?;
            summary.evicted += self.tracker.clean_objects();
            summary.frames += 1;
            debug!("第 {} 帧处理完成，累计 {} 个对象", frame.index, summary.objects);

            if self.persist {
                if let Err(e) = session.write_processed().push(processed.clone()) {
                    warn!("无法写入处理后的第 {} 帧: {}", frame.index, e);
                }
                if let Err(e) = session.write_raw().push(frame) {
                    warn!("无法写入原始帧: {}", e);
                }
            }

            // 下游只用于显示，队列满时丢弃而不是阻塞处理
            let index = processed.index;
            match session.processed().try_push(processed) {
                Ok(()) => {}
                Err(QueueError::Shutdown) => break,
                Err(e) => {
                    debug!("第 {} 帧未交给下游: {}", index, e);
                    summary.dropped += 1;
                }
            }
        }

        info!(
            "处理 {} 帧，跳过 {} 帧，发现 {} 个对象，用时 {:.2?}",
            summary.frames,
            summary.skipped,
            summary.objects,
            start.elapsed()
        );
        Ok(summary)
    }
}

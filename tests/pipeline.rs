use std::sync::{Arc, Mutex};
use std::thread;

use cellsort::config::{QueueOptions, SessionConfig, TrackerOptions};
use cellsort::error::FrameError;
use cellsort::pipeline::background_difference;
use cellsort::session::{FrameSink, WriteStatus};
use cellsort::{ChainConfig, Field, Frame, ObjectTracker, Pipeline, ProcessChain, RunSummary, Session};
use image::{GrayImage, Luma};
use rstest::*;

const WIDTH: u32 = 300;
const HEIGHT: u32 = 60;

/// 灰色背景上一个向右移动的亮方块，第 0 帧只有背景
fn synthetic_frame(index: u64) -> Frame {
    let mut image = GrayImage::from_pixel(WIDTH, HEIGHT, Luma([50]));
    if index > 0 {
        let x0 = 90 + 10 * index as u32;
        for y in 25..35 {
            for x in x0..x0 + 10 {
                image.put_pixel(x, y, Luma([200]));
            }
        }
    }
    Frame::new(index, format!("frame_{index:03}.png"), image)
}

#[fixture]
fn frames() -> Vec<Frame> {
    (0..9).map(synthetic_frame).collect()
}

#[fixture]
fn session() -> Session {
    Session::new(SessionConfig::default(), &QueueOptions { queue_capacity: 0, write_retries: 0 })
}

fn pipeline() -> Pipeline {
    let chain = ProcessChain::from_config(&ChainConfig::rbc_preset()).unwrap();
    Pipeline::new(chain, ObjectTracker::new(TrackerOptions::default()))
}

struct CollectSink(Arc<Mutex<Vec<u64>>>);

impl FrameSink for CollectSink {
    fn write(&mut self, frame: &Frame) -> Result<(), FrameError> {
        self.0.lock().unwrap().push(frame.index);
        Ok(())
    }
}

#[rstest]
fn moving_object_recorded_once(frames: Vec<Frame>, mut session: Session) {
    session.new_store(Field::Area | Field::Circularity | Field::Label | Field::Frame);
    for frame in frames {
        session.raw().push(frame).unwrap();
    }
    session.raw().close();

    let summary = pipeline().run(&mut session).unwrap();
    assert_eq!(summary, RunSummary { frames: 9, objects: 1, ..Default::default() });

    let store = &session.stores()[0];
    assert_eq!(store.len(), 1);
    assert_eq!(store[0].get::<f64>(Field::Area), Ok(100.));
    assert_eq!(store[0].get::<i32>(Field::Frame), Ok(1));
    assert_eq!(store[0].get::<i32>(Field::Label), Ok(0));
}

#[rstest]
fn frames_keep_order(frames: Vec<Frame>, mut session: Session) {
    let written = Arc::new(Mutex::new(vec![]));
    let writer = session.write_raw().spawn_writer("raw", CollectSink(written.clone())).unwrap();
    let status = session.write_raw().status();

    let producer = thread::spawn({
        let raw = session.raw().clone();
        move || {
            for frame in frames {
                raw.push(frame).unwrap();
            }
            raw.close();
        }
    });

    pipeline().run(&mut session).unwrap();
    producer.join().unwrap();

    let processed = std::iter::from_fn(|| session.processed().pop()).map(|f| f.index).collect::<Vec<_>>();
    assert_eq!(processed, (0..9).collect::<Vec<_>>());

    let summary = writer.join().unwrap();
    assert_eq!(summary.written, 9);
    assert_eq!(*written.lock().unwrap(), (0..9).collect::<Vec<_>>());
    let reported = status.try_iter().filter(|s| matches!(s, WriteStatus::Written { .. })).count();
    assert_eq!(reported, 9);
}

#[rstest]
fn shutdown_stops_run(frames: Vec<Frame>, mut session: Session) {
    for frame in frames {
        session.raw().push(frame).unwrap();
    }
    session.shutdown();
    let summary = pipeline().run(&mut session).unwrap();
    assert_eq!(summary.frames, 0);

    session.reset();
    assert!(session.raw().is_empty());
    session.raw().push(synthetic_frame(0)).unwrap();
    session.raw().close();
    assert_eq!(pipeline().run(&mut session).unwrap().frames, 1);
}

#[rstest]
fn fixed_background(mut session: Session) {
    let background = synthetic_frame(0).image;
    for index in [3, 4] {
        session.raw().push(synthetic_frame(index)).unwrap();
    }
    session.raw().close();

    let summary = pipeline().with_background(background).run(&mut session).unwrap();
    assert_eq!(summary.objects, 1);
}

#[rstest]
fn background_size_mismatch(mut session: Session) {
    session.raw().push(synthetic_frame(1)).unwrap();
    session.raw().close();
    let result = pipeline().with_background(GrayImage::new(10, 10)).run(&mut session);
    assert!(result.is_err());
    assert!(session.processed().is_closed());
}

#[test]
fn full_processed_queue_does_not_block() {
    let queue = QueueOptions::default();
    let mut session = Session::new(SessionConfig::default(), &queue);
    let total = queue.queue_capacity as u64 + 6;

    let producer = thread::spawn({
        let raw = session.raw().clone();
        move || {
            for index in 0..total {
                raw.push(synthetic_frame(index % 9)).unwrap();
            }
            raw.close();
        }
    });

    // 没有任何线程消费处理后队列
    let summary = pipeline().without_persistence().run(&mut session).unwrap();
    producer.join().unwrap();

    assert_eq!(summary.frames, total as usize);
    assert_eq!(summary.dropped, 6);
    assert_eq!(session.processed().len(), queue.queue_capacity);
}

#[rstest]
fn empty_frames_skipped(frames: Vec<Frame>, mut session: Session) {
    session.config_mut().intensity_threshold = Some(100.);
    session.new_store(Field::Area | Field::Frame);
    // 0、1 号帧与背景相同
    session.raw().push(synthetic_frame(0)).unwrap();
    session.raw().push(synthetic_frame(0)).unwrap();
    for frame in frames.into_iter().skip(1) {
        session.raw().push(frame).unwrap();
    }
    session.raw().close();

    let summary = pipeline().run(&mut session).unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.frames, 8);
    assert_eq!(summary.objects, 1);

    let processed = std::iter::from_fn(|| session.processed().pop()).count();
    assert_eq!(processed, 8);
    assert_eq!(session.write_raw().pending(), 10);
    assert_eq!(session.write_processed().pending(), 8);
}

#[test]
fn background_difference_is_peak() {
    let background = GrayImage::from_pixel(4, 4, Luma([50]));
    let mut image = background.clone();
    assert_eq!(background_difference(&image, &background), 0.);
    image.put_pixel(1, 2, Luma([20]));
    image.put_pixel(3, 3, Luma([60]));
    assert_eq!(background_difference(&image, &background), 30.);
}

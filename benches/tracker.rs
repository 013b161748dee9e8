use cellsort::config::{QueueOptions, SessionConfig, TrackerOptions};
use cellsort::detect::find_components;
use cellsort::{ChainConfig, Frame, ObjectTracker, ProcessChain, Session};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{GrayImage, Luma};

// 生成测试帧：背景上均匀分布 n 个方块，随帧号向右平移
fn generate_frame(index: u64, n: u32) -> Frame {
    let (width, height) = (1024, 256);
    let mut image = GrayImage::from_pixel(width, height, Luma([40]));
    let shift = (index as u32 * 3) % 40;
    for i in 0..n {
        let x0 = 20 + (i * 47) % (width - 80) + shift;
        let y0 = 20 + (i * 31) % (height - 40);
        for y in y0..y0 + 8 {
            for x in x0..x0 + 8 {
                image.put_pixel(x, y, Luma([220]));
            }
        }
    }
    Frame::new(index, format!("{index}.png"), image)
}

fn bench_find_components(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_components");
    for n in [16, 64, 256] {
        let frame = black_box(generate_frame(0, n));
        group.bench_function(format!("components_{n}"), |b| b.iter(|| find_components(&frame.image)));
    }
    group.finish();
}

fn bench_tracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracking");
    let config = SessionConfig { inlet: 0, outlet: 1024, ..Default::default() };
    let queue = QueueOptions { queue_capacity: 0, write_retries: 0 };

    for n in [16, 64] {
        // 预先二值化好的帧序列，只测量跟踪本身
        let frames = (0..20)
            .map(|i| generate_frame(i, n))
            .map(|f| {
                let mut image = f.image.clone();
                image.pixels_mut().for_each(|p| p[0] = if p[0] > 100 { 255 } else { 0 });
                f.with_image(image)
            })
            .collect::<Vec<_>>();

        group.bench_function(format!("find_objects_{n}"), |b| {
            b.iter(|| {
                let mut session = Session::new(config.clone(), &queue);
                let mut tracker = ObjectTracker::new(TrackerOptions::default());
                tracker.set_conditions(session.config());
                for frame in &frames {
                    tracker.set_frame(frame.clone());
                    tracker.find_objects(&mut session).unwrap();
                    tracker.clean_objects();
                }
                session.object_count()
            })
        });
    }

    // 整个处理流程，包括背景减除和形态学处理
    let chain = ProcessChain::from_config(&ChainConfig::rbc_preset()).unwrap();
    let background = GrayImage::from_pixel(1024, 256, Luma([40]));
    let frame = generate_frame(1, 64);
    group.bench_function("rbc_chain_64", |b| {
        b.iter(|| {
            let mut image = frame.image.clone();
            chain.run(&mut image, &background, &config).unwrap();
            image
        })
    });
    group.finish();
}

criterion_group!(benches, bench_find_components, bench_tracking);
criterion_main!(benches);

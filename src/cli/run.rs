use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};

use crate::acquire::{scan_directory, spawn_directory_source, suffix_regex};
use crate::cli::{SubCommandExtend, pb_style};
use crate::config::{ChainOptions, Opts, QueueOptions, SessionConfig, TrackerOptions};
use crate::feature::{FeatureStore, Field, FieldSet};
use crate::frame::Frame;
use crate::pipeline::Pipeline;
use crate::process::ProcessChain;
use crate::session::{ImageDirSink, Session};
use crate::tracker::ObjectTracker;

#[derive(Parser, Debug, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub chain: ChainOptions,
    #[command(flatten)]
    pub session: SessionConfig,
    #[command(flatten)]
    pub tracker: TrackerOptions,
    #[command(flatten)]
    pub queue: QueueOptions,
    /// 图片序列所在目录
    pub input: PathBuf,
    /// 保存原始帧和处理后帧的目录，不指定则不保存
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "png,tif,tiff,jpg")]
    pub suffix: String,
    /// 背景图像，不指定则使用第一帧
    #[arg(short, long, value_name = "FILE")]
    pub background: Option<PathBuf>,
    /// 记录的特征字段，多个字段用逗号分隔，默认记录全部
    #[arg(long, value_name = "FIELD", value_delimiter = ',')]
    pub fields: Vec<Field>,
    /// 导出特征记录，.npy 只包含标量字段，.json 包含全部字段
    #[arg(long, value_name = "FILE")]
    pub features: Option<PathBuf>,
}

impl SubCommandExtend for RunCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let config = self.chain.load()?;
        let chain = ProcessChain::from_config(&config)?;
        chain.check()?;
        info!("处理流程 {}: {:?}", config.name, chain);

        let re_suf = suffix_regex(&self.suffix).context("invalid suffix list")?;
        let files = scan_directory(&self.input, &re_suf);
        if files.is_empty() {
            bail!("no image found in {}", self.input.display());
        }

        let mut pipeline = Pipeline::new(chain, ObjectTracker::new(self.tracker.clone()));
        if let Some(path) = &self.background {
            pipeline = pipeline.with_background(Frame::open(0, path)?.image);
        }
        if self.output.is_none() {
            pipeline = pipeline.without_persistence();
        }

        let mut session = Session::new(self.session.clone(), &self.queue);
        let flags = match self.fields.is_empty() {
            true => FieldSet::all(),
            false => self.fields.iter().fold(FieldSet::empty(), |acc, field| acc | *field),
        };
        session.new_store(flags);

        let writers = match &self.output {
            Some(dir) => vec![
                session.write_raw().spawn_writer("raw", ImageDirSink::new(dir.join("raw"), "raw_")?)?,
                session.write_processed().spawn_writer("processed", ImageDirSink::new(dir.join("processed"), "processed_")?)?,
            ],
            None => vec![],
        };

        let pb = ProgressBar::new(files.len() as u64).with_style(pb_style());
        let progress = thread::spawn({
            let pb = pb.clone();
            let processed = session.processed().clone();
            move || {
                while let Some(frame) = processed.pop() {
                    pb.set_message(frame.filename);
                    pb.inc(1);
                }
            }
        });
        let source = spawn_directory_source(files, session.raw().clone())?;

        let result = pipeline.run(&mut session);
        if result.is_err() {
            session.shutdown();
        }

        let acquired = join_logged(source, "acquire").unwrap_or_default();
        join_logged(progress, "progress");
        for writer in writers {
            if let Ok(summary) = writer.join() {
                if summary.failed > 0 {
                    warn!("{} 帧写入失败", summary.failed);
                }
            }
        }

        let summary = result?;
        pb.set_position((summary.frames + summary.skipped) as u64);
        pb.finish_with_message("处理完成");
        info!("读取 {} 帧，处理 {} 帧，发现 {} 个对象", acquired, summary.frames, summary.objects);
        if summary.dropped > 0 {
            warn!("{} 帧未能及时显示", summary.dropped);
        }

        if let Some(path) = &self.features {
            let store = &session.stores()[0];
            export_features(store, path)?;
            info!("特征已导出到 {}", path.display());
        }
        println!("{}", summary.objects);
        Ok(())
    }
}

/// 等待线程结束，线程 panic 时记录警告并返回 `None`
fn join_logged<T>(handle: JoinHandle<T>, name: &str) -> Option<T> {
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{} 线程异常退出", name);
            None
        }
    }
}

fn export_features(store: &FeatureStore, path: &Path) -> Result<()> {
    match path.extension().and_then(|s| s.to_str()) {
        Some("npy") => {
            let fields = store.flags().fields().filter(|f| f.is_scalar()).collect::<Vec<_>>();
            store.save_npy(path, &fields)
        }
        Some("json") => {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, store)?;
            Ok(())
        }
        _ => bail!("unsupported feature file: {}", path.display()),
    }
}

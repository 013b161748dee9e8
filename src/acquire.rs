//! 从目录读取图片序列作为帧来源

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::error::QueueError;
use crate::frame::Frame;
use crate::session::FrameQueue;

/// 由逗号分隔的后缀列表构造匹配正则，忽略大小写
pub fn suffix_regex(suffix: &str) -> Result<Regex, regex::Error> {
    let pattern = suffix.split(',').map(|s| regex::escape(s.trim())).collect::<Vec<_>>().join("|");
    Regex::new(&format!("(?i)^({pattern})$"))
}

/// 递归列出目录中后缀匹配的文件，按路径排序
pub fn scan_directory<P: AsRef<Path>>(path: P, suffix: &Regex) -> Vec<PathBuf> {
    info!("开始扫描目录: {}", path.as_ref().display());
    let mut entries = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| suffix.is_match(&ext.to_string_lossy()))
        })
        .collect::<Vec<_>>();
    entries.sort();
    info!("扫描完成，共 {} 张图片", entries.len());
    entries
}

/// 启动采集线程，依次读取文件并放入队列，结束时关闭队列
///
/// 无法解码的文件会被跳过，帧序号仍然连续。返回成功放入队列的帧数。
pub fn spawn_directory_source(files: Vec<PathBuf>, queue: FrameQueue) -> std::io::Result<JoinHandle<u64>> {
    thread::Builder::new().name("acquire".into()).spawn(move || {
        let mut index = 0;
        for path in files {
            let frame = match Frame::open(index, &path) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("读取 {} 失败: {}", path.display(), e);
                    continue;
                }
            };
            match queue.push(frame) {
                Ok(()) => index += 1,
                Err(QueueError::Shutdown) => {
                    info!("会话已关闭，停止采集");
                    break;
                }
                Err(e) => {
                    error!("无法放入帧: {}", e);
                    break;
                }
            }
        }
        queue.close();
        index
    })
}

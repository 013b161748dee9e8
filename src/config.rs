use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::*;
use crate::error::ChainError;
use crate::process::ChainConfig;

/// 一次运行的全局配置，处理步骤和跟踪条件共享
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// 通道入口所在的横坐标，质心在入口之前的对象不会被记录
    #[arg(long, value_name = "X", default_value_t = 80)]
    pub inlet: i32,
    /// 通道出口所在的横坐标，质心在出口之后的对象不会被记录
    #[arg(long, value_name = "X", default_value_t = 210)]
    pub outlet: i32,
    /// 对象最小面积（像素）
    #[arg(long, value_name = "PIXELS")]
    pub min_area: Option<f64>,
    /// 对象最大面积（像素）
    #[arg(long, value_name = "PIXELS")]
    pub max_area: Option<f64>,
    /// 对象最小圆度
    #[arg(long, value_name = "RATIO")]
    pub min_circularity: Option<f64>,
    /// 对象最大圆度
    #[arg(long, value_name = "RATIO")]
    pub max_circularity: Option<f64>,
    /// 与背景的最大灰度差低于该值的帧视为空帧，不做处理和跟踪
    #[arg(long, value_name = "LEVEL")]
    pub intensity_threshold: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inlet: 80,
            outlet: 210,
            min_area: None,
            max_area: None,
            min_circularity: None,
            max_circularity: None,
            intensity_threshold: None,
        }
    }
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TrackerOptions {
    /// 相邻两帧中被视为同一对象的最大质心距离
    #[arg(long, value_name = "PIXELS", default_value_t = 20.)]
    pub distance_threshold: f64,
    /// 连续多少帧未匹配后丢弃跟踪目标
    #[arg(long, value_name = "FRAMES", default_value_t = 25)]
    pub count_threshold: u32,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self { distance_threshold: 20., count_threshold: 25 }
    }
}

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct QueueOptions {
    /// 原始帧队列容量，0 表示不限制
    #[arg(long, value_name = "N", default_value_t = 64)]
    pub queue_capacity: usize,
    /// 写入失败时的重试次数，0 表示直接丢弃
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub write_retries: u32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self { queue_capacity: 64, write_retries: 0 }
    }
}

/// 内置的处理流程
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// 红细胞检测
    Rbc,
}

impl Preset {
    pub fn config(self) -> ChainConfig {
        match self {
            Preset::Rbc => ChainConfig::rbc_preset(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ChainOptions {
    /// 处理流程配置文件，按后缀识别格式：.json / .bin / .txt
    #[arg(short, long, value_name = "FILE", conflicts_with = "preset")]
    pub chain: Option<PathBuf>,
    /// 未指定配置文件时使用的预设流程
    #[arg(long, value_enum, default_value_t = Preset::Rbc)]
    pub preset: Preset,
}

impl ChainOptions {
    pub fn load(&self) -> Result<ChainConfig, ChainError> {
        match &self.chain {
            Some(path) => ChainConfig::load(path),
            None => Ok(self.preset.config()),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cellsort", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 处理一个目录中的图片序列，跟踪并记录对象特征
    Run(RunCommand),
    /// 列出所有可用的处理步骤
    Processes(ProcessesCommand),
    /// 列出处理流程中每个参数的类型和范围
    Options(OptionsCommand),
    /// 在不同格式之间转换处理流程配置
    Convert(ConvertCommand),
}

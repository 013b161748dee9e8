use thiserror::Error;

use crate::feature::{Field, ValueKind};

/// FeatureStore / Record 的误用，属于编程错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("field {0:?} is not enabled on this record")]
    FieldNotEnabled(Field),

    #[error("field {field:?} holds {expected:?}, got {found:?}")]
    TypeMismatch { field: Field, expected: ValueKind, found: ValueKind },

    #[error("data flags can not be changed while the store holds {0} records")]
    FlagsLocked(usize),
}

/// 参数配置错误，应当在运行开始前暴露
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("parameter {name}: {missing} not set")]
    NotInitialized { name: String, missing: &'static str },

    #[error("parameter {name}: {value} is outside [{low}, {high}]")]
    OutOfRange { name: String, value: String, low: String, high: String },

    #[error("parameter {name}: can not parse {value:?}")]
    ParseError { name: String, value: String },

    #[error("parameter {name} is a {actual} parameter, not {requested}")]
    TypeMismatch { name: String, actual: &'static str, requested: &'static str },

    #[error("parameter {0} is read only")]
    ReadOnly(String),

    #[error("no parameter named {0}")]
    Missing(String),
}

/// 处理流程的构建与持久化错误
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("unknown process type: {0}")]
    UnknownProcessType(String),

    #[error("process {process} has no parameter {name}")]
    UnknownParameter { process: String, name: String },

    #[error("step index {index} out of bounds (chain has {len} steps)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("unsupported chain file extension: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// 单个处理步骤在运行时的错误
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{step}: image is {image:?} but background is {background:?}")]
    DimensionMismatch { step: &'static str, image: (u32, u32), background: (u32, u32) },

    #[error(transparent)]
    Parameter(#[from] ParameterError),
}

/// 帧队列错误
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,

    #[error("queue is closed")]
    Closed,

    #[error("session is shut down")]
    Shutdown,
}

/// 帧读写时的 IO 错误，写入端只会通过状态通道上报，不会传播到处理线程
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("IO failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding failure: {0}")]
    Image(#[from] image::ImageError),
}

/// 跟踪器错误
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("no frame set before find_objects")]
    NoFrame,

    #[error("frame index {0} exceeds the recordable range")]
    FrameIndex(u64),

    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// 处理循环错误，任意一个都会让本次运行中止
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

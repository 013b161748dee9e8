use std::path::Path;

use image::GrayImage;

use crate::error::FrameError;

/// 采集得到的一帧图像
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 帧序号，从 0 开始
    pub index: u64,
    /// 来源文件名
    pub filename: String,
    pub image: GrayImage,
}

impl Frame {
    pub fn new(index: u64, filename: impl Into<String>, image: GrayImage) -> Self {
        Self { index, filename: filename.into(), image }
    }

    /// 读取图片文件并转换为灰度
    pub fn open<P: AsRef<Path>>(index: u64, path: P) -> Result<Self, FrameError> {
        let path = path.as_ref();
        let image = image::open(path)?.into_luma8();
        Ok(Self::new(index, path.to_string_lossy(), image))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// 复制元信息，替换图像内容
    pub fn with_image(&self, image: GrayImage) -> Self {
        Self { index: self.index, filename: self.filename.clone(), image }
    }
}

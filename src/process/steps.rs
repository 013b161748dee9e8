//! 内置处理步骤

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::region_labelling::{Connectivity, connected_components};
use imageproc::{edges, morphology};

use super::ProcessStep;
use crate::config::SessionConfig;
use crate::detect::{RegionProp, find_components, paint};
use crate::error::ProcessError;
use crate::param_enum;
use crate::parameter::{ParamEnum, Parameters};

param_enum! {
    pub enum MorphType {
        Erode => "Erode",
        Dilate => "Dilate",
        Open => "Open",
        Close => "Close",
    }
}

param_enum! {
    /// 结构元素形状，对应 L∞ 与 L1 范数
    pub enum StructuringElement {
        Square => "Square",
        Diamond => "Diamond",
    }
}

fn add_int(params: &mut Parameters, name: &str, low: i32, high: i32, default: i32) {
    params.add_int(name).set_range(low, high).and_then(|p| p.set_value(default)).expect("invalid default value");
}

fn add_double(params: &mut Parameters, name: &str, low: f64, high: f64, default: f64) {
    params.add_double(name).set_range(low, high).and_then(|p| p.set_value(default)).expect("invalid default value");
}

fn add_enum<E: ParamEnum>(params: &mut Parameters, name: &str, default: E) {
    params.add_enum(name).set_options::<E>().and_then(|p| p.set_variant(default)).expect("invalid default value");
}

macro_rules! step {
    ($name: literal) => {
        fn type_name(&self) -> &'static str {
            $name
        }

        fn parameters(&self) -> &Parameters {
            &self.params
        }

        fn parameters_mut(&mut self) -> &mut Parameters {
            &mut self.params
        }
    };
}

/// 形态学运算
pub struct Morphology {
    params: Parameters,
}

impl Default for Morphology {
    fn default() -> Self {
        let mut params = Parameters::new();
        add_enum(&mut params, "Morphology_type", MorphType::Erode);
        add_enum(&mut params, "Structuring_element", StructuringElement::Square);
        add_int(&mut params, "Radius", 0, 20, 1);
        Self { params }
    }
}

impl ProcessStep for Morphology {
    step!("Morphology");

    fn process(&self, image: &mut GrayImage, _: &GrayImage, _: &SessionConfig) -> Result<(), ProcessError> {
        let norm = match self.params.variant::<StructuringElement>("Structuring_element")? {
            StructuringElement::Square => Norm::LInf,
            StructuringElement::Diamond => Norm::L1,
        };
        let k = self.params.int("Radius")? as u8;
        let f = match self.params.variant::<MorphType>("Morphology_type")? {
            MorphType::Erode => morphology::erode,
            MorphType::Dilate => morphology::dilate,
            MorphType::Open => morphology::open,
            MorphType::Close => morphology::close,
        };
        *image = f(image, norm, k);
        Ok(())
    }
}

/// 阈值二值化：大于阈值的像素设为最大值，其余为 0
pub struct Binarize {
    params: Parameters,
}

impl Default for Binarize {
    fn default() -> Self {
        let mut params = Parameters::new();
        add_double(&mut params, "Edge_threshold", 0., 255., 20.);
        add_double(&mut params, "Maximum_binary_value", 0., 255., 255.);
        Self { params }
    }
}

impl ProcessStep for Binarize {
    step!("Binarize");

    fn process(&self, image: &mut GrayImage, _: &GrayImage, _: &SessionConfig) -> Result<(), ProcessError> {
        let threshold = self.params.double("Edge_threshold")?;
        let max = self.params.double("Maximum_binary_value")?.round() as u8;
        for p in image.pixels_mut() {
            p[0] = if p[0] as f64 > threshold { max } else { 0 };
        }
        Ok(())
    }
}

/// 线性拉伸到 0..=255，强度为拉伸结果所占的百分比
pub struct Normalize {
    params: Parameters,
}

impl Default for Normalize {
    fn default() -> Self {
        let mut params = Parameters::new();
        add_int(&mut params, "Normalize_strength", 0, 100, 100);
        Self { params }
    }
}

impl ProcessStep for Normalize {
    step!("Normalize");

    fn process(&self, image: &mut GrayImage, _: &GrayImage, _: &SessionConfig) -> Result<(), ProcessError> {
        let strength = self.params.int("Normalize_strength")? as f64 / 100.;
        let (min, max) = image.pixels().fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        if max <= min {
            return Ok(());
        }
        let scale = 255. / (max - min) as f64;
        for p in image.pixels_mut() {
            let v = p[0] as f64;
            let stretched = (v - min as f64) * scale;
            p[0] = (v + (stretched - v) * strength).round().clamp(0., 255.) as u8;
        }
        Ok(())
    }
}

/// 与背景做差取绝对值，低于阈值的差异视为噪声
pub struct SubtractBackground {
    params: Parameters,
}

impl Default for SubtractBackground {
    fn default() -> Self {
        let mut params = Parameters::new();
        add_double(&mut params, "Edge_threshold", 0., 255., 10.);
        Self { params }
    }
}

impl ProcessStep for SubtractBackground {
    step!("SubtractBackground");

    fn process(&self, image: &mut GrayImage, background: &GrayImage, _: &SessionConfig) -> Result<(), ProcessError> {
        if image.dimensions() != background.dimensions() {
            return Err(ProcessError::DimensionMismatch {
                step: self.type_name(),
                image: image.dimensions(),
                background: background.dimensions(),
            });
        }
        let threshold = self.params.double("Edge_threshold")?;
        for (p, b) in image.pixels_mut().zip(background.pixels()) {
            let diff = p[0].abs_diff(b[0]);
            p[0] = if diff as f64 >= threshold { diff } else { 0 };
        }
        Ok(())
    }
}

pub struct Canny {
    params: Parameters,
}

impl Default for Canny {
    fn default() -> Self {
        let mut params = Parameters::new();
        add_double(&mut params, "Low_threshold", 0., 1140., 50.);
        add_double(&mut params, "High_threshold", 0., 1140., 100.);
        Self { params }
    }
}

impl ProcessStep for Canny {
    step!("Canny");

    fn process(&self, image: &mut GrayImage, _: &GrayImage, _: &SessionConfig) -> Result<(), ProcessError> {
        let low = self.params.double("Low_threshold")? as f32;
        let high = self.params.double("High_threshold")? as f32;
        *image = edges::canny(image, low.min(high), low.max(high));
        Ok(())
    }
}

/// 清除与图像边缘相连的对象
pub struct ClearBorder {
    params: Parameters,
}

impl Default for ClearBorder {
    fn default() -> Self {
        let mut params = Parameters::new();
        add_int(&mut params, "Border_width", 0, 100, 1);
        Self { params }
    }
}

impl ProcessStep for ClearBorder {
    step!("ClearBorder");

    fn process(&self, image: &mut GrayImage, _: &GrayImage, _: &SessionConfig) -> Result<(), ProcessError> {
        let width = self.params.int("Border_width")? as u32;
        let dimensions = image.dimensions();
        for component in find_components(image) {
            if component.touches_border(dimensions, width) {
                paint(image, &component, 0);
            }
        }
        Ok(())
    }
}

/// 填充对象内部的空洞
#[derive(Default)]
pub struct FloodFill {
    params: Parameters,
}

impl ProcessStep for FloodFill {
    step!("FloodFill");

    fn process(&self, image: &mut GrayImage, _: &GrayImage, _: &SessionConfig) -> Result<(), ProcessError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Ok(());
        }

        // 背景按 4 连通标记，不与边缘相连的背景区域就是孔洞
        let inverted = GrayImage::from_fn(w, h, |x, y| Luma([if image.get_pixel(x, y)[0] == 0 { u8::MAX } else { 0 }]));
        let labels = connected_components(&inverted, Connectivity::Four, Luma([0u8]));

        let count = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
        let mut outside = vec![false; count + 1];
        for (x, y, p) in labels.enumerate_pixels() {
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                outside[p[0] as usize] = true;
            }
        }

        for (p, l) in image.pixels_mut().zip(labels.pixels()) {
            let label = l[0] as usize;
            if label != 0 && !outside[label] {
                *p = Luma([u8::MAX]);
            }
        }
        Ok(())
    }
}

/// 移除区域属性不在 [Lower_Limit, Upper_Limit] 内的对象
pub struct PropertyFilter {
    params: Parameters,
}

impl Default for PropertyFilter {
    fn default() -> Self {
        let mut params = Parameters::new();
        add_enum(&mut params, "Regionprop_type", RegionProp::Area);
        add_double(&mut params, "Lower_Limit", 0., 1e9, 0.);
        add_double(&mut params, "Upper_Limit", 0., 1e9, 1e9);
        Self { params }
    }
}

impl ProcessStep for PropertyFilter {
    step!("PropertyFilter");

    fn process(&self, image: &mut GrayImage, _: &GrayImage, _: &SessionConfig) -> Result<(), ProcessError> {
        let prop = self.params.variant::<RegionProp>("Regionprop_type")?;
        let lower = self.params.double("Lower_Limit")?;
        let upper = self.params.double("Upper_Limit")?;
        for component in find_components(image) {
            let value = component.property(prop);
            if !(lower <= value && value <= upper) {
                paint(image, &component, 0);
            }
        }
        Ok(())
    }
}

/// 清除通道入口与出口之外的列
#[derive(Default)]
pub struct ChannelMask {
    params: Parameters,
}

impl ProcessStep for ChannelMask {
    step!("ChannelMask");

    fn process(&self, image: &mut GrayImage, _: &GrayImage, config: &SessionConfig) -> Result<(), ProcessError> {
        let (inlet, outlet) = (config.inlet as i64, config.outlet as i64);
        for (x, _, p) in image.enumerate_pixels_mut() {
            let x = x as i64;
            if x < inlet || x > outlet {
                *p = Luma([0]);
            }
        }
        Ok(())
    }
}

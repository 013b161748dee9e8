//! 连通域提取与区域属性计算

use std::f64::consts::PI;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::geometry::{contour_area, convex_hull};
use imageproc::point::Point;
use imageproc::region_labelling::{Connectivity, connected_components};
use rayon::prelude::*;

use crate::feature::Rect;
use crate::param_enum;

type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

param_enum! {
    /// 可用于过滤的区域属性
    pub enum RegionProp {
        Area => "Area",
        Perimeter => "Perimeter",
        Circularity => "Circularity",
        Eccentricity => "Eccentricity",
        MajorAxis => "Major_axis",
        MinorAxis => "Minor_axis",
        ConvexArea => "Convex_area",
        Solidity => "Solidity",
    }
}

/// 二值图像中的一个连通域
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// 连通域标签，从 1 开始
    pub label: u32,
    /// 属于该连通域的所有像素坐标 (x, y)
    pub pixels: Vec<(u32, u32)>,
    pub centroid: (f64, f64),
    pub bounding_box: Rect,
    pub area: f64,
    /// 边界像素数量
    pub perimeter: f64,
    pub circularity: f64,
    pub eccentricity: f64,
    pub major_axis: f64,
    pub minor_axis: f64,
    pub convex_area: f64,
    pub solidity: f64,
}

impl Component {
    fn measure(label: u32, pixels: Vec<(u32, u32)>, labels: &LabelImage) -> Self {
        let n = pixels.len() as f64;
        let (mut sx, mut sy) = (0., 0.);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0, 0);
        for &(x, y) in &pixels {
            sx += x as f64;
            sy += y as f64;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        let (cx, cy) = (sx / n, sy / n);

        // 二阶中心矩，1/12 为单个像素自身的贡献
        let (mut mu20, mut mu02, mut mu11) = (1. / 12., 1. / 12., 0.);
        for &(x, y) in &pixels {
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            mu20 += dx * dx / n;
            mu02 += dy * dy / n;
            mu11 += dx * dy / n;
        }
        let common = ((mu20 - mu02).powi(2) + 4. * mu11 * mu11).sqrt();
        let major_axis = 2. * (2. * (mu20 + mu02 + common)).sqrt();
        let minor_axis = 2. * (2. * (mu20 + mu02 - common).max(0.)).sqrt();
        let eccentricity = if major_axis > 0. {
            (1. - (minor_axis / major_axis).powi(2)).max(0.).sqrt()
        } else {
            0.
        };

        let boundary = pixels
            .iter()
            .copied()
            .filter(|&(x, y)| is_boundary(labels, label, x, y))
            .collect::<Vec<_>>();
        let perimeter = boundary.len() as f64;
        let circularity = if perimeter > 0. { 4. * PI * n / (perimeter * perimeter) } else { 0. };

        // 凸包以像素的四个角点计算，保证单行像素也有面积
        let corners = boundary
            .iter()
            .flat_map(|&(x, y)| {
                let (x, y) = (x as i32, y as i32);
                [Point::new(x, y), Point::new(x + 1, y), Point::new(x, y + 1), Point::new(x + 1, y + 1)]
            })
            .collect();
        let convex_area = convex_area(corners).max(n);
        let solidity = n / convex_area;

        Self {
            label,
            pixels,
            centroid: (cx, cy),
            bounding_box: Rect::new(
                min_x as i32,
                min_y as i32,
                (max_x - min_x + 1) as i32,
                (max_y - min_y + 1) as i32,
            ),
            area: n,
            perimeter,
            circularity,
            eccentricity,
            major_axis,
            minor_axis,
            convex_area,
            solidity,
        }
    }

    pub fn property(&self, prop: RegionProp) -> f64 {
        match prop {
            RegionProp::Area => self.area,
            RegionProp::Perimeter => self.perimeter,
            RegionProp::Circularity => self.circularity,
            RegionProp::Eccentricity => self.eccentricity,
            RegionProp::MajorAxis => self.major_axis,
            RegionProp::MinorAxis => self.minor_axis,
            RegionProp::ConvexArea => self.convex_area,
            RegionProp::Solidity => self.solidity,
        }
    }

    /// 取整后的质心
    pub fn centroid_px(&self) -> (i32, i32) {
        (self.centroid.0.round() as i32, self.centroid.1.round() as i32)
    }

    /// 连通域是否有像素落在距离图像边缘 `width` 以内
    pub fn touches_border(&self, dimensions: (u32, u32), width: u32) -> bool {
        let (w, h) = dimensions;
        let r = &self.bounding_box;
        let (x0, y0) = (r.x as u32, r.y as u32);
        let (x1, y1) = (x0 + r.width as u32, y0 + r.height as u32);
        width > 0 && (x0 < width || y0 < width || x1 + width > w || y1 + width > h)
    }
}

fn is_boundary(labels: &LabelImage, label: u32, x: u32, y: u32) -> bool {
    let (w, h) = labels.dimensions();
    if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
        return true;
    }
    [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
        .into_iter()
        .any(|(nx, ny)| labels.get_pixel(nx, ny)[0] != label)
}

/// 点集凸包围成的面积
fn convex_area(mut points: Vec<Point<i32>>) -> f64 {
    points.sort_unstable_by_key(|p| (p.x, p.y));
    points.dedup();
    if points.len() < 3 {
        return 0.;
    }
    contour_area(&convex_hull(points.as_slice())).abs()
}

/// 提取二值图像（非零即前景）中的所有 8 连通域，按标签排序
pub fn find_components(image: &GrayImage) -> Vec<Component> {
    let labels = connected_components(image, Connectivity::Eight, Luma([0u8]));

    let mut groups: Vec<Vec<(u32, u32)>> = vec![];
    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel[0];
        if label == 0 {
            continue;
        }
        let index = label as usize - 1;
        if index >= groups.len() {
            groups.resize_with(index + 1, Vec::new);
        }
        groups[index].push((x, y));
    }

    groups
        .into_par_iter()
        .enumerate()
        .filter(|(_, pixels)| !pixels.is_empty())
        .map(|(index, pixels)| Component::measure(index as u32 + 1, pixels, &labels))
        .collect()
}

/// 将一组连通域的像素写入图像
pub fn paint(image: &mut GrayImage, component: &Component, value: u8) {
    for &(x, y) in &component.pixels {
        image.put_pixel(x, y, Luma([value]));
    }
}

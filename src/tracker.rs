//! 跨帧的对象检测与跟踪
//!
//! 每一帧中的连通域按质心与已有的跟踪目标做贪心最近邻匹配：距离不超过阈值即视为同一对象，
//! 否则创建新的跟踪目标并分配编号。目标在第一次通过全部条件的那一帧写入会话的当前特征记录，
//! 之后不再重复记录，例如对象越过入口之后才会被记录。

use log::{debug, trace};

use crate::config::{SessionConfig, TrackerOptions};
use crate::detect::{Component, find_components};
use crate::error::TrackerError;
use crate::feature::{Field, FieldSet, Record};
use crate::frame::Frame;
use crate::session::Session;

/// 候选记录的过滤条件
pub type Condition = Box<dyn Fn(&Record) -> bool + Send>;

/// 一个被跟踪的对象
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: usize,
    pub centroid: (f64, f64),
    /// 连续未匹配的帧数
    pub stale: u32,
    /// 是否已经写入特征记录
    pub committed: bool,
}

impl Track {
    fn distance(&self, point: (f64, f64)) -> f64 {
        (self.centroid.0 - point.0).hypot(self.centroid.1 - point.1)
    }
}

pub struct ObjectTracker {
    options: TrackerOptions,
    tracks: Vec<Track>,
    builtin: Vec<Condition>,
    extra: Vec<Condition>,
    frame: Option<Frame>,
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new(TrackerOptions::default())
    }
}

impl ObjectTracker {
    pub fn new(options: TrackerOptions) -> Self {
        Self { options, tracks: vec![], builtin: vec![], extra: vec![], frame: None }
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// 设置下一次 `find_objects` 使用的二值图像
    pub fn set_frame(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }

    /// 根据会话配置重建内置条件：入口出口窗口、面积与圆度范围
    pub fn set_conditions(&mut self, config: &SessionConfig) {
        let (inlet, outlet) = (config.inlet, config.outlet);
        self.builtin.clear();
        self.builtin.push(Box::new(move |r: &Record| {
            r.get::<(i32, i32)>(Field::Centroid).is_ok_and(|(x, _)| inlet <= x && x <= outlet)
        }));
        for (field, low, high) in [
            (Field::Area, config.min_area, config.max_area),
            (Field::Circularity, config.min_circularity, config.max_circularity),
        ] {
            if low.is_none() && high.is_none() {
                continue;
            }
            let (low, high) = (low.unwrap_or(f64::NEG_INFINITY), high.unwrap_or(f64::INFINITY));
            self.builtin.push(Box::new(move |r: &Record| r.get::<f64>(field).is_ok_and(|v| low <= v && v <= high)));
        }
    }

    /// 追加一个自定义条件，不会被 `set_conditions` 清除
    pub fn add_condition<F>(&mut self, condition: F)
    where
        F: Fn(&Record) -> bool + Send + 'static,
    {
        self.extra.push(Box::new(condition));
    }

    fn accepts(&self, record: &Record) -> bool {
        self.builtin.iter().chain(&self.extra).all(|c| c(record))
    }

    /// 处理当前帧，返回新写入特征记录的对象数量
    pub fn find_objects(&mut self, session: &mut Session) -> Result<usize, TrackerError> {
        let frame = self.frame.as_ref().ok_or(TrackerError::NoFrame)?;
        let frame_index = i32::try_from(frame.index).map_err(|_| TrackerError::FrameIndex(frame.index))?;
        let components = find_components(&frame.image);
        let config = session.config().clone();

        for track in &mut self.tracks {
            track.stale += 1;
        }

        // 只与本帧开始前已存在、且尚未被匹配的目标比较
        let existing = self.tracks.len();
        let mut claimed = vec![false; existing];
        let mut committed = 0;

        for component in &components {
            let nearest = self.tracks[..existing]
                .iter()
                .enumerate()
                .filter(|(i, _)| !claimed[*i])
                .map(|(i, t)| (i, t.distance(component.centroid)))
                .min_by(|a, b| a.1.total_cmp(&b.1));

            let index = match nearest {
                Some((i, distance)) if distance <= self.options.distance_threshold => {
                    trace!("对象 {} 移动 {:.1}", self.tracks[i].id, distance);
                    claimed[i] = true;
                    let track = &mut self.tracks[i];
                    track.centroid = component.centroid;
                    track.stale = 0;
                    if track.committed {
                        continue;
                    }
                    i
                }
                _ => {
                    let id = session.next_object();
                    self.tracks.push(Track { id, centroid: component.centroid, stale: 0, committed: false });
                    self.tracks.len() - 1
                }
            };

            let id = self.tracks[index].id;
            let mut candidate = measure(component, frame_index, &config)?;
            candidate.set(Field::Label, id as i32)?;
            if !self.accepts(&candidate) {
                trace!("对象 {} 未通过过滤条件", id);
                continue;
            }
            self.tracks[index].committed = true;

            let record = session.active_store_mut().append_new();
            for (field, value) in candidate.iter() {
                if record.is_enabled(field) {
                    record.set_value(field, value.clone())?;
                }
            }
            debug!("第 {} 帧记录对象 {}，质心 {:?}", frame_index, id, component.centroid_px());
            committed += 1;
        }

        Ok(committed)
    }

    /// 移除连续未匹配超过 `count_threshold` 帧的目标，返回移除数量
    pub fn clean_objects(&mut self) -> usize {
        let before = self.tracks.len();
        let threshold = self.options.count_threshold;
        self.tracks.retain(|t| t.stale <= threshold);
        let removed = before - self.tracks.len();
        if removed > 0 {
            debug!("移除 {} 个跟踪目标，剩余 {}", removed, self.tracks.len());
        }
        removed
    }
}

/// 把连通域的测量值写入一条包含全部字段的候选记录
fn measure(c: &Component, frame: i32, config: &SessionConfig) -> Result<Record, TrackerError> {
    let mut record = Record::new(FieldSet::all());
    record.set(Field::Area, c.area)?;
    record.set(Field::BoundingBox, c.bounding_box)?;
    record.set(Field::Centroid, c.centroid_px())?;
    record.set(Field::Circularity, c.circularity)?;
    record.set(Field::ConvexArea, c.convex_area)?;
    record.set(Field::Eccentricity, c.eccentricity)?;
    record.set(Field::Frame, frame)?;
    record.set(Field::Inlet, config.inlet)?;
    record.set(Field::Outlet, config.outlet)?;
    record.set(Field::MajorAxis, c.major_axis)?;
    record.set(Field::MinorAxis, c.minor_axis)?;
    record.set(Field::Solidity, c.solidity)?;
    record.set(Field::Perimeter, c.perimeter)?;
    record.set(Field::PixelIdxList, c.pixels.clone())?;
    Ok(record)
}

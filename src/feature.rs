use std::collections::BTreeMap;
use std::ops::{BitOr, Index};
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use bitflags::bitflags;
use ndarray::Array2;
use ndarray_npy::write_npy;
use serde::Serialize;

use crate::error::FeatureError;

bitflags! {
    /// 记录中启用的特征字段
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldSet: u32 {
        const AREA = 1 << 0;
        const BOUNDING_BOX = 1 << 1;
        const CENTROID = 1 << 2;
        const CIRCULARITY = 1 << 3;
        const CONVEX_AREA = 1 << 4;
        const ECCENTRICITY = 1 << 5;
        const FRAME = 1 << 6;
        const GRADIENT_SCORE = 1 << 7;
        const INLET = 1 << 8;
        const OUTLET = 1 << 9;
        const LABEL = 1 << 10;
        const MAJOR_AXIS = 1 << 11;
        const MINOR_AXIS = 1 << 12;
        const SOLIDITY = 1 << 13;
        const SYMMETRY = 1 << 14;
        const PERIMETER = 1 << 15;
        const PIXEL_IDX_LIST = 1 << 16;
        const OUTPUT_VALUE = 1 << 17;
    }
}

impl FieldSet {
    /// 按声明顺序遍历集合中的字段
    pub fn fields(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |field| self.contains(field.flag()))
    }
}

/// 单个特征字段，每个字段对应固定的值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Field {
    Area,
    BoundingBox,
    Centroid,
    Circularity,
    ConvexArea,
    Eccentricity,
    Frame,
    GradientScore,
    Inlet,
    Outlet,
    Label,
    MajorAxis,
    MinorAxis,
    Solidity,
    Symmetry,
    Perimeter,
    PixelIdxList,
    OutputValue,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Field::Area,
        Field::BoundingBox,
        Field::Centroid,
        Field::Circularity,
        Field::ConvexArea,
        Field::Eccentricity,
        Field::Frame,
        Field::GradientScore,
        Field::Inlet,
        Field::Outlet,
        Field::Label,
        Field::MajorAxis,
        Field::MinorAxis,
        Field::Solidity,
        Field::Symmetry,
        Field::Perimeter,
        Field::PixelIdxList,
        Field::OutputValue,
    ];

    pub fn flag(self) -> FieldSet {
        FieldSet::from_bits_retain(1 << self as u32)
    }

    /// 字段声明的值类型
    pub fn kind(self) -> ValueKind {
        match self {
            Field::Frame | Field::Inlet | Field::Outlet | Field::Label => ValueKind::Int,
            Field::Centroid => ValueKind::Pair,
            Field::BoundingBox => ValueKind::Rect,
            Field::PixelIdxList => ValueKind::Pixels,
            _ => ValueKind::Real,
        }
    }

    /// 是否可以导出为矩阵中的一列
    pub fn is_scalar(self) -> bool {
        matches!(self.kind(), ValueKind::Int | ValueKind::Real)
    }
}

impl FromStr for Field {
    type Err = String;

    /// 按名称解析，忽略大小写与下划线，例如 `major_axis`、`MajorAxis`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = s.trim().replace('_', "").to_lowercase();
        Field::ALL
            .into_iter()
            .find(|field| format!("{field:?}").to_lowercase() == key)
            .ok_or_else(|| format!("unknown field: {s}"))
    }
}

impl From<Field> for FieldSet {
    fn from(field: Field) -> Self {
        field.flag()
    }
}

impl BitOr for Field {
    type Output = FieldSet;

    fn bitor(self, rhs: Field) -> FieldSet {
        self.flag() | rhs.flag()
    }
}

impl BitOr<Field> for FieldSet {
    type Output = FieldSet;

    fn bitor(self, rhs: Field) -> FieldSet {
        self | rhs.flag()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Real,
    Pair,
    Rect,
    Pixels,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i32),
    Real(f64),
    Pair((i32, i32)),
    Rect(Rect),
    Pixels(Vec<(u32, u32)>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Real(_) => ValueKind::Real,
            Value::Pair(_) => ValueKind::Pair,
            Value::Rect(_) => ValueKind::Rect,
            Value::Pixels(_) => ValueKind::Pixels,
        }
    }

    fn default_of(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => Value::Int(0),
            ValueKind::Real => Value::Real(0.),
            ValueKind::Pair => Value::Pair((0, 0)),
            ValueKind::Rect => Value::Rect(Rect::default()),
            ValueKind::Pixels => Value::Pixels(vec![]),
        }
    }

    /// 标量值转换为 f64，用于导出
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }
}

/// 可以存入 Record 的 Rust 类型
pub trait FeatureValue: Sized {
    const KIND: ValueKind;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_feature_value {
    ($ty: ty, $variant: ident, $kind: ident) => {
        impl FeatureValue for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_feature_value!(i32, Int, Int);
impl_feature_value!(f64, Real, Real);
impl_feature_value!((i32, i32), Pair, Pair);
impl_feature_value!(Rect, Rect, Rect);
impl_feature_value!(Vec<(u32, u32)>, Pixels, Pixels);

/// 单个对象的测量值，字段集合在创建时固定
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<Field, Value>,
}

impl Record {
    /// 创建一条记录，`flags` 中的字段填充为对应类型的零值
    pub fn new(flags: FieldSet) -> Self {
        let values = flags.fields().map(|field| (field, Value::default_of(field.kind()))).collect();
        Self { values }
    }

    pub fn fields(&self) -> FieldSet {
        self.values.keys().fold(FieldSet::empty(), |acc, field| acc | *field)
    }

    pub fn is_enabled(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    pub fn set<T: FeatureValue>(&mut self, field: Field, value: T) -> Result<(), FeatureError> {
        self.check(field, T::KIND)?;
        self.values.insert(field, value.into_value());
        Ok(())
    }

    pub fn get<T: FeatureValue>(&self, field: Field) -> Result<T, FeatureError> {
        let value = self.value(field)?;
        T::from_value(value).ok_or(FeatureError::TypeMismatch {
            field,
            expected: field.kind(),
            found: T::KIND,
        })
    }

    /// 不经过泛型的写入接口，值类型在运行时检查
    pub fn set_value(&mut self, field: Field, value: Value) -> Result<(), FeatureError> {
        self.check(field, value.kind())?;
        self.values.insert(field, value);
        Ok(())
    }

    pub fn value(&self, field: Field) -> Result<&Value, FeatureError> {
        self.values.get(&field).ok_or(FeatureError::FieldNotEnabled(field))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &Value)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }

    fn check(&self, field: Field, found: ValueKind) -> Result<(), FeatureError> {
        if !self.is_enabled(field) {
            return Err(FeatureError::FieldNotEnabled(field));
        }
        if field.kind() != found {
            return Err(FeatureError::TypeMismatch { field, expected: field.kind(), found });
        }
        Ok(())
    }
}

/// 一次运行中所有对象的特征记录
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeatureStore {
    #[serde(skip)]
    flags: FieldSet,
    records: Vec<Record>,
}

impl FeatureStore {
    pub fn new(flags: FieldSet) -> Self {
        Self { flags, records: vec![] }
    }

    pub fn flags(&self) -> FieldSet {
        self.flags
    }

    /// 设置之后新建记录所包含的字段，已有记录时不允许修改
    pub fn set_data_flags(&mut self, flags: impl Into<FieldSet>) -> Result<(), FeatureError> {
        if !self.records.is_empty() {
            return Err(FeatureError::FlagsLocked(self.records.len()));
        }
        self.flags = flags.into();
        Ok(())
    }

    pub fn add_data_flag(&mut self, field: Field) -> Result<(), FeatureError> {
        self.set_data_flags(self.flags | field)
    }

    /// 清空记录，保留字段设置
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// 清空记录和字段设置
    pub fn clear_all(&mut self) {
        self.records.clear();
        self.flags = FieldSet::empty();
    }

    /// 追加一条包含当前全部字段的新记录
    pub fn append_new(&mut self) -> &mut Record {
        let index = self.records.len();
        self.records.push(Record::new(self.flags));
        &mut self.records[index]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// 将指定的标量字段导出为矩阵，每条记录一行
    pub fn to_array(&self, fields: &[Field]) -> Result<Array2<f64>, FeatureError> {
        let mut array = Array2::zeros((self.records.len(), fields.len()));
        for (i, record) in self.records.iter().enumerate() {
            for (j, field) in fields.iter().enumerate() {
                let value = record.value(*field)?;
                array[[i, j]] = value.as_f64().ok_or(FeatureError::TypeMismatch {
                    field: *field,
                    expected: ValueKind::Real,
                    found: value.kind(),
                })?;
            }
        }
        Ok(array)
    }

    pub fn save_npy<P: AsRef<Path>>(&self, path: P, fields: &[Field]) -> Result<()> {
        let array = self.to_array(fields)?;
        write_npy(path, &array)?;
        Ok(())
    }
}

impl Index<usize> for FeatureStore {
    type Output = Record;

    fn index(&self, index: usize) -> &Record {
        &self.records[index]
    }
}

impl<'a> IntoIterator for &'a FeatureStore {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_set_value() {
        let mut store = FeatureStore::default();
        store.set_data_flags(Field::Area).unwrap();
        store.append_new().set(Field::Area, 12.3).unwrap();
        assert_eq!(store[0].get::<f64>(Field::Area).unwrap(), 12.3);
    }

    #[test]
    fn test_disabled_fields() {
        let mut store = FeatureStore::new(Field::Area | Field::Circularity | Field::Inlet);
        let record = store.append_new();
        assert_eq!(
            record.set(Field::Centroid, (1, 3)),
            Err(FeatureError::FieldNotEnabled(Field::Centroid))
        );
        assert_eq!(
            record.set(Field::Eccentricity, -143.395834),
            Err(FeatureError::FieldNotEnabled(Field::Eccentricity))
        );
        assert!(record.get::<(i32, i32)>(Field::Centroid).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let mut store = FeatureStore::new(FieldSet::all());
        let record = store.append_new();
        assert!(matches!(
            record.set(Field::Centroid, 13413),
            Err(FeatureError::TypeMismatch { field: Field::Centroid, .. })
        ));
        assert!(matches!(record.set(Field::Area, 3), Err(FeatureError::TypeMismatch { .. })));
        assert!(matches!(record.get::<i32>(Field::Area), Err(FeatureError::TypeMismatch { .. })));
    }

    #[test]
    fn test_all_fields() {
        let mut store = FeatureStore::new(FieldSet::all());
        let record = store.append_new();
        record.set(Field::Area, 0.254).unwrap();
        record.set(Field::BoundingBox, Rect::new(0, 5, 10, 15)).unwrap();
        record.set(Field::Centroid, (11, 22)).unwrap();
        record.set(Field::Frame, 5).unwrap();
        record.set(Field::Label, 21950).unwrap();
        record.set(Field::PixelIdxList, vec![(1u32, 2u32), (3, 4)]).unwrap();
        record.set(Field::Symmetry, 34.943).unwrap();

        let record = &store[0];
        assert_eq!(record.get::<f64>(Field::Area).unwrap(), 0.254);
        assert_eq!(record.get::<Rect>(Field::BoundingBox).unwrap(), Rect::new(0, 5, 10, 15));
        assert_eq!(record.get::<(i32, i32)>(Field::Centroid).unwrap(), (11, 22));
        assert_eq!(record.get::<i32>(Field::Frame).unwrap(), 5);
        assert_eq!(record.get::<i32>(Field::Label).unwrap(), 21950);
        assert_eq!(record.get::<Vec<(u32, u32)>>(Field::PixelIdxList).unwrap(), vec![(1, 2), (3, 4)]);
        assert_eq!(record.get::<f64>(Field::Symmetry).unwrap(), 34.943);
        // 未写入的字段为默认值
        assert_eq!(record.get::<f64>(Field::Perimeter).unwrap(), 0.);
    }

    #[test]
    fn test_flags_locked_until_clear() {
        let mut store = FeatureStore::new(Field::Area.into());
        store.append_new();
        assert_eq!(store.add_data_flag(Field::Label), Err(FeatureError::FlagsLocked(1)));

        store.clear();
        store.add_data_flag(Field::Label).unwrap();
        assert_eq!(store.flags(), Field::Area | Field::Label);
        assert!(store.append_new().is_enabled(Field::Label));

        store.clear_all();
        assert!(store.flags().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_record_keeps_creation_mask() {
        let mut store = FeatureStore::new(Field::Area.into());
        store.append_new();
        store.clear();
        store.set_data_flags(Field::Label).unwrap();
        store.append_new();
        assert_eq!(store[0].fields(), Field::Label.into());
    }

    #[test]
    fn test_to_array() {
        let mut store = FeatureStore::new(Field::Area | Field::Label | Field::Centroid);
        for i in 0..3 {
            let record = store.append_new();
            record.set(Field::Area, i as f64 * 1.5).unwrap();
            record.set(Field::Label, i).unwrap();
        }
        let array = store.to_array(&[Field::Label, Field::Area]).unwrap();
        assert_eq!(array.shape(), &[3, 2]);
        assert_eq!(array[[2, 0]], 2.);
        assert_eq!(array[[2, 1]], 3.);

        assert!(store.to_array(&[Field::Centroid]).is_err());
        assert!(store.to_array(&[Field::Perimeter]).is_err());
    }

    #[test]
    fn test_parse_field() {
        assert_eq!("major_axis".parse::<Field>(), Ok(Field::MajorAxis));
        assert_eq!("PixelIdxList".parse::<Field>(), Ok(Field::PixelIdxList));
        assert!("volume".parse::<Field>().is_err());
        assert!(Field::Label.is_scalar());
        assert!(!Field::Centroid.is_scalar());
    }
}

//! 处理步骤的参数
//!
//! 每个参数都有固定的类型（整数、浮点数、枚举），取值范围或可选项，以及当前值。
//! 参数可以和字符串互相转换，供外部编辑器和配置文件使用。
//!
//! `options()` 输出格式：
//!
//! ```text
//! int|Border_width|0|100
//! enum|Morphology_type|Erode|Dilate|Open|Close
//! ```

use std::fmt::Display;
use std::str::FromStr;

use crate::error::ParameterError;

/// 字符串序列化时使用的分隔符
pub const DELIMITER: char = '|';

#[derive(Debug, Clone, PartialEq)]
pub struct NumericParam<T> {
    range: Option<(T, T)>,
    value: Option<T>,
}

impl<T> Default for NumericParam<T> {
    fn default() -> Self {
        Self { range: None, value: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumParam {
    options: Option<Vec<(i32, String)>>,
    value: Option<i32>,
}

/// 参数值，每个变体自带解析、格式化和校验逻辑
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(NumericParam<i32>),
    Double(NumericParam<f64>),
    Enum(EnumParam),
}

impl ParamValue {
    pub fn tag(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => i32::TAG,
            ParamValue::Double(_) => f64::TAG,
            ParamValue::Enum(_) => "enum",
        }
    }
}

/// 可以作为数值参数的类型
pub trait Numeric: Copy + PartialOrd + Display + FromStr + 'static {
    const TAG: &'static str;

    fn slot(value: &ParamValue) -> Option<&NumericParam<Self>>;

    fn slot_mut(value: &mut ParamValue) -> Option<&mut NumericParam<Self>>;
}

impl Numeric for i32 {
    const TAG: &'static str = "int";

    fn slot(value: &ParamValue) -> Option<&NumericParam<Self>> {
        match value {
            ParamValue::Int(p) => Some(p),
            _ => None,
        }
    }

    fn slot_mut(value: &mut ParamValue) -> Option<&mut NumericParam<Self>> {
        match value {
            ParamValue::Int(p) => Some(p),
            _ => None,
        }
    }
}

impl Numeric for f64 {
    const TAG: &'static str = "double";

    fn slot(value: &ParamValue) -> Option<&NumericParam<Self>> {
        match value {
            ParamValue::Double(p) => Some(p),
            _ => None,
        }
    }

    fn slot_mut(value: &mut ParamValue) -> Option<&mut NumericParam<Self>> {
        match value {
            ParamValue::Double(p) => Some(p),
            _ => None,
        }
    }
}

/// 可以作为枚举参数的类型，一般通过 [`param_enum!`](crate::param_enum) 定义
pub trait ParamEnum: Copy + PartialEq + 'static {
    /// 所有可选值及其显示名称
    const OPTIONS: &'static [(Self, &'static str)];

    fn index(self) -> i32;

    fn from_index(index: i32) -> Option<Self> {
        Self::OPTIONS.iter().find(|(v, _)| v.index() == index).map(|(v, _)| *v)
    }

    fn label(self) -> &'static str {
        Self::OPTIONS.iter().find(|(v, _)| *v == self).map(|(_, label)| *label).unwrap_or("")
    }
}

/// 定义一个可以用作 [`ParamEnum`] 的枚举
#[macro_export]
macro_rules! param_enum {
    ($(#[$meta: meta])* $vis: vis enum $name: ident { $($variant: ident => $label: literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::parameter::ParamEnum for $name {
            const OPTIONS: &'static [(Self, &'static str)] = &[$(($name::$variant, $label)),+];

            fn index(self) -> i32 {
                self as i32
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: ParamValue,
    modifiable: bool,
}

impl Parameter {
    fn new(name: &str, value: ParamValue) -> Self {
        assert!(
            !name.is_empty() && !name.contains(|c: char| c.is_whitespace() || c == DELIMITER),
            "invalid parameter name: {name:?}"
        );
        Self { name: name.to_owned(), value, modifiable: true }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ParamValue {
        &self.value
    }

    pub fn is_modifiable(&self) -> bool {
        self.modifiable
    }

    /// 禁止通过字符串接口修改该参数
    ///
    /// 只读参数不会出现在保存的流程配置中，加载试图修改它的配置会失败。
    pub fn set_modifiable(&mut self, modifiable: bool) -> &mut Self {
        self.modifiable = modifiable;
        self
    }

    /// 范围（或可选项）与默认值都已设置
    pub fn is_initialized(&self) -> bool {
        match &self.value {
            ParamValue::Int(p) => p.range.is_some() && p.value.is_some(),
            ParamValue::Double(p) => p.range.is_some() && p.value.is_some(),
            ParamValue::Enum(p) => p.options.is_some() && p.value.is_some(),
        }
    }

    /// 设置取值范围，如果已经有值，该值必须落在新范围内
    pub fn set_range<T: Numeric>(&mut self, low: T, high: T) -> Result<&mut Self, ParameterError> {
        let (name, actual) = (&self.name, self.value.tag());
        let slot = T::slot_mut(&mut self.value).ok_or_else(|| type_mismatch(name, actual, T::TAG))?;
        if !(low <= high) {
            return Err(out_of_range(name, low, low, high));
        }
        if let Some(value) = slot.value {
            check_range(name, value, (low, high))?;
        }
        slot.range = Some((low, high));
        Ok(self)
    }

    pub fn range<T: Numeric>(&self) -> Option<(T, T)> {
        T::slot(&self.value).and_then(|slot| slot.range)
    }

    pub fn set_value<T: Numeric>(&mut self, value: T) -> Result<&mut Self, ParameterError> {
        let (name, actual) = (&self.name, self.value.tag());
        let slot = T::slot_mut(&mut self.value).ok_or_else(|| type_mismatch(name, actual, T::TAG))?;
        if let Some(range) = slot.range {
            check_range(name, value, range)?;
        }
        slot.value = Some(value);
        Ok(self)
    }

    pub fn value<T: Numeric>(&self) -> Result<T, ParameterError> {
        let slot = T::slot(&self.value).ok_or_else(|| type_mismatch(&self.name, self.value.tag(), T::TAG))?;
        if slot.range.is_none() {
            return Err(not_initialized(&self.name, "range"));
        }
        slot.value.ok_or_else(|| not_initialized(&self.name, "default"))
    }

    /// 以 `E` 的全部取值作为可选项
    pub fn set_options<E: ParamEnum>(&mut self) -> Result<&mut Self, ParameterError> {
        let options = E::OPTIONS.iter().map(|(v, label)| (v.index(), label.to_string())).collect();
        self.set_raw_options(options)
    }

    pub fn set_raw_options(&mut self, options: Vec<(i32, String)>) -> Result<&mut Self, ParameterError> {
        let (name, actual) = (&self.name, self.value.tag());
        let ParamValue::Enum(slot) = &mut self.value else {
            return Err(type_mismatch(name, actual, "enum"));
        };
        if let Some(value) = slot.value {
            if !options.iter().any(|(v, _)| *v == value) {
                return Err(ParameterError::OutOfRange {
                    name: name.clone(),
                    value: value.to_string(),
                    low: String::new(),
                    high: String::new(),
                });
            }
        }
        slot.options = Some(options);
        Ok(self)
    }

    pub fn set_variant<E: ParamEnum>(&mut self, value: E) -> Result<&mut Self, ParameterError> {
        let (name, actual) = (&self.name, self.value.tag());
        let ParamValue::Enum(slot) = &mut self.value else {
            return Err(type_mismatch(name, actual, "enum"));
        };
        let index = value.index();
        if let Some(options) = &slot.options {
            if !options.iter().any(|(v, _)| *v == index) {
                return Err(ParameterError::OutOfRange {
                    name: name.clone(),
                    value: value.label().to_owned(),
                    low: String::new(),
                    high: String::new(),
                });
            }
        }
        slot.value = Some(index);
        Ok(self)
    }

    pub fn variant<E: ParamEnum>(&self) -> Result<E, ParameterError> {
        let index = self.enum_index()?;
        E::from_index(index)
            .ok_or_else(|| ParameterError::ParseError { name: self.name.clone(), value: index.to_string() })
    }

    fn enum_index(&self) -> Result<i32, ParameterError> {
        let ParamValue::Enum(slot) = &self.value else {
            return Err(type_mismatch(&self.name, self.value.tag(), "enum"));
        };
        if slot.options.is_none() {
            return Err(not_initialized(&self.name, "options"));
        }
        slot.value.ok_or_else(|| not_initialized(&self.name, "default"))
    }

    /// 当前值的文本形式
    pub fn value_str(&self) -> Result<String, ParameterError> {
        match &self.value {
            ParamValue::Int(_) => Ok(self.value::<i32>()?.to_string()),
            ParamValue::Double(_) => Ok(self.value::<f64>()?.to_string()),
            ParamValue::Enum(slot) => {
                let index = self.enum_index()?;
                slot.options
                    .iter()
                    .flatten()
                    .find(|(v, _)| *v == index)
                    .map(|(_, label)| label.clone())
                    .ok_or_else(|| ParameterError::ParseError {
                        name: self.name.clone(),
                        value: index.to_string(),
                    })
            }
        }
    }

    /// 从文本设置当前值，校验规则与 `set_value` 相同
    pub fn set_value_str(&mut self, value: &str) -> Result<(), ParameterError> {
        if !self.modifiable {
            return Err(ParameterError::ReadOnly(self.name.clone()));
        }
        let text = value.trim();
        match self.value {
            ParamValue::Int(_) => {
                let v = parse::<i32>(&self.name, text)?;
                self.set_value(v)?;
            }
            ParamValue::Double(_) => {
                let v = parse::<f64>(&self.name, text)?;
                self.set_value(v)?;
            }
            ParamValue::Enum(ref mut slot) => {
                let Some(options) = &slot.options else {
                    return Err(not_initialized(&self.name, "options"));
                };
                let index = options
                    .iter()
                    .find(|(_, label)| label == text)
                    .map(|(v, _)| *v)
                    .ok_or_else(|| ParameterError::ParseError {
                        name: self.name.clone(),
                        value: value.to_owned(),
                    })?;
                slot.value = Some(index);
            }
        }
        Ok(())
    }

    /// 类型、名称以及范围或可选项，以 `|` 分隔
    pub fn options(&self) -> String {
        let mut parts = vec![self.value.tag().to_owned(), self.name.clone()];
        match &self.value {
            ParamValue::Int(p) => parts.extend(p.range.iter().flat_map(|(l, h)| [l.to_string(), h.to_string()])),
            ParamValue::Double(p) => {
                parts.extend(p.range.iter().flat_map(|(l, h)| [l.to_string(), h.to_string()]))
            }
            ParamValue::Enum(p) => parts.extend(p.options.iter().flatten().map(|(_, label)| label.clone())),
        }
        let delimiter = DELIMITER.to_string();
        parts.join(delimiter.as_str())
    }
}

fn parse<T: Numeric>(name: &str, text: &str) -> Result<T, ParameterError> {
    text.parse::<T>()
        .map_err(|_| ParameterError::ParseError { name: name.to_owned(), value: text.to_owned() })
}

fn check_range<T: Numeric>(name: &str, value: T, (low, high): (T, T)) -> Result<(), ParameterError> {
    // NaN 同样视为越界
    if low <= value && value <= high { Ok(()) } else { Err(out_of_range(name, value, low, high)) }
}

fn out_of_range<T: Numeric>(name: &str, value: T, low: T, high: T) -> ParameterError {
    ParameterError::OutOfRange {
        name: name.to_owned(),
        value: value.to_string(),
        low: low.to_string(),
        high: high.to_string(),
    }
}

fn not_initialized(name: &str, missing: &'static str) -> ParameterError {
    ParameterError::NotInitialized { name: name.to_owned(), missing }
}

fn type_mismatch(name: &str, actual: &'static str, requested: &'static str) -> ParameterError {
    ParameterError::TypeMismatch { name: name.to_owned(), actual, requested }
}

/// 一个处理步骤拥有的全部参数，顺序即序列化顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters(Vec<Parameter>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, name: &str, value: ParamValue) -> &mut Parameter {
        assert!(self.get(name).is_none(), "duplicate parameter name: {name}");
        let index = self.0.len();
        self.0.push(Parameter::new(name, value));
        &mut self.0[index]
    }

    pub fn add_int(&mut self, name: &str) -> &mut Parameter {
        self.add(name, ParamValue::Int(NumericParam::default()))
    }

    pub fn add_double(&mut self, name: &str) -> &mut Parameter {
        self.add(name, ParamValue::Double(NumericParam::default()))
    }

    pub fn add_enum(&mut self, name: &str) -> &mut Parameter {
        self.add(name, ParamValue::Enum(EnumParam::default()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.0.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.0.iter_mut().find(|p| p.name == name)
    }

    fn require(&self, name: &str) -> Result<&Parameter, ParameterError> {
        self.get(name).ok_or_else(|| ParameterError::Missing(name.to_owned()))
    }

    pub fn int(&self, name: &str) -> Result<i32, ParameterError> {
        self.require(name)?.value()
    }

    pub fn double(&self, name: &str) -> Result<f64, ParameterError> {
        self.require(name)?.value()
    }

    pub fn variant<E: ParamEnum>(&self, name: &str) -> Result<E, ParameterError> {
        self.require(name)?.variant()
    }

    /// 所有可修改参数的 (名称, 值) 文本对，只读参数由步骤自身决定，不写入配置
    pub fn to_pairs(&self) -> Result<Vec<(String, String)>, ParameterError> {
        self.0.iter().filter(|p| p.modifiable).map(|p| Ok((p.name.clone(), p.value_str()?))).collect()
    }

    /// 检查所有参数都已完整初始化
    pub fn check(&self) -> Result<(), ParameterError> {
        for p in &self.0 {
            if !p.is_initialized() {
                let missing = match &p.value {
                    ParamValue::Enum(slot) if slot.options.is_none() => "options",
                    ParamValue::Int(NumericParam { range: None, .. })
                    | ParamValue::Double(NumericParam { range: None, .. }) => "range",
                    _ => "default",
                };
                return Err(not_initialized(&p.name, missing));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::param_enum! {
        enum Shape {
            Square => "Square",
            Disk => "Disk",
        }
    }

    #[test]
    fn test_not_initialized_in_either_order() {
        let mut params = Parameters::new();
        let p = params.add_int("Border_width");
        assert!(matches!(p.value::<i32>(), Err(ParameterError::NotInitialized { missing: "range", .. })));
        p.set_value(5).unwrap();
        assert!(matches!(p.value::<i32>(), Err(ParameterError::NotInitialized { .. })));
        p.set_range(0, 10).unwrap();
        assert_eq!(p.value::<i32>().unwrap(), 5);

        let p = params.add_double("Edge_threshold");
        p.set_range(0., 1.).unwrap();
        assert!(matches!(p.value::<f64>(), Err(ParameterError::NotInitialized { missing: "default", .. })));
        p.set_value(0.5).unwrap();
        assert_eq!(p.value::<f64>().unwrap(), 0.5);
    }

    #[test]
    fn test_range_boundaries() {
        let mut params = Parameters::new();
        let p = params.add_double("Limit");
        p.set_range(-1.5, 2.5).unwrap();
        assert!(p.set_value(-1.5).is_ok());
        assert!(p.set_value(2.5).is_ok());
        assert!(matches!(p.set_value(2.5000001), Err(ParameterError::OutOfRange { .. })));
        assert!(matches!(p.set_value(-1.6), Err(ParameterError::OutOfRange { .. })));
        assert!(matches!(p.set_value(f64::NAN), Err(ParameterError::OutOfRange { .. })));
        // 越界写入不会改变原值
        assert_eq!(p.value::<f64>().unwrap(), 2.5);
    }

    #[test]
    fn test_range_rejects_existing_value() {
        let mut params = Parameters::new();
        let p = params.add_int("Radius");
        p.set_value(50).unwrap();
        assert!(matches!(p.set_range(0, 10), Err(ParameterError::OutOfRange { .. })));
        assert_eq!(p.range::<i32>(), None);
    }

    #[test]
    fn test_type_mismatch() {
        let mut params = Parameters::new();
        let p = params.add_int("Radius");
        assert!(matches!(p.set_range(0., 1.), Err(ParameterError::TypeMismatch { .. })));
        assert!(matches!(p.set_variant(Shape::Disk), Err(ParameterError::TypeMismatch { .. })));
    }

    #[test]
    fn test_value_str() {
        let mut params = Parameters::new();
        params.add_int("Radius").set_range(0, 10).unwrap().set_value(3).unwrap();
        params.add_double("Threshold").set_range(0., 255.).unwrap().set_value(12.75).unwrap();

        let p = params.get_mut("Radius").unwrap();
        assert_eq!(p.value_str().unwrap(), "3");
        p.set_value_str(" 7 ").unwrap();
        assert_eq!(p.value::<i32>().unwrap(), 7);
        assert!(matches!(p.set_value_str("seven"), Err(ParameterError::ParseError { .. })));
        assert!(matches!(p.set_value_str("11"), Err(ParameterError::OutOfRange { .. })));

        let p = params.get_mut("Threshold").unwrap();
        assert_eq!(p.value_str().unwrap(), "12.75");
        p.set_value_str("0.1").unwrap();
        assert_eq!(p.value::<f64>().unwrap(), 0.1);

        assert_eq!(
            params.to_pairs().unwrap(),
            vec![("Radius".to_owned(), "7".to_owned()), ("Threshold".to_owned(), "0.1".to_owned())]
        );
    }

    #[test]
    fn test_enum_parameter() {
        let mut params = Parameters::new();
        let p = params.add_enum("Shape");
        assert!(matches!(p.variant::<Shape>(), Err(ParameterError::NotInitialized { missing: "options", .. })));
        p.set_options::<Shape>().unwrap();
        assert!(matches!(p.value_str(), Err(ParameterError::NotInitialized { missing: "default", .. })));
        p.set_variant(Shape::Disk).unwrap();
        assert_eq!(p.variant::<Shape>().unwrap(), Shape::Disk);
        assert_eq!(p.value_str().unwrap(), "Disk");

        p.set_value_str("Square").unwrap();
        assert_eq!(p.variant::<Shape>().unwrap(), Shape::Square);
        // 未知的名称会报错，并且保留原值
        assert!(matches!(p.set_value_str("Triangle"), Err(ParameterError::ParseError { .. })));
        assert_eq!(p.variant::<Shape>().unwrap(), Shape::Square);
    }

    #[test]
    fn test_options() {
        let mut params = Parameters::new();
        params.add_int("Border_width").set_range(0, 100).unwrap();
        params.add_double("Edge_threshold").set_range(0.5, 255.).unwrap();
        params.add_enum("Shape").set_options::<Shape>().unwrap();
        params.add_int("Unset");

        let options = params.iter().map(Parameter::options).collect::<Vec<_>>();
        assert_eq!(
            options,
            vec!["int|Border_width|0|100", "double|Edge_threshold|0.5|255", "enum|Shape|Square|Disk", "int|Unset"]
        );
    }

    #[test]
    fn test_read_only() {
        let mut params = Parameters::new();
        let p = params.add_int("Fixed");
        p.set_range(0, 1).unwrap().set_value(1).unwrap().set_modifiable(false);
        assert_eq!(p.set_value_str("0"), Err(ParameterError::ReadOnly("Fixed".to_owned())));
    }

    #[test]
    fn test_check() {
        let mut params = Parameters::new();
        params.add_int("A").set_range(0, 1).unwrap().set_value(0).unwrap();
        assert!(params.check().is_ok());
        params.add_enum("B").set_options::<Shape>().unwrap();
        assert!(matches!(params.check(), Err(ParameterError::NotInitialized { missing: "default", .. })));
        assert!(matches!(params.int("C"), Err(ParameterError::Missing(_))));
    }

    #[test]
    #[should_panic(expected = "invalid parameter name")]
    fn test_invalid_name() {
        Parameters::new().add_int("Edge threshold");
    }
}

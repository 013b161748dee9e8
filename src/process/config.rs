//! 处理流程配置的持久化
//!
//! 支持三种格式，由文件后缀决定：
//!
//! - `.json`：serde_json
//! - `.bin`：bincode
//! - `.txt`：按行的文本格式，字段以 `|` 分隔，`#` 开头的行为注释
//!
//! ```text
//! chain|rbc
//! SubtractBackground|Edge_threshold|12
//! Binarize|Edge_threshold|20|Maximum_binary_value|255
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::parameter::DELIMITER;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub type_name: String,
    /// (参数名, 参数值) 文本对
    pub params: Vec<(String, String)>,
}

impl StepConfig {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), params: vec![] }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub steps: Vec<StepConfig>,
}

impl ChainConfig {
    /// 红细胞检测的预设流程
    pub fn rbc_preset() -> Self {
        Self {
            name: "rbc".to_owned(),
            steps: vec![
                StepConfig::new("SubtractBackground").with("Edge_threshold", 12),
                StepConfig::new("Normalize").with("Normalize_strength", 100),
                StepConfig::new("Binarize").with("Edge_threshold", 20).with("Maximum_binary_value", 255),
                StepConfig::new("Morphology")
                    .with("Morphology_type", "Close")
                    .with("Structuring_element", "Square")
                    .with("Radius", 2),
                StepConfig::new("FloodFill"),
                StepConfig::new("ClearBorder").with("Border_width", 1),
                StepConfig::new("PropertyFilter")
                    .with("Regionprop_type", "Area")
                    .with("Lower_Limit", 20)
                    .with("Upper_Limit", 5000),
            ],
        }
    }

    pub fn to_text(&self) -> String {
        let delimiter = DELIMITER.to_string();
        let delimiter = delimiter.as_str();
        let mut lines = vec![["chain", self.name.as_str()].join(delimiter)];
        for step in &self.steps {
            let mut fields = vec![step.type_name.as_str()];
            for (name, value) in &step.params {
                fields.push(name);
                fields.push(value);
            }
            lines.push(fields.join(delimiter));
        }
        lines.push(String::new());
        lines.join("\n")
    }

    pub fn from_text(text: &str) -> Result<Self, ChainError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let name = match lines.next() {
            Some((line, content)) => match content.split_once(DELIMITER) {
                Some((tag, name)) if tag.trim() == "chain" => name.trim().to_owned(),
                _ => return Err(ChainError::Format { line, message: "expected `chain|NAME` header".into() }),
            },
            None => return Err(ChainError::Format { line: 0, message: "empty chain file".into() }),
        };

        let mut steps = vec![];
        for (line, content) in lines {
            let mut fields = content.split(DELIMITER).map(str::trim);
            let type_name = fields.next().unwrap_or_default();
            if type_name.is_empty() {
                return Err(ChainError::Format { line, message: "missing process type".into() });
            }
            let rest = fields.collect::<Vec<_>>();
            if rest.len() % 2 != 0 {
                return Err(ChainError::Format { line, message: format!("parameter {:?} has no value", rest[rest.len() - 1]) });
            }
            let params = rest.chunks(2).map(|kv| (kv[0].to_owned(), kv[1].to_owned())).collect();
            steps.push(StepConfig { type_name: type_name.to_owned(), params });
        }
        Ok(Self { name, steps })
    }

    pub fn to_json(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ChainError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ChainError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// 按后缀名选择格式保存
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ChainError> {
        let path = path.as_ref();
        match extension(path)?.as_str() {
            "json" => fs::write(path, self.to_json()?)?,
            "bin" => fs::write(path, self.to_bytes()?)?,
            _ => fs::write(path, self.to_text())?,
        }
        Ok(())
    }

    /// 按后缀名选择格式读取
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ChainError> {
        let path = path.as_ref();
        match extension(path)?.as_str() {
            "json" => Self::from_json(&fs::read_to_string(path)?),
            "bin" => Self::from_bytes(&fs::read(path)?),
            _ => Self::from_text(&fs::read_to_string(path)?),
        }
    }
}

fn extension(path: &Path) -> Result<String, ChainError> {
    let ext = path.extension().map(|s| s.to_string_lossy().to_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "json" | "bin" | "txt" => Ok(ext),
        _ => Err(ChainError::UnsupportedFormat(path.display().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_format() {
        let text = "chain|rbc\n# comment\nSubtractBackground|Edge_threshold|12\n\nBinarize|Edge_threshold|20|Maximum_binary_value|255\nFloodFill\n";
        let config = ChainConfig::from_text(text).unwrap();
        assert_eq!(config.name, "rbc");
        assert_eq!(config.steps.len(), 3);
        assert_eq!(config.steps[1].params, vec![
            ("Edge_threshold".to_owned(), "20".to_owned()),
            ("Maximum_binary_value".to_owned(), "255".to_owned())
        ]);
        assert!(config.steps[2].params.is_empty());
        assert_eq!(ChainConfig::from_text(&config.to_text()).unwrap(), config);
    }

    #[test]
    fn test_text_errors() {
        assert!(matches!(ChainConfig::from_text(""), Err(ChainError::Format { line: 0, .. })));
        assert!(matches!(ChainConfig::from_text("Binarize|Edge_threshold|1"), Err(ChainError::Format { line: 1, .. })));
        assert!(matches!(
            ChainConfig::from_text("chain|x\nBinarize|Edge_threshold"),
            Err(ChainError::Format { line: 2, .. })
        ));
    }

    #[test]
    fn test_archive_formats() {
        let config = ChainConfig::rbc_preset();
        assert_eq!(ChainConfig::from_json(&config.to_json().unwrap()).unwrap(), config);
        assert_eq!(ChainConfig::from_bytes(&config.to_bytes().unwrap()).unwrap(), config);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = ChainConfig::rbc_preset().save("chain.yaml");
        assert!(matches!(err, Err(ChainError::UnsupportedFormat(_))));
    }
}

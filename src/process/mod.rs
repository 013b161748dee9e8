//! 图像处理流程
//!
//! 一个 [`ProcessChain`] 由若干 [`ProcessStep`] 按顺序组成，每个步骤持有自己的参数，
//! 原地修改传入的图像。步骤类型通过 [`ProcessRegistry`] 按名称创建。

mod config;
mod steps;

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use image::GrayImage;
use log::debug;

pub use config::{ChainConfig, StepConfig};
pub use steps::*;

use crate::config::SessionConfig;
use crate::error::{ChainError, ProcessError};
use crate::parameter::Parameters;

/// 一个可配置的图像处理步骤
pub trait ProcessStep: Send + Sync {
    /// 注册时使用的类型名
    fn type_name(&self) -> &'static str;

    fn parameters(&self) -> &Parameters;

    fn parameters_mut(&mut self) -> &mut Parameters;

    /// 使用当前参数原地处理 `image`
    fn process(&self, image: &mut GrayImage, background: &GrayImage, config: &SessionConfig) -> Result<(), ProcessError>;
}

type Factory = fn() -> Box<dyn ProcessStep>;

fn factory<S: ProcessStep + Default + 'static>() -> Box<dyn ProcessStep> {
    Box::<S>::default()
}

/// 类型名到构造函数的映射
#[derive(Default)]
pub struct ProcessRegistry {
    factories: Vec<(&'static str, Factory)>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个步骤类型，同名类型会被覆盖
    pub fn register<S: ProcessStep + Default + 'static>(&mut self) -> &mut Self {
        let name = S::default().type_name();
        match self.factories.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = factory::<S>,
            None => self.factories.push((name, factory::<S>)),
        }
        self
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn ProcessStep>, ChainError> {
        self.factories
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| f())
            .ok_or_else(|| ChainError::UnknownProcessType(name.to_owned()))
    }

    /// 按注册顺序返回所有类型名
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(n, _)| *n).collect()
    }

    /// 包含全部内置步骤的注册表
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register::<Morphology>()
            .register::<Binarize>()
            .register::<Normalize>()
            .register::<SubtractBackground>()
            .register::<Canny>()
            .register::<ClearBorder>()
            .register::<FloodFill>()
            .register::<PropertyFilter>()
            .register::<ChannelMask>();
        registry
    }
}

static REGISTRY: LazyLock<Arc<ProcessRegistry>> = LazyLock::new(|| Arc::new(ProcessRegistry::builtin()));

/// 全局内置注册表，首次使用时构建
pub fn registry() -> Arc<ProcessRegistry> {
    REGISTRY.clone()
}

/// 有序的处理步骤列表
pub struct ProcessChain {
    registry: Arc<ProcessRegistry>,
    steps: Vec<Box<dyn ProcessStep>>,
}

impl Default for ProcessChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcessChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.steps.iter().map(|s| s.type_name())).finish()
    }
}

impl ProcessChain {
    pub fn new() -> Self {
        Self::with_registry(registry())
    }

    pub fn with_registry(registry: Arc<ProcessRegistry>) -> Self {
        Self { registry, steps: vec![] }
    }

    pub fn available_types(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    /// 在末尾追加一个新步骤，参数为默认值
    pub fn push(&mut self, type_name: &str) -> Result<&mut dyn ProcessStep, ChainError> {
        let step = self.registry.create(type_name)?;
        self.steps.push(step);
        let index = self.steps.len() - 1;
        Ok(self.steps[index].as_mut())
    }

    pub fn remove(&mut self, index: usize) -> Result<Box<dyn ProcessStep>, ChainError> {
        self.bound(index)?;
        Ok(self.steps.remove(index))
    }

    /// 与前一个步骤交换，已在首位时不做任何事
    pub fn move_up(&mut self, index: usize) -> Result<(), ChainError> {
        self.bound(index)?;
        if index > 0 {
            self.steps.swap(index - 1, index);
        }
        Ok(())
    }

    /// 与后一个步骤交换，已在末位时不做任何事
    pub fn move_down(&mut self, index: usize) -> Result<(), ChainError> {
        self.bound(index)?;
        if index + 1 < self.steps.len() {
            self.steps.swap(index, index + 1);
        }
        Ok(())
    }

    fn bound(&self, index: usize) -> Result<(), ChainError> {
        if index < self.steps.len() {
            Ok(())
        } else {
            Err(ChainError::IndexOutOfBounds { index, len: self.steps.len() })
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ProcessStep> {
        self.steps.iter().map(|s| s.as_ref())
    }

    pub fn get(&self, index: usize) -> Option<&dyn ProcessStep> {
        self.steps.get(index).map(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn ProcessStep + 'static)> {
        self.steps.get_mut(index).map(|s| s.as_mut())
    }

    /// 检查所有步骤的参数均已初始化
    pub fn check(&self) -> Result<(), ChainError> {
        for step in &self.steps {
            step.parameters().check()?;
        }
        Ok(())
    }

    /// 依次执行所有步骤
    pub fn run(&self, image: &mut GrayImage, background: &GrayImage, config: &SessionConfig) -> Result<(), ProcessError> {
        for step in &self.steps {
            let start = Instant::now();
            step.process(image, background, config)?;
            debug!("{} 耗时 {:.2?}", step.type_name(), start.elapsed());
        }
        Ok(())
    }

    pub fn to_config(&self, name: &str) -> Result<ChainConfig, ChainError> {
        let steps = self
            .steps
            .iter()
            .map(|step| {
                Ok(StepConfig { type_name: step.type_name().to_owned(), params: step.parameters().to_pairs()? })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;
        Ok(ChainConfig { name: name.to_owned(), steps })
    }

    pub fn from_config(config: &ChainConfig) -> Result<Self, ChainError> {
        Self::from_config_with(config, registry())
    }

    /// 按配置重建流程，配置中未出现的参数保留默认值
    pub fn from_config_with(config: &ChainConfig, registry: Arc<ProcessRegistry>) -> Result<Self, ChainError> {
        let mut chain = Self::with_registry(registry);
        for step_config in &config.steps {
            let step = chain.push(&step_config.type_name)?;
            let params = step.parameters_mut();
            for (name, value) in &step_config.params {
                let param = params.get_mut(name).ok_or_else(|| ChainError::UnknownParameter {
                    process: step_config.type_name.clone(),
                    name: name.clone(),
                })?;
                param.set_value_str(value)?;
            }
        }
        Ok(chain)
    }
}

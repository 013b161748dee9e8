use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::process::{ChainConfig, ProcessChain};

#[derive(Parser, Debug, Clone)]
pub struct ConvertCommand {
    /// 输入的处理流程配置
    pub input: PathBuf,
    /// 输出路径，按后缀决定格式
    pub output: PathBuf,
}

impl SubCommandExtend for ConvertCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let config = ChainConfig::load(&self.input)?;
        // 先重建一次流程，确保写出的配置是合法的
        let chain = ProcessChain::from_config(&config)?;
        chain.to_config(&config.name)?.save(&self.output)?;
        info!("已转换 {} -> {}", self.input.display(), self.output.display());
        Ok(())
    }
}

use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{ChainOptions, Opts};
use crate::process::ProcessChain;

#[derive(Parser, Debug, Clone)]
pub struct OptionsCommand {
    #[command(flatten)]
    pub chain: ChainOptions,
    /// 同时输出参数的当前值
    #[arg(short, long)]
    pub values: bool,
}

impl SubCommandExtend for OptionsCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let chain = ProcessChain::from_config(&self.chain.load()?)?;
        for (i, step) in chain.iter().enumerate() {
            println!("[{}] {}", i, step.type_name());
            for param in step.parameters() {
                match self.values {
                    true => println!("{} = {}", param.options(), param.value_str()?),
                    false => println!("{}", param.options()),
                }
            }
        }
        Ok(())
    }
}

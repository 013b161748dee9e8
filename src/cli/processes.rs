use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::process::registry;

#[derive(Parser, Debug, Clone)]
pub struct ProcessesCommand {}

impl SubCommandExtend for ProcessesCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        for name in registry().names() {
            println!("{name}");
        }
        Ok(())
    }
}

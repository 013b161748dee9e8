use anyhow::Result;
use clap::Parser;

use cellsort::cli::SubCommandExtend;
use cellsort::config::{Opts, SubCommand};

fn main() -> Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Run(config) => config.run(&opts),
        SubCommand::Processes(config) => config.run(&opts),
        SubCommand::Options(config) => config.run(&opts),
        SubCommand::Convert(config) => config.run(&opts),
    }
}

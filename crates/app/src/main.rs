mod html;
mod scanner;

use clap::Parser;

use crate::scanner::{ScannerArgs, ScannerConfig};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = ScannerArgs::parse();
    let config = ScannerConfig::try_from(args)?;
    scanner::run(config)
}

use clap::Parser;
use seg_tools::{run_verify, VerifyArgs};

fn main() -> anyhow::Result<()> {
    let args = VerifyArgs::parse();
    let report = run_verify(args)?;
    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}

use clap::Parser;
use seg_tools::{run_preview, PreviewArgs};

fn main() -> anyhow::Result<()> {
    let args = PreviewArgs::parse();
    run_preview(args)?;
    Ok(())
}

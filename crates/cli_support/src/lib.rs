//! Shared clap argument groups and logging setup for the seg_tools binaries.

use clap::{Args, ValueEnum};
use seg_dataset::{AugmentPolicy, Normalization, ReadMode};
use std::path::PathBuf;

/// Image/label directory pair shared by every dataset tool.
#[derive(Debug, Clone, Args)]
pub struct DatasetDirsArgs {
    /// Directory of input images.
    #[arg(long)]
    pub images: PathBuf,
    /// Directory of label rasters whose first channel holds class indices.
    #[arg(long)]
    pub labels: PathBuf,
}

/// Network input/output geometry.
#[derive(Debug, Clone, Copy, Args)]
pub struct ImageSizeArgs {
    #[arg(long, default_value_t = 224)]
    pub input_width: u32,
    #[arg(long, default_value_t = 224)]
    pub input_height: u32,
    #[arg(long, default_value_t = 224)]
    pub output_width: u32,
    #[arg(long, default_value_t = 224)]
    pub output_height: u32,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationArg {
    /// Scale to [-1, 1].
    SubAndDivide,
    /// Subtract per-channel means and reverse channel order.
    SubMean,
    /// Scale to [0, 1].
    Divide,
}

impl From<NormalizationArg> for Normalization {
    fn from(arg: NormalizationArg) -> Self {
        match arg {
            NormalizationArg::SubAndDivide => Normalization::SubAndDivide,
            NormalizationArg::SubMean => Normalization::SubMean,
            NormalizationArg::Divide => Normalization::Divide,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadModeArg {
    Color,
    Grayscale,
    Unchanged,
}

impl From<ReadModeArg> for ReadMode {
    fn from(arg: ReadModeArg) -> Self {
        match arg {
            ReadModeArg::Color => ReadMode::Color,
            ReadModeArg::Grayscale => ReadMode::Grayscale,
            ReadModeArg::Unchanged => ReadMode::Unchanged,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentArg {
    #[value(name = "aug_all")]
    All,
    #[value(name = "aug_geometric")]
    Geometric,
    #[value(name = "aug_non_geometric")]
    NonGeometric,
    #[value(name = "aug_flip")]
    Flip,
}

impl From<AugmentArg> for AugmentPolicy {
    fn from(arg: AugmentArg) -> Self {
        match arg {
            AugmentArg::All => AugmentPolicy::All,
            AugmentArg::Geometric => AugmentPolicy::Geometric,
            AugmentArg::NonGeometric => AugmentPolicy::NonGeometric,
            AugmentArg::Flip => AugmentPolicy::Flip,
        }
    }
}

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to INFO.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Harness {
        #[command(flatten)]
        dirs: DatasetDirsArgs,
        #[command(flatten)]
        size: ImageSizeArgs,
        #[arg(long, value_enum, default_value_t = NormalizationArg::SubMean)]
        norm: NormalizationArg,
        #[arg(long, value_enum)]
        augment: Option<AugmentArg>,
    }

    #[test]
    fn parses_shared_groups() {
        let h = Harness::try_parse_from([
            "t",
            "--images",
            "imgs",
            "--labels",
            "segs",
            "--input-width",
            "64",
            "--augment",
            "aug_flip",
        ])
        .unwrap();
        assert_eq!(h.dirs.images, PathBuf::from("imgs"));
        assert_eq!(h.size.input_width, 64);
        assert_eq!(h.size.output_height, 224);
        assert_eq!(Normalization::from(h.norm), Normalization::SubMean);
        assert_eq!(h.augment.map(AugmentPolicy::from), Some(AugmentPolicy::Flip));
    }

    #[test]
    fn rejects_unknown_policy_and_missing_dirs() {
        let unknown = [
            "t",
            "--images",
            "i",
            "--labels",
            "l",
            "--augment",
            "aug_rotate",
        ];
        assert!(Harness::try_parse_from(unknown).is_err());
        assert!(Harness::try_parse_from(["t", "--images", "i"]).is_err());
    }
}

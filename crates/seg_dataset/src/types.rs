//! Core types, error definitions, and data structures for seg_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, SegDatasetError>;

/// Extensions accepted for input images (and auxiliary inputs).
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp"];
/// Extensions accepted for label rasters. Lossless formats only, since pixel
/// values are class indices.
pub const LABEL_EXTENSIONS: &[&str] = &[".png", ".bmp"];
/// Extensions typically used for optical-flow style auxiliary inputs.
pub const FLOW_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

#[derive(Debug, Error)]
pub enum SegDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "Segmentation file with filename {stem} already exists and is ambiguous to resolve with path {path}. Please remove or rename the latter."
    )]
    AmbiguousLabel { stem: String, path: PathBuf },
    #[error("No corresponding segmentation found for image {image}.")]
    MissingPair { image: PathBuf },
    #[error("There was no matching auxiliary input to {stem} in directory {dir}")]
    MissingAuxiliary { stem: String, dir: PathBuf },
    #[error("Can't process input type {type_name}")]
    UnsupportedInput { type_name: String },
    #[error("path {path} doesn't exist")]
    MissingFile { path: PathBuf },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("shape error: {msg}")]
    Shape { msg: String },
    #[error("invalid generator configuration: {msg}")]
    Config { msg: String },
    #[error("no samples could be loaded from {images_dir}")]
    EmptyDataset { images_dir: PathBuf },
}

impl SegDatasetError {
    /// Errors raised by the pair matcher while building a labeled dataset.
    ///
    /// This is the kind the verifier turns into a finding instead of propagating.
    pub fn is_loader_error(&self) -> bool {
        matches!(
            self,
            SegDatasetError::AmbiguousLabel { .. } | SegDatasetError::MissingPair { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SegDatasetError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        SegDatasetError::Shape { msg: msg.into() }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SegDatasetError::Config { msg: msg.into() }
    }
}

/// A directory entry that passed the extension filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub stem: String,
    /// Literal suffix including the dot, e.g. `.png`.
    pub extension: String,
    pub full_path: PathBuf,
}

/// One image joined with its label and, optionally, one file per auxiliary directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedSample {
    pub image_path: PathBuf,
    pub label_path: PathBuf,
    /// One path per auxiliary directory, in the order the directories were given.
    pub aux_paths: Vec<PathBuf>,
}

/// Matched samples in image-scan order.
pub type Dataset = Vec<MatchedSample>;

/// How raster channels are laid out in a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    ChannelsFirst,
    #[default]
    ChannelsLast,
}

/// Pixel normalization applied after resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `pixel / 127.5 - 1`, mapping [0, 255] to [-1, 1].
    SubAndDivide,
    /// Subtract per-channel B,G,R means, then reverse the channel order.
    #[default]
    SubMean,
    /// `pixel / 255`, mapping [0, 255] to [0, 1].
    Divide,
}

impl Normalization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Normalization::SubAndDivide => "sub_and_divide",
            Normalization::SubMean => "sub_mean",
            Normalization::Divide => "divide",
        }
    }
}

/// Decoder channel handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Three channels in B,G,R order; alpha dropped, grayscale replicated.
    #[default]
    Color,
    /// One luma channel.
    Grayscale,
    /// Native channel count (1, 2, 3 or 4); colour channels in B,G,R(,A) order.
    Unchanged,
}

/// Resampling filter used by `Raster::resize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Bilinear,
    /// Required for label rasters: class indices must never be blended.
    Nearest,
}

/// Dense row-major `f32` array with an explicit shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Normalized image tensor: `[H, W, C]` or `[C, H, W]`.
pub type FeatureTensor = Tensor;
/// One-hot label tensor: `[H, W, K]` or flattened `[H * W, K]`.
pub type LabelTensor = Tensor;

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> DatasetResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(SegDatasetError::shape(format!(
                "tensor shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Element at a multi-dimensional index; `None` when out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0usize;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        self.data.get(offset).copied()
    }

    /// Same data under a new shape with the same element count.
    pub fn reshape(self, shape: Vec<usize>) -> DatasetResult<Self> {
        Tensor::new(shape, self.data)
    }

    /// Stack equally shaped tensors along a new leading batch axis.
    pub fn stack(items: &[Tensor]) -> DatasetResult<Self> {
        let Some(first) = items.first() else {
            return Err(SegDatasetError::shape("cannot stack an empty list of tensors"));
        };
        let mut data = Vec::with_capacity(first.data.len() * items.len());
        for (i, t) in items.iter().enumerate() {
            if t.shape != first.shape {
                return Err(SegDatasetError::shape(format!(
                    "batch element {i} has shape {:?}, expected {:?}",
                    t.shape, first.shape
                )));
            }
            data.extend_from_slice(&t.data);
        }
        let mut shape = Vec::with_capacity(first.shape.len() + 1);
        shape.push(items.len());
        shape.extend_from_slice(&first.shape);
        Ok(Self { shape, data })
    }
}

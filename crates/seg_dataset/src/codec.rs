//! Raster to tensor conversion: normalized image features and one-hot labels.

use crate::raster::{decode, Raster};
use crate::types::{
    ChannelOrder, DatasetResult, FeatureTensor, Interpolation, LabelTensor, Normalization,
    ReadMode, SegDatasetError, Tensor,
};
use std::any::Any;
use std::path::{Path, PathBuf};

/// B,G,R channel means subtracted by [`Normalization::SubMean`].
pub const BGR_MEANS: [f32; 3] = [103.939, 116.779, 123.68];

/// Either an already decoded raster or a path still to be decoded.
#[derive(Debug, Clone)]
pub enum RasterInput {
    Decoded(Raster),
    Path(PathBuf),
}

impl RasterInput {
    /// Classify an arbitrary value. Rasters and path-like values (`PathBuf`, `&Path`,
    /// `String`, `&str`) are accepted; anything else is `UnsupportedInput`.
    pub fn from_value<T: Any>(value: T) -> DatasetResult<Self> {
        let type_name = std::any::type_name::<T>();
        let boxed: Box<dyn Any> = Box::new(value);
        let boxed = match boxed.downcast::<Raster>() {
            Ok(r) => return Ok(RasterInput::Decoded(*r)),
            Err(b) => b,
        };
        let boxed = match boxed.downcast::<PathBuf>() {
            Ok(p) => return Ok(RasterInput::Path(*p)),
            Err(b) => b,
        };
        let boxed = match boxed.downcast::<String>() {
            Ok(s) => return Ok(RasterInput::Path(PathBuf::from(*s))),
            Err(b) => b,
        };
        let boxed = match boxed.downcast::<&'static str>() {
            Ok(s) => return Ok(RasterInput::Path(PathBuf::from(*s))),
            Err(b) => b,
        };
        match boxed.downcast::<&'static Path>() {
            Ok(p) => Ok(RasterInput::Path(p.to_path_buf())),
            Err(_) => Err(SegDatasetError::UnsupportedInput {
                type_name: type_name.to_string(),
            }),
        }
    }

    /// Resolve to a raster, decoding from disk when needed.
    pub fn load(self, mode: ReadMode) -> DatasetResult<Raster> {
        match self {
            RasterInput::Decoded(r) => Ok(r),
            RasterInput::Path(p) => {
                if !p.is_file() {
                    return Err(SegDatasetError::MissingFile { path: p });
                }
                decode(&p, mode)
            }
        }
    }
}

impl From<Raster> for RasterInput {
    fn from(r: Raster) -> Self {
        RasterInput::Decoded(r)
    }
}

impl From<PathBuf> for RasterInput {
    fn from(p: PathBuf) -> Self {
        RasterInput::Path(p)
    }
}

impl From<&Path> for RasterInput {
    fn from(p: &Path) -> Self {
        RasterInput::Path(p.to_path_buf())
    }
}

impl From<&str> for RasterInput {
    fn from(p: &str) -> Self {
        RasterInput::Path(PathBuf::from(p))
    }
}

/// Resize to `width x height` with bilinear filtering and normalize.
///
/// Output shape is `[height, width, channels]`, or `[channels, height, width]`
/// for [`ChannelOrder::ChannelsFirst`].
pub fn image_to_tensor(
    input: impl Into<RasterInput>,
    width: u32,
    height: u32,
    norm: Normalization,
    order: ChannelOrder,
    read_mode: ReadMode,
) -> DatasetResult<FeatureTensor> {
    let raster = input
        .into()
        .load(read_mode)?
        .resize(width, height, Interpolation::Bilinear)?;
    let (h, w, c) = raster.shape();
    let mut data: Vec<f32> = raster.data().iter().map(|&v| v as f32).collect();
    match norm {
        Normalization::SubAndDivide => data.iter_mut().for_each(|v| *v = *v / 127.5 - 1.0),
        Normalization::Divide => data.iter_mut().for_each(|v| *v /= 255.0),
        Normalization::SubMean => {
            let n = c.min(BGR_MEANS.len());
            for px in data.chunks_exact_mut(c) {
                for (v, mean) in px[..n].iter_mut().zip(BGR_MEANS) {
                    *v -= mean;
                }
                px.reverse();
            }
        }
    }
    match order {
        ChannelOrder::ChannelsLast => Tensor::new(vec![h, w, c], data),
        ChannelOrder::ChannelsFirst => {
            let mut planar = vec![0.0f32; data.len()];
            for (i, px) in data.chunks_exact(c).enumerate() {
                for (ch, v) in px.iter().enumerate() {
                    planar[ch * h * w + i] = *v;
                }
            }
            Tensor::new(vec![c, h, w], planar)
        }
    }
}

/// Undo [`image_to_tensor`]'s normalization on a channels-last tensor, returning
/// raw pixel values in the resized raster's channel order.
pub fn denormalize(tensor: &FeatureTensor, norm: Normalization) -> DatasetResult<Vec<f32>> {
    let [_, _, c] = tensor.shape() else {
        return Err(SegDatasetError::shape(format!(
            "expected a [H, W, C] tensor, got {:?}",
            tensor.shape()
        )));
    };
    let c = *c;
    let mut data = tensor.data().to_vec();
    match norm {
        Normalization::SubAndDivide => data.iter_mut().for_each(|v| *v = (*v + 1.0) * 127.5),
        Normalization::Divide => data.iter_mut().for_each(|v| *v *= 255.0),
        Normalization::SubMean => {
            let n = c.min(BGR_MEANS.len());
            for px in data.chunks_exact_mut(c) {
                px.reverse();
                for (v, mean) in px[..n].iter_mut().zip(BGR_MEANS) {
                    *v += mean;
                }
            }
        }
    }
    Ok(data)
}

/// One-hot encode the first channel of a label raster.
///
/// The raster is resized with nearest-neighbour sampling. Output shape is
/// `[height, width, n_classes]`, or `[height * width, n_classes]` when `flatten`.
///
/// A pixel whose value is `>= n_classes` gets no active channel at all: its
/// one-hot vector is all zeros. This is neither clamped nor reported as an error;
/// run the verifier to catch such labels.
pub fn label_to_tensor(
    input: impl Into<RasterInput>,
    n_classes: usize,
    width: u32,
    height: u32,
    flatten: bool,
) -> DatasetResult<LabelTensor> {
    let plane = input
        .into()
        .load(ReadMode::Color)?
        .resize(width, height, Interpolation::Nearest)?
        .channel(0)?;
    let (h, w, _) = plane.shape();
    let mut data = vec![0.0f32; h * w * n_classes];
    for (i, &class) in plane.data().iter().enumerate() {
        let class = class as usize;
        if class < n_classes {
            data[i * n_classes + class] = 1.0;
        }
    }
    if flatten {
        Tensor::new(vec![h * w, n_classes], data)
    } else {
        Tensor::new(vec![h, w, n_classes], data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raster() -> Raster {
        Raster::new(2, 1, 3, vec![0, 128, 255, 10, 20, 30]).unwrap()
    }

    #[test]
    fn unsupported_input_names_type() {
        let err = RasterInput::from_value(42u32).unwrap_err();
        match err {
            SegDatasetError::UnsupportedInput { type_name } => assert_eq!(type_name, "u32"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            RasterInput::from_value("a.png"),
            Ok(RasterInput::Path(_))
        ));
        assert!(matches!(
            RasterInput::from_value(sample_raster()),
            Ok(RasterInput::Decoded(_))
        ));
    }

    #[test]
    fn missing_path_is_reported() {
        let err = image_to_tensor(
            "/no/such/image.png",
            2,
            2,
            Normalization::Divide,
            ChannelOrder::ChannelsLast,
            ReadMode::Color,
        )
        .unwrap_err();
        assert!(matches!(err, SegDatasetError::MissingFile { .. }));
    }

    #[test]
    fn sub_mean_flips_channels() {
        let t = image_to_tensor(
            sample_raster(),
            2,
            1,
            Normalization::SubMean,
            ChannelOrder::ChannelsLast,
            ReadMode::Color,
        )
        .unwrap();
        assert_eq!(t.shape(), &[1, 2, 3]);
        let px0 = &t.data()[..3];
        assert!((px0[0] - (255.0 - 123.68)).abs() < 1e-4);
        assert!((px0[1] - (128.0 - 116.779)).abs() < 1e-4);
        assert!((px0[2] - (0.0 - 103.939)).abs() < 1e-4);
    }

    #[test]
    fn normalizations_invert_to_resized_raster() {
        let raster = Raster::new(
            4,
            4,
            3,
            (0..48).map(|v| (v * 5) as u8).collect(),
        )
        .unwrap();
        let resized = raster.resize(3, 2, Interpolation::Bilinear).unwrap();
        for norm in [
            Normalization::SubAndDivide,
            Normalization::SubMean,
            Normalization::Divide,
        ] {
            let t = image_to_tensor(
                raster.clone(),
                3,
                2,
                norm,
                ChannelOrder::ChannelsLast,
                ReadMode::Color,
            )
            .unwrap();
            let restored = denormalize(&t, norm).unwrap();
            for (a, b) in restored.iter().zip(resized.data()) {
                assert!((a - *b as f32).abs() < 1e-3, "{norm:?}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn channels_first_moves_channel_axis() {
        let t = image_to_tensor(
            sample_raster(),
            2,
            1,
            Normalization::Divide,
            ChannelOrder::ChannelsFirst,
            ReadMode::Color,
        )
        .unwrap();
        assert_eq!(t.shape(), &[3, 1, 2]);
        assert_eq!(t.get(&[2, 0, 0]), Some(1.0));
        assert_eq!(t.get(&[0, 0, 1]), Some(10.0 / 255.0));
    }

    #[test]
    fn out_of_range_class_leaves_pixel_all_zero() {
        let label = Raster::new(3, 1, 1, vec![0, 2, 5]).unwrap();
        let t = label_to_tensor(label, 3, 3, 1, false).unwrap();
        assert_eq!(t.shape(), &[1, 3, 3]);
        assert_eq!(t.get(&[0, 0, 0]), Some(1.0));
        assert_eq!(t.get(&[0, 1, 2]), Some(1.0));
        let oob: f32 = (0..3).filter_map(|c| t.get(&[0, 2, c])).sum();
        assert_eq!(oob, 0.0);

        let label = Raster::new(3, 1, 1, vec![0, 2, 5]).unwrap();
        let flat = label_to_tensor(label, 3, 3, 1, true).unwrap();
        assert_eq!(flat.shape(), &[3, 3]);
        assert_eq!(flat.data(), t.data());
    }
}

//! Conversion of generated batches into burn tensors.

use crate::generator::Batch;
use crate::types::{DatasetResult, SegDatasetError, Tensor as DenseTensor};
use burn::tensor::{backend::Backend, Tensor, TensorData};

pub struct BurnSegBatch<B: Backend> {
    /// `[batch, height, width, channels]`
    pub images: Tensor<B, 4>,
    /// `[batch, height, width, n_classes]`, absent in label-free mode.
    pub labels: Option<Tensor<B, 4>>,
}

fn to_burn_4d<B: Backend>(t: &DenseTensor, device: &B::Device) -> DatasetResult<Tensor<B, 4>> {
    let shape: [usize; 4] = t.shape().try_into().map_err(|_| {
        SegDatasetError::Shape {
            msg: format!("expected a 4-d batch tensor, got shape {:?}", t.shape()),
        }
    })?;
    Ok(Tensor::<B, 4>::from_data(
        TensorData::new(t.data().to_vec(), shape),
        device,
    ))
}

impl Batch {
    pub fn to_burn<B: Backend>(&self, device: &B::Device) -> DatasetResult<BurnSegBatch<B>> {
        let images = to_burn_4d::<B>(&self.images, device)?;
        let labels = self
            .labels
            .as_ref()
            .map(|l| to_burn_4d::<B>(l, device))
            .transpose()?;
        Ok(BurnSegBatch { images, labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn batch_shapes_survive_conversion() {
        let images = DenseTensor::new(vec![2, 1, 1, 3], vec![0.0; 6]).unwrap();
        let labels = DenseTensor::new(vec![2, 1, 1, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let batch = Batch {
            images,
            labels: Some(labels),
        };
        let device = Default::default();
        let burn = batch.to_burn::<NdArray<f32>>(&device).unwrap();
        assert_eq!(burn.images.dims(), [2, 1, 1, 3]);
        assert_eq!(burn.labels.map(|l| l.dims()), Some([2, 1, 1, 2]));
    }
}

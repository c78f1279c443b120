//! Deterministic class colours for visualising label planes.

use crate::raster::Raster;
use crate::types::DatasetResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// RGB colour for a class index. Pure: the same index always maps to the same colour.
pub fn class_color(class: usize) -> [u8; 3] {
    let mut rng = StdRng::seed_from_u64(class as u64);
    [rng.random(), rng.random(), rng.random()]
}

/// Paint the first channel of `label` with [`class_color`], producing a 3-channel
/// raster in B,G,R order (so it can be saved with `Raster::to_dynamic`).
pub fn colorize_label(label: &Raster) -> DatasetResult<Raster> {
    let plane = label.channel(0)?;
    let mut data = Vec::with_capacity(plane.data().len() * 3);
    for &class in plane.data() {
        let [r, g, b] = class_color(class as usize);
        data.extend_from_slice(&[b, g, r]);
    }
    Raster::new(label.width(), label.height(), 3, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colours_are_stable_per_class() {
        assert_eq!(class_color(3), class_color(3));
        assert_ne!(class_color(0), class_color(1));
    }

    #[test]
    fn colorize_maps_each_pixel() {
        let label = Raster::new(2, 1, 1, vec![1, 1]).unwrap();
        let rgb = colorize_label(&label).unwrap();
        assert_eq!(rgb.shape(), (1, 2, 3));
        let [r, _, b] = class_color(1);
        assert_eq!(rgb.get(1, 0, 0), b);
        assert_eq!(rgb.get(1, 0, 2), r);
    }
}

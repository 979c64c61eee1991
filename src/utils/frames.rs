//! Padding and resampling along a frame axis
//!
//! The helpers are written once against [`FrameAxis`], which is implemented
//! for burn tensors of any rank and for `ndarray::ArrayD<f32>`.

use crate::error::{Error, Result};
use crate::tensor::index_tensor;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use std::ops::Range;

/// Containers that can be cut and joined along an axis
pub trait FrameAxis: Sized {
    fn ndim(&self) -> usize;

    fn axis_len(&self, axis: usize) -> usize;

    fn take_range(&self, axis: usize, range: Range<usize>) -> Self;

    fn take_indices(&self, axis: usize, indices: &[usize]) -> Self;

    fn concat(parts: Vec<Self>, axis: usize) -> Result<Self>;

    /// Same shape as `self` except `len` entries of `value` along `axis`
    fn filled(&self, axis: usize, len: usize, value: f32) -> Self;
}

impl<B: Backend, const D: usize> FrameAxis for Tensor<B, D> {
    fn ndim(&self) -> usize {
        D
    }

    fn axis_len(&self, axis: usize) -> usize {
        self.dims()[axis]
    }

    fn take_range(&self, axis: usize, range: Range<usize>) -> Self {
        self.clone().narrow(axis, range.start, range.len())
    }

    fn take_indices(&self, axis: usize, indices: &[usize]) -> Self {
        self.clone()
            .select(axis, index_tensor::<B>(indices, &self.device()))
    }

    fn concat(parts: Vec<Self>, axis: usize) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::ShapeMismatch("nothing to concatenate".to_string()));
        }
        Ok(Tensor::cat(parts, axis))
    }

    fn filled(&self, axis: usize, len: usize, value: f32) -> Self {
        let mut dims = self.dims();
        dims[axis] = len;
        Tensor::full(dims, value, &self.device())
    }
}

impl FrameAxis for ArrayD<f32> {
    fn ndim(&self) -> usize {
        self.shape().len()
    }

    fn axis_len(&self, axis: usize) -> usize {
        self.len_of(Axis(axis))
    }

    fn take_range(&self, axis: usize, range: Range<usize>) -> Self {
        self.slice_axis(Axis(axis), Slice::from(range)).to_owned()
    }

    fn take_indices(&self, axis: usize, indices: &[usize]) -> Self {
        self.select(Axis(axis), indices)
    }

    fn concat(parts: Vec<Self>, axis: usize) -> Result<Self> {
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        Ok(ndarray::concatenate(Axis(axis), &views)?)
    }

    fn filled(&self, axis: usize, len: usize, value: f32) -> Self {
        let mut shape = self.shape().to_vec();
        shape[axis] = len;
        ArrayD::from_elem(IxDyn(&shape), value)
    }
}

/// Frames are the second to last axis: `(..., frames, hexals)`
pub fn frame_axis<T: FrameAxis>(x: &T) -> Result<usize> {
    x.ndim()
        .checked_sub(2)
        .ok_or_else(|| Error::ShapeMismatch("expected (..., frames, hexals)".to_string()))
}

/// Where padding frames are inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadSide {
    #[default]
    End,
    Start,
}

/// What padding frames contain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadMode {
    /// A constant value
    Value(f32),
    /// Copies of the last frame
    Continue,
}

/// Pads the frame axis to `int(t_stim / dt)` frames; longer inputs are unchanged.
pub fn pad<T: FrameAxis>(x: T, t_stim: f64, dt: f64, side: PadSide, mode: PadMode) -> Result<T> {
    let axis = frame_axis(&x)?;
    let target = (t_stim / dt) as usize;
    let n_frames = x.axis_len(axis);
    if target <= n_frames {
        return Ok(x);
    }
    let diff = target - n_frames;
    match (mode, side) {
        (PadMode::Continue, _) => repeat_last(x, axis, diff),
        (PadMode::Value(fill), PadSide::End) => {
            let padding = x.filled(axis, diff, fill);
            T::concat(vec![x, padding], axis)
        }
        (PadMode::Value(fill), PadSide::Start) => {
            let padding = x.filled(axis, diff, fill);
            T::concat(vec![padding, x], axis)
        }
    }
}

/// Keeps the first `int(t_stim / dt)` frames
pub fn crop<T: FrameAxis>(x: T, t_stim: f64, dt: f64) -> Result<T> {
    let axis = frame_axis(&x)?;
    let target = (t_stim / dt) as usize;
    if target >= x.axis_len(axis) {
        return Ok(x);
    }
    Ok(x.take_range(axis, 0..target))
}

/// Appends `n_repeats` copies of the last entry along `axis`
pub fn repeat_last<T: FrameAxis>(x: T, axis: usize, n_repeats: usize) -> Result<T> {
    let len = x.axis_len(axis);
    if len == 0 {
        return Err(Error::ShapeMismatch("cannot repeat an empty axis".to_string()));
    }
    let repeated = x.take_indices(axis, &vec![len - 1; n_repeats]);
    T::concat(vec![x, repeated], axis)
}

/// Stretches `x` along `axis` to `int(t_stim / dt)` entries by nearest
/// lower index on an even grid.
pub fn resample<T: FrameAxis>(x: &T, t_stim: f64, dt: f64, axis: usize) -> T {
    let n = x.axis_len(axis);
    let m = (t_stim / dt) as usize;
    let indices: Vec<usize> = match m {
        0 => Vec::new(),
        1 => vec![0],
        _ => (0..m)
            .map(|i| (i as f64 * n.saturating_sub(1) as f64 / (m - 1) as f64) as usize)
            .collect(),
    };
    x.take_indices(axis, &indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::to_array;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type Backend = NdArray<f32>;

    fn frames() -> ArrayD<f32> {
        // (frames=2, hexals=3)
        ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0., 1., 2., 3., 4., 5.]).unwrap()
    }

    #[test]
    fn test_pad_value_and_continue() {
        let padded = pad(frames(), 2.0, 0.5, PadSide::End, PadMode::Value(9.0)).unwrap();
        assert_eq!(padded.shape(), &[4, 3]);
        assert_eq!(padded[IxDyn(&[3, 0])], 9.0);

        let padded = pad(frames(), 1.5, 0.5, PadSide::Start, PadMode::Value(-1.0)).unwrap();
        assert_eq!(padded[IxDyn(&[0, 2])], -1.0);
        assert_eq!(padded[IxDyn(&[1, 0])], 0.0);

        let continued = pad(frames(), 2.0, 0.5, PadSide::End, PadMode::Continue).unwrap();
        let last: Vec<f32> = continued.index_axis(Axis(0), 3).iter().copied().collect();
        assert_eq!(last, vec![3., 4., 5.]);
    }

    #[test]
    fn test_pad_keeps_longer_input() {
        let same = pad(frames(), 0.5, 0.5, PadSide::End, PadMode::Value(0.0)).unwrap();
        assert_eq!(same, frames());
    }

    #[test]
    fn test_crop() {
        let cropped = crop(frames(), 0.5, 0.5).unwrap();
        assert_eq!(cropped.shape(), &[1, 3]);
        assert_eq!(crop(frames(), 5.0, 0.5).unwrap(), frames());
    }

    #[test]
    fn test_tensor_matches_array() {
        let device = Default::default();
        let tensor = Tensor::<Backend, 2>::from_data(
            TensorData::new(vec![0f32, 1., 2., 3., 4., 5.], [2, 3]),
            &device,
        );
        let padded = pad(tensor, 2.0, 0.5, PadSide::End, PadMode::Continue).unwrap();
        let expected = pad(frames(), 2.0, 0.5, PadSide::End, PadMode::Continue).unwrap();
        assert_eq!(to_array(padded).unwrap(), expected);
    }

    #[test]
    fn test_resample_stretches_conditions() {
        // three conditions stretched over five frames
        let conditions = ArrayD::from_shape_vec(IxDyn(&[3, 1]), vec![0., 1., 2.]).unwrap();
        let frames = resample(&conditions, 2.5, 0.5, 0);
        assert_eq!(frames.iter().copied().collect::<Vec<_>>(), vec![0., 0., 1., 1., 2.]);
    }
}

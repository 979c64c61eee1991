//! Segment-wise reduction along the last axis

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Reduction applied within each segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceMode {
    Sum,
    Mean,
}

/// Reduce `src` of shape `[..., M]` onto `[..., n_groups]`.
///
/// Item `m` contributes to group `index[m]`. Groups that receive no item are 0.
pub fn scatter_reduce<B: Backend, const D: usize>(
    src: Tensor<B, D>,
    index: Tensor<B, 1, Int>,
    n_groups: usize,
    mode: ReduceMode,
) -> Tensor<B, D> {
    let dims = src.dims();
    let device = src.device();
    let index = broadcast(index, dims);

    let mut shape = dims;
    shape[D - 1] = n_groups;

    let sum = Tensor::<B, D>::zeros(shape, &device).scatter(D - 1, index.clone(), src.clone());
    match mode {
        ReduceMode::Sum => sum,
        ReduceMode::Mean => {
            let counts =
                Tensor::<B, D>::zeros(shape, &device).scatter(D - 1, index, src.ones_like());
            sum.div(counts.clamp_min(1.0))
        }
    }
}

pub fn scatter_add<B: Backend, const D: usize>(
    src: Tensor<B, D>,
    index: Tensor<B, 1, Int>,
    n_groups: usize,
) -> Tensor<B, D> {
    scatter_reduce(src, index, n_groups, ReduceMode::Sum)
}

pub fn scatter_mean<B: Backend, const D: usize>(
    src: Tensor<B, D>,
    index: Tensor<B, 1, Int>,
    n_groups: usize,
) -> Tensor<B, D> {
    scatter_reduce(src, index, n_groups, ReduceMode::Mean)
}

/// Expand a `[M]` index over the leading axes of `dims`
fn broadcast<B: Backend, const D: usize>(
    index: Tensor<B, 1, Int>,
    dims: [usize; D],
) -> Tensor<B, D, Int> {
    let mut shape = [1usize; D];
    shape[D - 1] = dims[D - 1];
    index.reshape(shape).expand(dims)
}

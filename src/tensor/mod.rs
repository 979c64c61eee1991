//! # Shared-parameter tensors
//!
//! Parameters of a connectome model are rarely unique per node or per edge:
//! all nodes of one cell type share a time constant, all edges between two
//! cell types at the same offset share a synapse strength. This module stores
//! such parameters compactly and expands them on demand.
//!
//! | Type | Role |
//! |------|------|
//! | [`RefTensor`] | `(values, indices)` pair, expands `[..., G]` into `[..., M]` |
//! | [`AutoDeref`] | per-step namespace that dereferences and caches `RefTensor` entries |
//! | [`scatter_reduce`] | the inverse direction: reduce `[..., M]` back onto `[..., G]` |
//!
//! ## Axis Convention
//!
//! The grouped axis is always the **last** axis. A `RefTensor<B, 2>` with
//! values `[batch, G]` and `M` indices dereferences to `[batch, M]`.
//!
//! ```ignore
//! use flyvis::tensor::{AutoDeref, RefTensor};
//!
//! let (_, index) = RefTensor::<Backend>::get_ref_indices(&nodes, &["type"], Aggregate::First, &device)?;
//! let mut params = AutoDeref::new();
//! params.set("tau", RefTensor::new(tau_per_type, index));
//! let tau = params.tensor("tau")?; // [n_nodes], cached for the rest of the step
//! ```

pub mod auto_deref;
pub mod ref_tensor;
pub mod scatter;

pub use auto_deref::{AutoDeref, Field, Value};
pub use ref_tensor::RefTensor;
pub use scatter::{scatter_add, scatter_mean, scatter_reduce, ReduceMode};

use crate::error::{Error, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use ndarray::{ArrayD, IxDyn};

/// Build an integer index tensor from node positions
pub fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
    Tensor::from_data(TensorData::new(data, [indices.len()]), device)
}

/// Read an integer index tensor back into positions
pub fn to_indices<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let values = tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| Error::Tensor(format!("{:?}", e)))?;
    Ok(values.into_iter().map(|i| i as usize).collect())
}

/// Copy a float tensor into a dynamically shaped ndarray
pub fn to_array<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<ArrayD<f32>> {
    let shape = tensor.dims().to_vec();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| Error::Tensor(format!("{:?}", e)))?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
}

/// Copy an ndarray into a float tensor of rank `D`
pub fn from_array<B: Backend, const D: usize>(
    array: &ArrayD<f32>,
    device: &B::Device,
) -> Result<Tensor<B, D>> {
    if array.ndim() != D {
        return Err(Error::ShapeMismatch(format!(
            "expected rank {}, got shape {:?}",
            D,
            array.shape()
        )));
    }
    let data: Vec<f32> = array.iter().copied().collect();
    Ok(Tensor::from_data(TensorData::new(data, array.shape().to_vec()), device))
}

//! Reference tensors for shared parameters

use super::{index_tensor, scatter};
use crate::error::Result;
use crate::table::{Aggregate, Table};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Values and indices stored side by side.
///
/// `values` holds one entry per parameter group along its last axis (`G`),
/// `indices` maps each of `M` logical items to its group. Every index must lie
/// in `[0, G)`; out-of-range indices are a precondition violation and panic
/// inside the backend gather.
#[derive(Debug, Clone)]
pub struct RefTensor<B: Backend, const D: usize = 1> {
    /// Group values, shape `[..., G]`
    pub values: Tensor<B, D>,
    /// Group of each item, shape `[M]`
    pub indices: Tensor<B, 1, Int>,
}

impl<B: Backend, const D: usize> RefTensor<B, D> {
    pub fn new(values: Tensor<B, D>, indices: Tensor<B, 1, Int>) -> Self {
        Self { values, indices }
    }

    /// Index the values with the stored indices along the last axis.
    ///
    /// Returns a fresh tensor of shape `[..., M]` on every call.
    pub fn deref(&self) -> Tensor<B, D> {
        self.values.clone().select(D - 1, self.indices.clone())
    }

    /// Number of parameter groups (`G`)
    pub fn n_groups(&self) -> usize {
        self.values.dims()[D - 1]
    }

    /// Number of dereferenced items (`M`)
    pub fn n_items(&self) -> usize {
        self.indices.dims()[0]
    }

    /// Copy with gradient tracking on the values severed; indices are shared
    pub fn detach(&self) -> Self {
        Self {
            values: self.values.clone().detach(),
            indices: self.indices.clone(),
        }
    }

    /// Returns the grouped table and the reference indices for shared parameters.
    ///
    /// Groups appear in the order in which they first occur in `table`; row 0 of
    /// the grouped table represents the group of `table`'s row 0.
    pub fn get_ref_indices(
        table: &Table,
        group_by: &[&str],
        aggregate: Aggregate,
        device: &B::Device,
    ) -> Result<(Table, Tensor<B, 1, Int>)> {
        let (grouped, indices) = table.group_by(group_by, aggregate)?;
        Ok((grouped, index_tensor::<B>(&indices, device)))
    }

    /// Mean of `tensor` over items that share a group
    pub fn scatter_mean(
        tensor: Tensor<B, D>,
        indices: Tensor<B, 1, Int>,
        n_groups: usize,
    ) -> Tensor<B, D> {
        scatter::scatter_mean(tensor, indices, n_groups)
    }

    /// Sum of `tensor` over items that share a group
    pub fn scatter_add(
        tensor: Tensor<B, D>,
        indices: Tensor<B, 1, Int>,
        n_groups: usize,
    ) -> Tensor<B, D> {
        scatter::scatter_add(tensor, indices, n_groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use crate::tensor::to_array;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type Backend = NdArray<f32>;

    #[test]
    fn test_deref_gathers_last_axis() {
        let device = Default::default();
        let values = Tensor::<Backend, 2>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 10.0, 20.0], [2, 2]),
            &device,
        );
        let indices = index_tensor::<Backend>(&[1, 0, 1], &device);
        let reft = RefTensor::new(values, indices);

        assert_eq!(reft.n_groups(), 2);
        assert_eq!(reft.n_items(), 3);

        let out = to_array(reft.deref()).unwrap();
        assert_eq!(out.shape(), &[2, 3]);
        assert_eq!(
            out.iter().copied().collect::<Vec<_>>(),
            vec![2.0, 1.0, 2.0, 20.0, 10.0, 20.0]
        );
    }

    #[test]
    fn test_get_ref_indices_reproduces_representatives() {
        let device = Default::default();
        let table = Table::new()
            .with_column(
                "type",
                Column::Str(vec!["T4a".into(), "Mi1".into(), "T4a".into(), "Tm3".into()]),
            )
            .unwrap()
            .with_column("bias", Column::Float(vec![0.5, -1.0, 0.7, 2.0]))
            .unwrap();

        let (grouped, indices) =
            RefTensor::<Backend>::get_ref_indices(&table, &["type"], Aggregate::First, &device)
                .unwrap();
        let Column::Float(bias) = grouped.column("bias").unwrap().clone() else {
            panic!("bias is a float column");
        };
        let values: Vec<f32> = bias.iter().map(|&b| b as f32).collect();
        let values = Tensor::<Backend, 1>::from_data(TensorData::new(values, [3]), &device);

        let out = to_array(RefTensor::new(values, indices).deref()).unwrap();
        assert_eq!(out.iter().copied().collect::<Vec<_>>(), vec![0.5, -1.0, 0.5, 2.0]);
    }
}

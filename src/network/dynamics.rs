use crate::error::Result;
use crate::tensor::AutoDeref;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde_json::Value;

/// Per-step evaluator of the network dynamics
///
/// States are `[samples, nodes]`, currents `[samples, edges]`. All methods
/// receive the namespace returned by [`param_api`](Self::param_api) for the
/// current step.
pub trait Dynamics<B: Backend> {
    /// Fresh parameter namespace for one integration step
    fn param_api(&self) -> AutoDeref<B>;

    /// State before any input was seen
    fn initial_state(&self, params: &AutoDeref<B>, n_samples: usize) -> Result<Tensor<B, 2>>;

    /// Advance `state` by `dt` seconds under external `input`
    fn step(
        &self,
        params: &AutoDeref<B>,
        state: Tensor<B, 2>,
        input: Tensor<B, 2>,
        dt: f64,
    ) -> Result<Tensor<B, 2>>;

    /// Synaptic current through every edge at `state`
    fn currents(&self, params: &AutoDeref<B>, state: Tensor<B, 2>) -> Result<Tensor<B, 2>>;

    /// Serializable description of the model
    fn config(&self) -> Value;
}

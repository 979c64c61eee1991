use super::{Dynamics, Network};
use crate::cache::Memory;
use crate::connectome::ConnectomeIndex;
use crate::error::Result;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Identity of a trained network at one checkpoint
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId {
    pub network: String,
    pub checkpoint: String,
}

impl CheckpointId {
    pub fn new(network: impl Into<String>, checkpoint: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            checkpoint: checkpoint.into(),
        }
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.checkpoint)
    }
}

/// Handle to a trained network
///
/// Allocating a network ([`init`](Self::init)) and loading a checkpoint into
/// it ([`recover`](Self::recover)) are separate, so one allocation can be
/// reused for every handle of an ensemble.
pub trait NetworkView<B: Backend> {
    type Dynamics: Dynamics<B>;

    fn name(&self) -> &str;

    /// The checkpoint results are computed from
    fn checkpoint(&self) -> CheckpointId;

    fn connectome(&self) -> Arc<dyn ConnectomeIndex>;

    /// Cache for results of this network
    fn memory(&self) -> &Memory;

    /// Allocates an untrained network
    fn init(&self) -> Result<Network<B, Self::Dynamics>>;

    /// Loads the checkpoint parameters into `network`
    fn recover(&self, network: &mut Network<B, Self::Dynamics>) -> Result<()>;

    fn validation_loss(&self) -> Result<f64>;

    fn config(&self) -> Value;

    /// Recovers the checkpoint into `network`, allocating one if needed
    fn checkpointed_network(
        &self,
        network: Option<Network<B, Self::Dynamics>>,
    ) -> Result<Network<B, Self::Dynamics>> {
        let mut network = match network {
            Some(network) => network,
            None => {
                tracing::info!(network = self.name(), "initializing network");
                self.init()?
            }
        };
        self.recover(&mut network)?;
        Ok(network)
    }
}

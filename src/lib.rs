//! # flyvis - connectome model simulation and analysis (Rust)
//!
//! Core of a connectome-constrained visual system model built on the Burn
//! framework: stimulus injection into cell-type-addressed node vectors,
//! compact shared parameters that dereference lazily, and memoized response
//! computation over datasets and ensembles of trained networks.
//!
//! ## Features
//!
//! - **Stimulus**: additive `(samples, frames, nodes)` buffer addressed by cell type
//! - **RefTensor / AutoDeref**: shared parameters expanded on demand, cached per step
//! - **Scatter-reduce**: segment sums and means along the grouped axis
//! - **Network**: simulation driver around an opaque dynamics evaluator
//! - **Analysis**: cached responses and currents as labeled arrays
//! - **Ensemble**: ranked collections of trained networks with scoped reordering
//!
//! ## Quick Start
//!
//! ```rust
//! use flyvis::prelude::*;
//!
//! // two photoreceptors feeding one L1 cell
//! let connectome = Connectome::new(
//!     vec!["R1".into(), "R1".into(), "L1".into()],
//!     vec![1, 0, 0],
//!     vec![0, 0, 0],
//!     &[(0, 2), (1, 2)],
//!     vec!["R1".into()],
//! )?;
//!
//! assert_eq!(connectome.central_index("R1"), Some(1));
//! assert_eq!(connectome.central_cells_index(), vec![1, 2]);
//! # Ok::<(), flyvis::Error>(())
//! ```
//!
//! ## Stimulus Injection
//!
//! ```ignore
//! use flyvis::prelude::*;
//!
//! let mut stim = Stimulus::<Backend>::new(4, 100, &connectome, &device)?;
//! stim.add_input(video, None, None)?; // [4, 100, 1, n_hexals]
//! stim.suppress_layer("L1")?;
//! let (activity, _) = network.forward(stim.get()?.clone(), 0.01, None)?;
//! ```

pub mod analysis;
pub mod cache;
pub mod connectome;
pub mod dataset;
pub mod ensemble;
pub mod error;
pub mod labeled;
pub mod network;
pub mod stimulus;
pub mod table;
pub mod tensor;
pub mod utils;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::analysis::{generic_currents, generic_responses, CellIndex, Preset};
    pub use crate::cache::{CacheConfig, CacheKey, Memory};
    pub use crate::connectome::{Connectome, ConnectomeIndex, ReceptiveField};
    pub use crate::dataset::{DatasetConfig, StimulusDataset};
    pub use crate::ensemble::Ensemble;
    pub use crate::error::{Error, Result};
    pub use crate::labeled::{LabeledArray, LabeledSet};
    pub use crate::network::{CheckpointId, Dynamics, Network, NetworkView, ResponseOptions};
    pub use crate::stimulus::{PreStim, Stimulus};
    pub use crate::table::{Aggregate, Column, Table};
    pub use crate::tensor::{AutoDeref, RefTensor, Value};
}

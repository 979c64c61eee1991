//! # Connectome Indexing
//!
//! The simulation state of one sample is a flat vector with one entry per
//! node. [`ConnectomeIndex`] translates cell types into positions in that
//! vector; everything that writes stimuli or reads responses by cell type goes
//! through it.
//!
//! | Index | Meaning |
//! |-------|---------|
//! | `layer_index(t)` | positions of every node of type `t` |
//! | `central_index(t)` | the single node of `t` at the center of the visual field |
//! | `input_types()` | types driven by the external video, in a fixed order |
//!
//! [`Connectome`] is a concrete, serializable implementation built from node
//! and edge lists.

mod base;
mod receptive_field;

pub use base::{Connectome, ConnectomeIndex, Edge};
pub use receptive_field::ReceptiveField;

use serde::{Deserialize, Serialize};

/// Configuration struct for serialization/deserialization of connectomes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectomeConfig {
    /// Cell type of every node
    pub node_types: Vec<String>,
    /// Hexagonal `u` coordinate of every node
    pub u: Vec<i32>,
    /// Hexagonal `v` coordinate of every node
    pub v: Vec<i32>,
    /// `(source, target)` node positions
    pub edges: Vec<(usize, usize)>,
    /// Types that receive the external video
    pub input_types: Vec<String>,
}

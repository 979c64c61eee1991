//! # Network Simulation
//!
//! A [`Network`] couples an opaque [`Dynamics`] evaluator with a connectome and
//! one [`Stimulus`](crate::stimulus::Stimulus) buffer, and drives it through
//! time. Trained instances are reached through [`NetworkView`] handles, which
//! know how to allocate a network and load a checkpoint into it.
//!
//! ## Simulation Flow
//!
//! ```text
//! dataset ─▶ videos [S, F, 1, H] ─▶ Stimulus [S, F, N] ─▶ step × F ─▶ activity [S, F, N]
//!                                                              └─▶ currents [S, F, E]
//! ```
//!
//! Every integration step gets a fresh parameter namespace from
//! [`Dynamics::param_api`], so dereferenced parameters are cached within a
//! step and never across steps.
//!
//! ## Initial State
//!
//! | Option | Effect |
//! |--------|--------|
//! | `t_pre > 0` | integrate a uniform grey screen for `t_pre` seconds |
//! | `t_fade_in > 0` | then ramp from black to the first frame over `t_fade_in` seconds |
//! | both zero | start from [`Dynamics::initial_state`] |

mod dynamics;
mod simulation;
mod view;

pub use dynamics::Dynamics;
pub use simulation::Network;
pub use view::{CheckpointId, NetworkView};

use serde::{Deserialize, Serialize};

/// Intensity of the grey screen used to reach a steady state
pub const GREY: f32 = 0.5;

/// Timing and batching of a response computation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseOptions {
    /// Integration step; the dataset's own `dt` when `None`
    pub dt: Option<f64>,
    /// Seconds of grey screen integrated before each batch
    pub t_pre: f64,
    /// Seconds of fade-in from black to the first frame
    pub t_fade_in: f64,
    /// Samples simulated together
    pub batch_size: usize,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            dt: None,
            t_pre: 0.0,
            t_fade_in: 0.0,
            batch_size: 4,
        }
    }
}

impl ResponseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = Some(dt);
        self
    }

    pub fn with_t_pre(mut self, t_pre: f64) -> Self {
        self.t_pre = t_pre;
        self
    }

    pub fn with_t_fade_in(mut self, t_fade_in: f64) -> Self {
        self.t_fade_in = t_fade_in;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

use super::{Dynamics, ResponseOptions, GREY};
use crate::connectome::ConnectomeIndex;
use crate::dataset::StimulusDataset;
use crate::error::{Error, Result};
use crate::stimulus::{PreStim, Stimulus};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde_json::Value;
use std::sync::Arc;

/// Simulation driver around a [`Dynamics`] evaluator
pub struct Network<B: Backend, M: Dynamics<B>> {
    dynamics: M,
    connectome: Arc<dyn ConnectomeIndex>,
    stimulus: Stimulus<B>,
    device: B::Device,
}

impl<B: Backend, M: Dynamics<B>> Network<B, M> {
    pub fn new(
        dynamics: M,
        connectome: Arc<dyn ConnectomeIndex>,
        device: &B::Device,
    ) -> Result<Self> {
        let stimulus = Stimulus::new(1, 1, connectome.as_ref(), device)?;
        Ok(Self {
            dynamics,
            connectome,
            stimulus,
            device: device.clone(),
        })
    }

    pub fn dynamics(&self) -> &M {
        &self.dynamics
    }

    /// Mutable access for loading checkpoint parameters
    pub fn dynamics_mut(&mut self) -> &mut M {
        &mut self.dynamics
    }

    pub fn connectome(&self) -> &Arc<dyn ConnectomeIndex> {
        &self.connectome
    }

    pub fn stimulus(&self) -> &Stimulus<B> {
        &self.stimulus
    }

    pub fn stimulus_mut(&mut self) -> &mut Stimulus<B> {
        &mut self.stimulus
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn config(&self) -> Value {
        self.dynamics.config()
    }

    /// Integrates `input` of shape `[samples, frames, nodes]`.
    ///
    /// Returns the activity at every frame and the final state.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        dt: f64,
        state: Option<Tensor<B, 2>>,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 2>)> {
        let (activity, _, state) = self.integrate(input, dt, state, false)?;
        Ok((Tensor::stack(activity, 1), state))
    }

    /// Like [`forward`](Self::forward), returning per-edge currents of shape
    /// `[samples, frames, edges]` instead of the final state.
    pub fn forward_with_currents(
        &self,
        input: Tensor<B, 3>,
        dt: f64,
        state: Option<Tensor<B, 2>>,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        let (activity, currents, _) = self.integrate(input, dt, state, true)?;
        Ok((Tensor::stack(activity, 1), Tensor::stack(currents, 1)))
    }

    fn integrate(
        &self,
        input: Tensor<B, 3>,
        dt: f64,
        state: Option<Tensor<B, 2>>,
        with_currents: bool,
    ) -> Result<(Vec<Tensor<B, 2>>, Vec<Tensor<B, 2>>, Tensor<B, 2>)> {
        let [n_samples, n_frames, n_nodes] = input.dims();
        if n_frames == 0 {
            return Err(Error::ShapeMismatch("cannot integrate zero frames".to_string()));
        }
        if n_nodes != self.connectome.n_nodes() {
            return Err(Error::ShapeMismatch(format!(
                "input has {} nodes, connectome has {}",
                n_nodes,
                self.connectome.n_nodes()
            )));
        }

        let mut current_state = match state {
            Some(state) => state,
            None => {
                let params = self.dynamics.param_api();
                self.dynamics.initial_state(&params, n_samples)?
            }
        };

        let mut activity = Vec::with_capacity(n_frames);
        let mut currents = Vec::with_capacity(if with_currents { n_frames } else { 0 });

        for t in 0..n_frames {
            // input[:, t, :] -> [samples, nodes]
            let step_input = input.clone().narrow(1, t, 1).reshape([n_samples, n_nodes]);

            // parameters are dereferenced at most once per step
            let params = self.dynamics.param_api();
            current_state = self.dynamics.step(&params, current_state, step_input, dt)?;

            if with_currents {
                currents.push(self.dynamics.currents(&params, current_state.clone())?);
            }
            activity.push(current_state.clone());
        }

        Ok((activity, currents, current_state))
    }

    /// Simulates a video of shape `[samples, frames, 1, hexals]`.
    ///
    /// The stimulus buffer is rebuilt for the call and released afterwards.
    pub fn simulate(
        &mut self,
        movie: Tensor<B, 4>,
        dt: f64,
        state: Option<Tensor<B, 2>>,
    ) -> Result<Tensor<B, 3>> {
        let input = self.video_input(movie)?;
        let (activity, _) = self.forward(input, dt, state)?;
        Ok(activity)
    }

    fn video_input(&mut self, movie: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        let [n_samples, n_frames, _, _] = movie.dims();
        self.stimulus.memory_friendly(|stim| {
            stim.zero(Some(n_samples), Some(n_frames));
            stim.add_input(movie, None, None)?;
            Ok::<_, Error>(stim.get()?.clone())
        })
    }

    /// State after `t_pre` seconds of grey screen, or `None` for `t_pre == 0`
    pub fn steady_state(
        &mut self,
        t_pre: f64,
        dt: f64,
        n_samples: usize,
    ) -> Result<Option<Tensor<B, 2>>> {
        let n_frames = duration_frames(t_pre, dt)?;
        if n_frames == 0 {
            return Ok(None);
        }
        tracing::debug!(t_pre, n_frames, "integrating grey screen");

        let input = self.stimulus.memory_friendly(|stim| {
            stim.zero(Some(n_samples), Some(n_frames));
            stim.add_pre_stim(PreStim::Constant(GREY), None, None)?;
            Ok::<_, Error>(stim.get()?.clone())
        })?;
        let (_, state) = self.forward(input, dt, None)?;
        Ok(Some(state))
    }

    /// Continues from `state` with a linear ramp from black to `first_frame`
    /// (`[samples, 1, 1, hexals]`) over `t_fade_in` seconds.
    pub fn fade_in_state(
        &mut self,
        t_fade_in: f64,
        dt: f64,
        first_frame: Tensor<B, 4>,
        state: Option<Tensor<B, 2>>,
    ) -> Result<Option<Tensor<B, 2>>> {
        let n_frames = duration_frames(t_fade_in, dt)?;
        if n_frames == 0 {
            return Ok(state);
        }
        let [n_samples, _, _, n_hexals] = first_frame.dims();
        let shape = [n_samples, n_frames, 1, n_hexals];

        let ramp: Vec<f32> = (1..=n_frames)
            .map(|f| f as f32 / n_frames as f32)
            .collect();
        let ramp = Tensor::<B, 4>::from_data(TensorData::new(ramp, [1, n_frames, 1, 1]), &self.device)
            .expand(shape);
        let movie = first_frame.expand(shape).mul(ramp);

        let input = self.video_input(movie)?;
        let (_, state) = self.forward(input, dt, state)?;
        Ok(Some(state))
    }

    /// Initial state for a batch according to `options`
    fn prepare_state(
        &mut self,
        movie: &Tensor<B, 4>,
        dt: f64,
        options: &ResponseOptions,
    ) -> Result<Option<Tensor<B, 2>>> {
        let [n_samples, ..] = movie.dims();
        let state = self.steady_state(options.t_pre, dt, n_samples)?;
        if options.t_fade_in > 0.0 {
            let first_frame = movie.clone().narrow(1, 0, 1);
            return self.fade_in_state(options.t_fade_in, dt, first_frame, state);
        }
        Ok(state)
    }

    /// Simulates every sample of `dataset` in batches.
    ///
    /// `sink` receives `(videos [S, F, 1, H], activity [S, F, N])` per batch,
    /// in dataset order.
    pub fn stimulus_response<D, F>(
        &mut self,
        dataset: &D,
        options: &ResponseOptions,
        mut sink: F,
    ) -> Result<()>
    where
        D: StimulusDataset<B>,
        F: FnMut(Tensor<B, 4>, Tensor<B, 3>) -> Result<()>,
    {
        let dt = options.dt.unwrap_or_else(|| dataset.dt());
        let indices: Vec<usize> = (0..dataset.len()).collect();

        for (batch, chunk) in indices.chunks(options.batch_size.max(1)).enumerate() {
            let movie = load_batch(dataset, chunk)?;
            let state = self.prepare_state(&movie, dt, options)?;
            let activity = self.simulate(movie.clone(), dt, state)?;
            tracing::debug!(batch, samples = chunk.len(), "simulated batch");
            sink(movie, activity)?;
        }
        Ok(())
    }

    /// Simulates samples one at a time, recording currents.
    ///
    /// `sink` receives `(sample index, activity [F, N], currents [F, E])`.
    /// All samples are simulated when `indices` is `None`.
    pub fn current_response<D, F>(
        &mut self,
        dataset: &D,
        options: &ResponseOptions,
        indices: Option<&[usize]>,
        mut sink: F,
    ) -> Result<()>
    where
        D: StimulusDataset<B>,
        F: FnMut(usize, Tensor<B, 2>, Tensor<B, 2>) -> Result<()>,
    {
        let dt = options.dt.unwrap_or_else(|| dataset.dt());
        let all: Vec<usize>;
        let indices = match indices {
            Some(indices) => indices,
            None => {
                all = (0..dataset.len()).collect();
                &all
            }
        };

        for &index in indices {
            let movie = load_batch(dataset, &[index])?;
            let state = self.prepare_state(&movie, dt, options)?;
            let input = self.video_input(movie)?;
            let (activity, currents) = self.forward_with_currents(input, dt, state)?;

            let [_, n_frames, n_nodes] = activity.dims();
            let [_, _, n_edges] = currents.dims();
            sink(
                index,
                activity.reshape([n_frames, n_nodes]),
                currents.reshape([n_frames, n_edges]),
            )?;
        }
        Ok(())
    }
}

/// Stacks dataset samples into `[samples, frames, 1, hexals]`
fn load_batch<B: Backend, D: StimulusDataset<B>>(
    dataset: &D,
    indices: &[usize],
) -> Result<Tensor<B, 4>> {
    let videos = indices
        .iter()
        .map(|&i| dataset.get(i))
        .collect::<Result<Vec<Tensor<B, 3>>>>()?;
    if let Some(first) = videos.first() {
        let dims = first.dims();
        if let Some(other) = videos.iter().find(|v| v.dims() != dims) {
            return Err(Error::ShapeMismatch(format!(
                "samples of one batch have shapes {:?} and {:?}",
                dims,
                other.dims()
            )));
        }
    }
    Ok(Tensor::stack(videos, 0))
}

/// Number of integration steps covering `duration` seconds
fn duration_frames(duration: f64, dt: f64) -> Result<usize> {
    if dt <= 0.0 {
        return Err(Error::InvalidConfig(format!("dt must be positive, got {}", dt)));
    }
    if duration <= 0.0 {
        return Ok(0);
    }
    Ok((duration / dt).round() as usize)
}

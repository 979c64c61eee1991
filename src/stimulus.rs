//! Neuron-specific stimulus buffer
//!
//! Maps a video onto the input cell types of a connectome and, for
//! perturbation experiments, arbitrary input onto any other cell type.
//! Every write accumulates (`+=`), so background, signal, noise and
//! ablation compose in any order.
//!
//! ```ignore
//! let mut stim = Stimulus::<Backend>::new(4, 100, &connectome, &device)?;
//! stim.add_input(video, None, None)?;          // video: [4, 100, 1, n_hexals]
//! stim.add_layer_noise("Tm1", 0.0, 0.1)?;
//! stim.suppress_center("T4a")?;
//! let buffer = stim.get()?;                    // [4, 100, n_nodes]
//! ```
//!
//! Call [`Stimulus::zero`] to clear the buffer or change its sample and frame
//! count; all injections must be re-applied afterwards.

use crate::connectome::ConnectomeIndex;
use crate::error::{Error, Result};
use crate::tensor::index_tensor;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Int, Tensor};
use std::collections::HashMap;
use std::ops::Range;

/// Input added by [`Stimulus::suppress_layer`] and [`Stimulus::suppress_center`]
pub const SUPPRESSION: f32 = -1e3;

/// Grey value(s) added to the input cells before or around a stimulus
#[derive(Debug, Clone)]
pub enum PreStim<B: Backend> {
    /// Same value at every frame
    Constant(f32),
    /// One value per frame of the target window
    PerFrame(Tensor<B, 1>),
}

/// Stimulus buffer of shape `(samples, frames, nodes)`
#[derive(Debug)]
pub struct Stimulus<B: Backend> {
    layer_index: HashMap<String, Tensor<B, 1, Int>>,
    central_index: HashMap<String, usize>,
    /// One index tensor per input type, each of length `n_hexals`
    input_index: Vec<Tensor<B, 1, Int>>,
    n_hexals: usize,
    n_samples: usize,
    n_frames: usize,
    n_nodes: usize,
    buffer: Option<Tensor<B, 3>>,
    device: B::Device,
}

impl<B: Backend> Stimulus<B> {
    /// Creates an all-zero buffer for `connectome`.
    ///
    /// Every input type must own the same number of nodes; the video is
    /// broadcast across input types.
    pub fn new(
        n_samples: usize,
        n_frames: usize,
        connectome: &dyn ConnectomeIndex,
        device: &B::Device,
    ) -> Result<Self> {
        let n_nodes = connectome.n_nodes();

        let mut layer_index = HashMap::new();
        for cell_type in connectome.unique_cell_types() {
            let nodes = connectome
                .layer_index(cell_type)
                .ok_or_else(|| Error::UnknownCellType(cell_type.clone()))?;
            check_nodes(cell_type, nodes, n_nodes)?;
            layer_index.insert(cell_type.clone(), index_tensor::<B>(nodes, device));
        }

        let mut central_index = HashMap::new();
        for cell_type in connectome.unique_cell_types() {
            if let Some(central) = connectome.central_index(cell_type) {
                check_nodes(cell_type, &[central], n_nodes)?;
                central_index.insert(cell_type.clone(), central);
            }
        }

        let input_layers = connectome.input_layer_index();
        let n_hexals = input_layers.first().map(|nodes| nodes.len()).unwrap_or(0);
        if input_layers.iter().any(|nodes| nodes.len() != n_hexals) {
            return Err(Error::ShapeMismatch(
                "input cell types must share the same number of hexals".to_string(),
            ));
        }
        let input_index = input_layers
            .iter()
            .map(|nodes| index_tensor::<B>(nodes, device))
            .collect();

        let mut stimulus = Self {
            layer_index,
            central_index,
            input_index,
            n_hexals,
            n_samples,
            n_frames,
            n_nodes,
            buffer: None,
            device: device.clone(),
        };
        stimulus.zero(None, None);
        Ok(stimulus)
    }

    /// Reset the buffer to zeros, optionally changing samples and frames.
    pub fn zero(&mut self, n_samples: Option<usize>, n_frames: Option<usize>) {
        self.n_samples = n_samples.unwrap_or(self.n_samples);
        self.n_frames = n_frames.unwrap_or(self.n_frames);
        tracing::debug!(
            n_samples = self.n_samples,
            n_frames = self.n_frames,
            n_nodes = self.n_nodes,
            "zeroing stimulus buffer"
        );
        self.buffer = Some(Tensor::zeros(
            [self.n_samples, self.n_frames, self.n_nodes],
            &self.device,
        ));
    }

    /// Adds a video to the input cells.
    ///
    /// `video` has shape `(samples, frames, 1, hexals)`. Without `start` and
    /// `stop` it must span the whole buffer; with only one of them the other is
    /// inferred from the video's frame count.
    pub fn add_input(
        &mut self,
        video: Tensor<B, 4>,
        start: Option<usize>,
        stop: Option<usize>,
    ) -> Result<()> {
        let [n_samples, n_frames, n_channels, n_hexals] = video.dims();
        if n_channels != 1 || n_hexals != self.n_hexals {
            return Err(Error::ShapeMismatch(format!(
                "video must be (samples, frames, 1, {}), got {:?}",
                self.n_hexals,
                video.dims()
            )));
        }
        self.check_samples(n_samples)?;

        let frames = match (start, stop) {
            (Some(start), Some(stop)) => start..stop,
            (Some(start), None) => start..start + n_frames,
            (None, Some(stop)) => stop.saturating_sub(n_frames)..stop,
            (None, None) => 0..self.n_frames,
        };
        self.check_window(&frames)?;
        if frames.len() != n_frames {
            return Err(Error::ShapeMismatch(format!(
                "video has {} frames, window {:?} has {}",
                n_frames,
                frames,
                frames.len()
            )));
        }

        let values = video.reshape([n_samples, n_frames, n_hexals]);
        for nodes in self.input_index.clone() {
            self.accumulate(frames.clone(), nodes, values.clone())?;
        }
        Ok(())
    }

    /// Adds grey value(s) to the input cells within `[start, stop)`.
    ///
    /// Missing bounds default to the start and end of the buffer.
    pub fn add_pre_stim(
        &mut self,
        value: PreStim<B>,
        start: Option<usize>,
        stop: Option<usize>,
    ) -> Result<()> {
        let frames = start.unwrap_or(0)..stop.unwrap_or(self.n_frames);
        self.check_window(&frames)?;
        if frames.is_empty() {
            return Ok(());
        }
        let shape = [self.n_samples, frames.len(), self.n_hexals];

        let values = match value {
            PreStim::Constant(x) => Tensor::full(shape, x, &self.device),
            PreStim::PerFrame(x) => {
                let [n] = x.dims();
                if n != frames.len() {
                    return Err(Error::ShapeMismatch(format!(
                        "{} grey values for a window of {} frames",
                        n,
                        frames.len()
                    )));
                }
                x.reshape([1, n, 1]).expand(shape)
            }
        };

        for nodes in self.input_index.clone() {
            self.accumulate(frames.clone(), nodes, values.clone())?;
        }
        Ok(())
    }

    /// Adds `x` to every node of a cell type over the full time range.
    ///
    /// `x` must broadcast to `(samples, frames, layer size)`.
    pub fn add_layer_stim(&mut self, cell_type: &str, x: Tensor<B, 3>) -> Result<()> {
        let nodes = self.layer(cell_type)?;
        let target = [self.n_samples, self.n_frames, nodes.dims()[0]];
        let values = broadcast_to(x, target)?;
        self.accumulate(0..self.n_frames, nodes, values)
    }

    /// Adds `x` of shape `(samples, frames)` to the central node of a cell type.
    pub fn add_central_stim(&mut self, cell_type: &str, x: Tensor<B, 2>) -> Result<()> {
        let node = self.central(cell_type)?;
        let [s, f] = x.dims();
        let values = broadcast_to(x.reshape([s, f, 1]), [self.n_samples, self.n_frames, 1])?;
        self.accumulate(0..self.n_frames, node, values)
    }

    /// Adds gaussian noise to every node of a cell type.
    pub fn add_layer_noise(&mut self, cell_type: &str, mean: f64, std: f64) -> Result<()> {
        let nodes = self.layer(cell_type)?;
        let noise = Tensor::random(
            [self.n_samples, self.n_frames, nodes.dims()[0]],
            Distribution::Normal(mean, std),
            &self.device,
        );
        self.accumulate(0..self.n_frames, nodes, noise)
    }

    /// Adds gaussian noise to the central node of a cell type.
    pub fn add_central_noise(&mut self, cell_type: &str, mean: f64, std: f64) -> Result<()> {
        let node = self.central(cell_type)?;
        let noise = Tensor::random(
            [self.n_samples, self.n_frames, 1],
            Distribution::Normal(mean, std),
            &self.device,
        );
        self.accumulate(0..self.n_frames, node, noise)
    }

    /// Adds [`SUPPRESSION`] to every node of a cell type.
    pub fn suppress_layer(&mut self, cell_type: &str) -> Result<()> {
        self.suppress_layer_with(cell_type, SUPPRESSION)
    }

    /// Adds a constant, typically large and negative, to every node of a cell type.
    pub fn suppress_layer_with(&mut self, cell_type: &str, value: f32) -> Result<()> {
        let nodes = self.layer(cell_type)?;
        let values = Tensor::full(
            [self.n_samples, self.n_frames, nodes.dims()[0]],
            value,
            &self.device,
        );
        self.accumulate(0..self.n_frames, nodes, values)
    }

    /// Adds [`SUPPRESSION`] to the central node of a cell type.
    pub fn suppress_center(&mut self, cell_type: &str) -> Result<()> {
        self.suppress_center_with(cell_type, SUPPRESSION)
    }

    /// Adds a constant, typically large and negative, to the central node of a cell type.
    pub fn suppress_center_with(&mut self, cell_type: &str, value: f32) -> Result<()> {
        let node = self.central(cell_type)?;
        let values = Tensor::full([self.n_samples, self.n_frames, 1], value, &self.device);
        self.accumulate(0..self.n_frames, node, values)
    }

    /// Runs `f` and releases the buffer afterwards.
    ///
    /// The buffer is not restored: writes after this scope fail with
    /// [`Error::BufferReleased`] until [`zero`](Self::zero) is called.
    pub fn memory_friendly<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let out = f(self);
        self.release();
        out
    }

    /// Drops the buffer storage
    pub fn release(&mut self) {
        tracing::debug!("releasing stimulus buffer");
        self.buffer = None;
    }

    pub fn is_released(&self) -> bool {
        self.buffer.is_none()
    }

    /// The stimulus tensor of shape `(samples, frames, nodes)`
    pub fn get(&self) -> Result<&Tensor<B, 3>> {
        self.buffer.as_ref().ok_or(Error::BufferReleased)
    }

    /// `(samples, frames, nodes)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_samples, self.n_frames, self.n_nodes)
    }

    /// Number of spatial input channels per input type
    pub fn n_hexals(&self) -> usize {
        self.n_hexals
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    fn layer(&self, cell_type: &str) -> Result<Tensor<B, 1, Int>> {
        self.layer_index
            .get(cell_type)
            .cloned()
            .ok_or_else(|| Error::UnknownCellType(cell_type.to_string()))
    }

    fn central(&self, cell_type: &str) -> Result<Tensor<B, 1, Int>> {
        self.central_index
            .get(cell_type)
            .map(|&node| index_tensor::<B>(&[node], &self.device))
            .ok_or_else(|| Error::UnknownCellType(cell_type.to_string()))
    }

    fn check_samples(&self, n_samples: usize) -> Result<()> {
        if n_samples != self.n_samples {
            return Err(Error::ShapeMismatch(format!(
                "{} samples written into a buffer of {}",
                n_samples, self.n_samples
            )));
        }
        Ok(())
    }

    fn check_window(&self, frames: &Range<usize>) -> Result<()> {
        if frames.start > frames.end || frames.end > self.n_frames {
            return Err(Error::ShapeMismatch(format!(
                "frame window {:?} outside of {} frames",
                frames, self.n_frames
            )));
        }
        Ok(())
    }

    /// `buffer[:, frames, nodes] += values`
    fn accumulate(
        &mut self,
        frames: Range<usize>,
        nodes: Tensor<B, 1, Int>,
        values: Tensor<B, 3>,
    ) -> Result<()> {
        if self.buffer.is_none() {
            return Err(Error::BufferReleased);
        }
        // empty windows are a no-op
        if frames.is_empty() {
            return Ok(());
        }
        let buffer = self.buffer.take().ok_or(Error::BufferReleased)?;
        let ranges = [0..self.n_samples, frames, 0..self.n_nodes];
        let window = buffer
            .clone()
            .slice(ranges.clone())
            .select_assign(2, nodes, values);
        self.buffer = Some(buffer.slice_assign(ranges, window));
        Ok(())
    }
}

fn check_nodes(cell_type: &str, nodes: &[usize], n_nodes: usize) -> Result<()> {
    match nodes.iter().find(|&&n| n >= n_nodes) {
        Some(n) => Err(Error::ShapeMismatch(format!(
            "node {} of '{}' outside of {} nodes",
            n, cell_type, n_nodes
        ))),
        None => Ok(()),
    }
}

/// Expand size-1 axes of `x` to `target`, rejecting any other mismatch
fn broadcast_to<B: Backend>(x: Tensor<B, 3>, target: [usize; 3]) -> Result<Tensor<B, 3>> {
    let dims = x.dims();
    if dims == target {
        return Ok(x);
    }
    if dims.iter().zip(target.iter()).any(|(&d, &t)| d != t && d != 1) {
        return Err(Error::ShapeMismatch(format!(
            "cannot broadcast {:?} to {:?}",
            dims, target
        )));
    }
    Ok(x.expand(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectome::Connectome;
    use crate::tensor::to_array;
    use burn::backend::NdArray;

    type Backend = NdArray<f32>;

    fn connectome() -> Connectome {
        Connectome::new(
            vec!["R1".into(), "R1".into(), "L1".into(), "L1".into()],
            vec![1, 0, 1, 0],
            vec![0, 0, 0, 0],
            &[(0, 2), (1, 3)],
            vec!["R1".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_zero_reshapes() {
        let device = Default::default();
        let mut stim = Stimulus::<Backend>::new(2, 3, &connectome(), &device).unwrap();
        assert_eq!(stim.shape(), (2, 3, 4));

        stim.zero(None, Some(5));
        assert_eq!(stim.shape(), (2, 5, 4));
        assert_eq!(stim.get().unwrap().dims(), [2, 5, 4]);
        let values = to_array(stim.get().unwrap().clone()).unwrap();
        assert!(values.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_memory_friendly_releases_buffer() {
        let device = Default::default();
        let mut stim = Stimulus::<Backend>::new(1, 2, &connectome(), &device).unwrap();

        let dims = stim.memory_friendly(|s| {
            s.suppress_layer("L1").unwrap();
            s.get().unwrap().dims()
        });
        assert_eq!(dims, [1, 2, 4]);
        assert!(stim.is_released());
        assert!(matches!(stim.suppress_layer("L1"), Err(Error::BufferReleased)));

        stim.zero(None, None);
        assert!(stim.suppress_layer("L1").is_ok());
    }

    #[test]
    fn test_unknown_type() {
        let device = Default::default();
        let mut stim = Stimulus::<Backend>::new(1, 2, &connectome(), &device).unwrap();
        assert!(matches!(
            stim.suppress_center("T4a"),
            Err(Error::UnknownCellType(_))
        ));
    }
}

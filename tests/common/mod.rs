//! Shared fixtures: a six-node connectome, a leaky integrator and a flash dataset
#![allow(dead_code)]

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use burn::tensor::{Int, Tensor, TensorData};
use flyvis::cache::Memory;
use flyvis::connectome::{Connectome, ConnectomeIndex};
use flyvis::dataset::{config_f64, DatasetConfig, StimulusDataset};
use flyvis::network::{CheckpointId, Dynamics, Network, NetworkView};
use flyvis::table::{Aggregate, Column, Table};
use flyvis::tensor::{index_tensor, AutoDeref, RefTensor};
use flyvis::{Error, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub type Backend = NdArray<f32>;

pub const DT: f64 = 0.01;

/// R1 (two hexals, input), L1 (two nodes), Mi1 and T4 (one node each)
///
/// Central cells in unique-type order are nodes `[1, 2, 4, 5]`.
pub fn toy_connectome() -> Connectome {
    Connectome::new(
        vec![
            "R1".into(),
            "R1".into(),
            "L1".into(),
            "L1".into(),
            "Mi1".into(),
            "T4".into(),
        ],
        vec![1, 0, 0, 1, 0, 0],
        vec![0, 0, 0, 0, 0, 0],
        &[(0, 2), (1, 2), (1, 3), (2, 4), (3, 4), (4, 5), (0, 5)],
        vec!["R1".into()],
    )
    .unwrap()
}

/// Same node count, different node ordering
pub fn shuffled_connectome() -> Connectome {
    Connectome::new(
        vec![
            "L1".into(),
            "R1".into(),
            "R1".into(),
            "L1".into(),
            "Mi1".into(),
            "T4".into(),
        ],
        vec![0, 1, 0, 1, 0, 0],
        vec![0, 0, 0, 0, 0, 0],
        &[(1, 0), (2, 0)],
        vec!["R1".into()],
    )
    .unwrap()
}

pub fn video(values: Vec<f32>, shape: [usize; 4]) -> Tensor<Backend, 4> {
    Tensor::from_data(TensorData::new(values, shape), &Default::default())
}

/// `x += dt / tau * (gain * input - x)` with one shared `tau` per cell type.
///
/// Edge currents are `weight * x[source]` with unit weights.
pub struct Leaky {
    tau: Tensor<Backend, 1>,
    type_index: Tensor<Backend, 1, Int>,
    sources: Tensor<Backend, 1, Int>,
    weights: Tensor<Backend, 1>,
    n_nodes: usize,
    gain: f32,
    steps: Arc<AtomicUsize>,
}

impl Leaky {
    pub fn new(connectome: &Connectome, tau: f32, steps: Arc<AtomicUsize>) -> Self {
        let device = Default::default();
        let (types, type_index) = RefTensor::<Backend>::get_ref_indices(
            &connectome.nodes_table(),
            &["type"],
            Aggregate::First,
            &device,
        )
        .unwrap();
        let sources: Vec<usize> = connectome.edges().iter().map(|e| e.source).collect();
        Self {
            tau: Tensor::full([types.n_rows()], tau, &device),
            type_index,
            sources: index_tensor::<Backend>(&sources, &device),
            weights: Tensor::ones([sources.len()], &device),
            n_nodes: connectome.n_nodes(),
            gain: 1.0,
            steps,
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

impl Dynamics<Backend> for Leaky {
    fn param_api(&self) -> AutoDeref<Backend> {
        AutoDeref::new()
            .with("tau", RefTensor::new(self.tau.clone(), self.type_index.clone()))
            .with("gain", self.gain as f64)
    }

    fn initial_state(
        &self,
        _params: &AutoDeref<Backend>,
        n_samples: usize,
    ) -> Result<Tensor<Backend, 2>> {
        Ok(Tensor::zeros([n_samples, self.n_nodes], &Default::default()))
    }

    fn step(
        &self,
        params: &AutoDeref<Backend>,
        state: Tensor<Backend, 2>,
        input: Tensor<Backend, 2>,
        dt: f64,
    ) -> Result<Tensor<Backend, 2>> {
        self.steps.fetch_add(1, Ordering::SeqCst);
        let rate = params
            .tensor("tau")?
            .clone()
            .recip()
            .mul_scalar(dt as f32)
            .unsqueeze_dim::<2>(0);
        let drive = input.mul_scalar(params.scalar("gain")? as f32);
        Ok(state.clone() + (drive - state).mul(rate))
    }

    fn currents(
        &self,
        _params: &AutoDeref<Backend>,
        state: Tensor<Backend, 2>,
    ) -> Result<Tensor<Backend, 2>> {
        Ok(state
            .select(1, self.sources.clone())
            .mul(self.weights.clone().unsqueeze_dim::<2>(0)))
    }

    fn config(&self) -> Value {
        json!({"type": "Leaky", "gain": self.gain})
    }
}

/// Handle to a "trained" leaky network whose checkpoint sets the gain
pub struct ToyView {
    pub name: String,
    pub loss: Option<f64>,
    pub gain: f32,
    pub connectome: Arc<Connectome>,
    pub memory: Arc<Memory>,
    pub steps: Arc<AtomicUsize>,
    pub inits: Arc<AtomicUsize>,
}

impl ToyView {
    pub fn new(name: &str, loss: Option<f64>, gain: f32, memory: &Arc<Memory>) -> Self {
        Self {
            name: name.to_string(),
            loss,
            gain,
            connectome: Arc::new(toy_connectome()),
            memory: Arc::clone(memory),
            steps: Arc::new(AtomicUsize::new(0)),
            inits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shares the step and init counters of `other`
    pub fn sharing_counters(mut self, other: &ToyView) -> Self {
        self.steps = Arc::clone(&other.steps);
        self.inits = Arc::clone(&other.inits);
        self
    }

    pub fn with_connectome(mut self, connectome: Connectome) -> Self {
        self.connectome = Arc::new(connectome);
        self
    }

    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

impl NetworkView<Backend> for ToyView {
    type Dynamics = Leaky;

    fn name(&self) -> &str {
        &self.name
    }

    fn checkpoint(&self) -> CheckpointId {
        CheckpointId::new(self.name.as_str(), "best")
    }

    fn connectome(&self) -> Arc<dyn ConnectomeIndex> {
        self.connectome.clone()
    }

    fn memory(&self) -> &Memory {
        &self.memory
    }

    fn init(&self) -> Result<Network<Backend, Leaky>> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        let dynamics = Leaky::new(&self.connectome, DT as f32, Arc::clone(&self.steps));
        Network::new(dynamics, self.connectome.clone(), &Default::default())
    }

    fn recover(&self, network: &mut Network<Backend, Leaky>) -> Result<()> {
        network.dynamics_mut().set_gain(self.gain);
        Ok(())
    }

    fn validation_loss(&self) -> Result<f64> {
        self.loss
            .ok_or_else(|| Error::MissingValidationLoss(self.name.clone()))
    }

    fn config(&self) -> Value {
        json!({"name": self.name, "gain": self.gain})
    }
}

/// Full-field flashes, one constant intensity per sample
pub struct ToyFlashes {
    intensities: Vec<f32>,
    n_frames: usize,
    n_hexals: usize,
    dt: f64,
    config: DatasetConfig,
}

impl ToyFlashes {
    pub fn intensity(sample: usize) -> f32 {
        0.1 * (sample + 1) as f32
    }
}

impl StimulusDataset<Backend> for ToyFlashes {
    const NAME: &'static str = "ToyFlashes";

    fn from_config(config: &DatasetConfig, _device: &NdArrayDevice) -> Result<Self> {
        let n_samples = config_f64(config, "n_samples").unwrap_or(3.0) as usize;
        let n_frames = config_f64(config, "n_frames").unwrap_or(5.0) as usize;
        let dt = config_f64(config, "dt").unwrap_or(DT);
        if n_frames == 0 {
            return Err(Error::InvalidConfig("flashes need at least one frame".to_string()));
        }
        Ok(Self {
            intensities: (0..n_samples).map(Self::intensity).collect(),
            n_frames,
            n_hexals: 2,
            dt,
            config: config.clone(),
        })
    }

    fn config(&self) -> DatasetConfig {
        self.config.clone()
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    fn len(&self) -> usize {
        self.intensities.len()
    }

    fn get(&self, index: usize) -> Result<Tensor<Backend, 3>> {
        let intensity = self
            .intensities
            .get(index)
            .ok_or_else(|| Error::InvalidConfig(format!("no sample {}", index)))?;
        Ok(Tensor::full(
            [self.n_frames, 1, self.n_hexals],
            *intensity,
            &Default::default(),
        ))
    }

    fn arg_table(&self) -> Table {
        Table::new()
            .with_column(
                "intensity",
                Column::Float(self.intensities.iter().map(|&x| x as f64).collect()),
            )
            .unwrap_or_default()
    }
}

/// Three samples of five frames at `dt = 0.01`, one second of pre-stimulus
pub fn flash_config() -> DatasetConfig {
    match json!({"n_samples": 3, "n_frames": 5, "dt": DT, "t_pre": 1.0, "batch_size": 2}) {
        Value::Object(map) => map,
        _ => DatasetConfig::new(),
    }
}

pub fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-5, "{:?} != {:?}", actual, expected);
    }
}

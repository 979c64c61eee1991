use super::{check_layout, run_cached};
use crate::cache::strip_performance_keys;
use crate::connectome::ConnectomeIndex;
use crate::dataset::{config_f64, DatasetConfig, StimulusDataset};
use crate::error::{Error, Result};
use crate::labeled::{LabeledArray, LabeledSet};
use crate::network::{CheckpointId, Dynamics, Network, NetworkView, ResponseOptions};
use crate::table::Column;
use crate::tensor::to_array;
use burn::tensor::backend::Backend;
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};

const FUNCTION: &str = "compute_responses";

/// Neurons kept along the `neuron` axis
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellIndex {
    /// The central node of every cell type, in unique-type order
    #[default]
    Central,
    /// Every node
    All,
    /// Explicit node positions
    Indices(Vec<usize>),
}

impl CellIndex {
    /// Node positions to keep, `None` for all of them
    pub fn resolve(&self, connectome: &dyn ConnectomeIndex) -> Result<Option<Vec<usize>>> {
        match self {
            CellIndex::Central => Ok(Some(connectome.central_cells_index())),
            CellIndex::All => Ok(None),
            CellIndex::Indices(indices) => {
                let n_nodes = connectome.n_nodes();
                if let Some(i) = indices.iter().find(|&&i| i >= n_nodes) {
                    return Err(Error::ShapeMismatch(format!(
                        "neuron {} outside of {} nodes",
                        i, n_nodes
                    )));
                }
                Ok(Some(indices.clone()))
            }
        }
    }
}

/// Arguments identifying one cached response computation
#[derive(Serialize)]
struct ResponseCall<'a> {
    checkpoint: CheckpointId,
    dataset: &'a str,
    config: &'a DatasetConfig,
    dt: Option<f64>,
    t_pre: f64,
    t_fade_in: f64,
    cell_index: &'a CellIndex,
}

/// Simulates every sample of a dataset with an already recovered network.
///
/// The result holds `stimulus[sample, frame, channel, hex_pixel]`,
/// `responses[network_id, sample, frame, neuron]` with a `network_id` axis of
/// length one, and the `sample` coordinates from the dataset's argument table.
pub fn compute_responses<B, M, D>(
    network: &mut Network<B, M>,
    config: &DatasetConfig,
    options: &ResponseOptions,
    cell_index: &CellIndex,
) -> Result<LabeledSet>
where
    B: Backend,
    M: Dynamics<B>,
    D: StimulusDataset<B>,
{
    let dataset = D::from_config(config, network.device())?;
    if dataset.is_empty() {
        return Err(Error::InvalidConfig(format!("{} has no samples", D::NAME)));
    }
    let neurons = cell_index.resolve(network.connectome().as_ref())?;

    let mut stimuli: Vec<ArrayD<f32>> = Vec::new();
    let mut responses: Vec<ArrayD<f32>> = Vec::new();
    network.stimulus_response(&dataset, options, |stimulus, activity| {
        let activity = to_array(activity)?;
        let activity = match &neurons {
            Some(neurons) => activity.select(Axis(2), neurons),
            None => activity,
        };
        stimuli.push(to_array(stimulus)?);
        responses.push(activity);
        Ok(())
    })?;

    let stimulus = concat_samples(&stimuli)?;
    let responses = concat_samples(&responses)?.insert_axis(Axis(0));

    let mut set = LabeledSet::new();
    set.insert_var(
        "stimulus",
        LabeledArray::new(&["sample", "frame", "channel", "hex_pixel"], stimulus)?,
    )?;
    set.insert_var(
        "responses",
        LabeledArray::new(&["network_id", "sample", "frame", "neuron"], responses)?,
    )?;

    set.set_coord("sample", "sample", Column::Int((0..dataset.len() as i64).collect()))?;
    let args = dataset.arg_table();
    for (name, column) in args.columns() {
        set.set_coord(name, "sample", column.clone())?;
    }
    set.set_attr("dt", &options.dt.unwrap_or_else(|| dataset.dt()))?;
    Ok(set)
}

fn concat_samples(arrays: &[ArrayD<f32>]) -> Result<ArrayD<f32>> {
    let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
    Ok(ndarray::concatenate(Axis(0), &views)?)
}

/// Responses of one or many trained networks to dataset `D`.
///
/// Per-handle results are cached and concatenated along `network_id`.
/// Coordinates are attached from the first handle's connectome:
///
/// | Coordinate | Dimension |
/// |------------|-----------|
/// | `frame`, `time` | `frame`, with `time = frame * dt - t_pre` |
/// | `channel`, `hex_pixel`, `u_in`, `v_in` | input lattice |
/// | `neuron`, `cell_type`, `u`, `v` | neuron axis after cell selection |
/// | `checkpoints` | `network_id` |
///
/// `dt` and `t_pre` for the time coordinate come from the dataset
/// configuration; `dt` falls back to the simulation step.
pub fn generic_responses<B, V, D>(
    views: &[&V],
    config: &DatasetConfig,
    options: &ResponseOptions,
    cell_index: &CellIndex,
) -> Result<LabeledSet>
where
    B: Backend,
    V: NetworkView<B>,
    D: StimulusDataset<B>,
{
    let connectome = check_layout::<B, V>(views)?;
    let stripped = strip_performance_keys(config);

    let results = run_cached::<B, V, LabeledSet, _, _>(
        views,
        FUNCTION,
        |checkpoint| ResponseCall {
            checkpoint: checkpoint.clone(),
            dataset: D::NAME,
            config: &stripped,
            dt: options.dt,
            t_pre: options.t_pre,
            t_fade_in: options.t_fade_in,
            cell_index,
        },
        |network| compute_responses::<B, V::Dynamics, D>(network, config, options, cell_index),
    )?;

    let (checkpoints, sets): (Vec<CheckpointId>, Vec<LabeledSet>) = results.into_iter().unzip();
    let mut result = match sets.len() {
        1 => sets.into_iter().next().ok_or(Error::EmptyEnsemble)?,
        _ => LabeledSet::concat(&sets, "network_id", &["responses"])?,
    };

    for (dim, var) in [
        ("frame", "stimulus"),
        ("channel", "stimulus"),
        ("hex_pixel", "stimulus"),
        ("neuron", "responses"),
    ] {
        let size = result
            .var(var)?
            .len_of(dim)
            .ok_or_else(|| Error::MissingKey(dim.to_string()))?;
        result.set_coord(dim, dim, Column::Int((0..size as i64).collect()))?;
    }

    let dt = config_f64(config, "dt")
        .or(options.dt)
        .or_else(|| result.attr("dt").ok().and_then(|v| v.as_f64()))
        .ok_or_else(|| Error::InvalidConfig("no dt for the time coordinate".to_string()))?;
    let t_pre = config_f64(config, "t_pre").unwrap_or(0.0);
    let n_frames = result.dim_size("frame").unwrap_or(0);
    let time = (0..n_frames).map(|f| f as f64 * dt - t_pre).collect();
    result.set_coord("time", "frame", Column::Float(time))?;

    let neurons = cell_index.resolve(connectome.as_ref())?;
    let all: Vec<usize> = (0..connectome.n_nodes()).collect();
    let neurons = neurons.as_deref().unwrap_or(all.as_slice());
    let types = connectome.node_types();
    let (u, v) = (connectome.node_u(), connectome.node_v());
    result.set_coord(
        "cell_type",
        "neuron",
        Column::Str(neurons.iter().map(|&n| types[n].clone()).collect()),
    )?;
    result.set_coord("u", "neuron", int_column(neurons.iter().map(|&n| u[n])))?;
    result.set_coord("v", "neuron", int_column(neurons.iter().map(|&n| v[n])))?;

    let input_nodes = connectome
        .input_layer_index()
        .first()
        .map(|nodes| nodes.to_vec())
        .unwrap_or_default();
    result.set_coord("u_in", "hex_pixel", int_column(input_nodes.iter().map(|&n| u[n])))?;
    result.set_coord("v_in", "hex_pixel", int_column(input_nodes.iter().map(|&n| v[n])))?;

    result.set_coord(
        "checkpoints",
        "network_id",
        Column::Str(checkpoints.iter().map(|c| c.to_string()).collect()),
    )?;
    result.set_attr("config", config)?;
    if let Some(first) = views.first() {
        result.set_attr("network_config", &first.config())?;
    }
    Ok(result)
}

fn int_column(values: impl Iterator<Item = i32>) -> Column {
    Column::Int(values.map(i64::from).collect())
}

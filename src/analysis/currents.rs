use super::{check_layout, run_cached};
use crate::cache::strip_performance_keys;
use crate::connectome::ReceptiveField;
use crate::dataset::{DatasetConfig, StimulusDataset};
use crate::error::{Error, Result};
use crate::network::{CheckpointId, Dynamics, Network, NetworkView, ResponseOptions};
use crate::tensor::to_array;
use burn::tensor::backend::Backend;
use ndarray::{Array2, Axis, Ix2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const FUNCTION: &str = "compute_currents";

/// Central activity of one target type and the currents it receives
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetData {
    /// One `[frames]` series per simulated sample
    pub activity_central: Vec<Vec<f32>>,
    /// Per source type, one `[frames, edges]` block per simulated sample
    pub source_data: Vec<(String, Vec<Array2<f32>>)>,
}

impl TargetData {
    pub fn source(&self, source_type: &str) -> Option<&[Array2<f32>]> {
        self.source_data
            .iter()
            .find(|(t, _)| t == source_type)
            .map(|(_, blocks)| blocks.as_slice())
    }
}

/// Currents recorded for every target type of a connectome
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentData {
    /// Dataset configuration as JSON text
    pub config: String,
    /// Target types in order of first appearance in the edge list
    pub target_data: Vec<(String, TargetData)>,
}

impl ExperimentData {
    pub fn dataset_config(&self) -> Result<DatasetConfig> {
        Ok(serde_json::from_str(&self.config)?)
    }

    pub fn target(&self, target_type: &str) -> Option<&TargetData> {
        self.target_data
            .iter()
            .find(|(t, _)| t == target_type)
            .map(|(_, data)| data)
    }
}

#[derive(Serialize)]
struct CurrentCall<'a> {
    checkpoint: CheckpointId,
    dataset: &'a str,
    config: &'a DatasetConfig,
    dt: Option<f64>,
    t_pre: f64,
    t_fade_in: f64,
}

/// Records central activity and receptive-field currents sample by sample.
pub fn compute_currents<B, M, D>(
    network: &mut Network<B, M>,
    config: &DatasetConfig,
    options: &ResponseOptions,
) -> Result<ExperimentData>
where
    B: Backend,
    M: Dynamics<B>,
    D: StimulusDataset<B>,
{
    let dataset = D::from_config(config, network.device())?;
    let connectome = Arc::clone(network.connectome());
    let fields = ReceptiveField::all(connectome.as_ref())?;
    let n_edges = connectome.edges().len();

    let mut targets = Vec::with_capacity(fields.len());
    for field in &fields {
        let central = connectome
            .central_index(&field.target_type)
            .ok_or_else(|| Error::UnknownCellType(field.target_type.clone()))?;
        let data = TargetData {
            activity_central: Vec::new(),
            source_data: field
                .sources
                .iter()
                .map(|(source, _)| (source.clone(), Vec::new()))
                .collect(),
        };
        targets.push((central, data));
    }

    network.current_response(&dataset, options, None, |index, activity, currents| {
        let activity = to_array(activity)?.into_dimensionality::<Ix2>()?;
        let currents = to_array(currents)?.into_dimensionality::<Ix2>()?;
        if currents.ncols() != n_edges {
            return Err(Error::ShapeMismatch(format!(
                "{} currents for {} edges",
                currents.ncols(),
                n_edges
            )));
        }
        tracing::debug!(sample = index, "recording currents");

        for (field, (central, data)) in fields.iter().zip(targets.iter_mut()) {
            data.activity_central.push(activity.column(*central).to_vec());
            for ((_, edges), (_, blocks)) in field.sources.iter().zip(data.source_data.iter_mut()) {
                blocks.push(currents.select(Axis(1), edges));
            }
        }
        Ok(())
    })?;

    Ok(ExperimentData {
        config: serde_json::to_string(&dataset.config())?,
        target_data: fields
            .into_iter()
            .zip(targets)
            .map(|(field, (_, data))| (field.target_type, data))
            .collect(),
    })
}

/// Currents of one or many trained networks to dataset `D`, one entry per handle.
pub fn generic_currents<B, V, D>(
    views: &[&V],
    config: &DatasetConfig,
    options: &ResponseOptions,
) -> Result<Vec<ExperimentData>>
where
    B: Backend,
    V: NetworkView<B>,
    D: StimulusDataset<B>,
{
    check_layout::<B, V>(views)?;
    let mut config = config.clone();
    config.remove("type");
    let stripped = strip_performance_keys(&config);

    let results = run_cached::<B, V, ExperimentData, _, _>(
        views,
        FUNCTION,
        |checkpoint| CurrentCall {
            checkpoint: checkpoint.clone(),
            dataset: D::NAME,
            config: &stripped,
            dt: options.dt,
            t_pre: options.t_pre,
            t_fade_in: options.t_fade_in,
        },
        |network| compute_currents::<B, V::Dynamics, D>(network, &config, options),
    )?;

    Ok(results.into_iter().map(|(_, data)| data).collect())
}

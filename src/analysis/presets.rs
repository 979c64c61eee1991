//! Default experiments for the standard stimulus families
//!
//! | Preset | `t_pre` | `t_fade_in` | default `dt` |
//! |--------|---------|-------------|--------------|
//! | [`Preset::flashes`] | 1.0 | 0.0 | 1/200 |
//! | [`Preset::moving_edge`] | 1.0 | 0.0 | 1/200 |
//! | [`Preset::moving_bar`] | 1.0 | 0.0 | 1/200 |
//! | [`Preset::naturalistic`] | 0.0 | 2.0 | 1/100 |
//! | [`Preset::central_impulses`] | 4.0 | 0.0 | 1/200 |
//! | [`Preset::spatial_impulses`] | 4.0 | 0.0 | 1/200 |

use super::{generic_responses, CellIndex};
use crate::dataset::{DatasetConfig, StimulusDataset};
use crate::error::{Error, Result};
use crate::labeled::LabeledSet;
use crate::network::{NetworkView, ResponseOptions};
use burn::tensor::backend::Backend;
use serde_json::{json, Value};

/// Dataset configuration and timing of one experiment
#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub dataset_config: DatasetConfig,
    pub t_pre: f64,
    pub t_fade_in: f64,
    pub batch_size: usize,
}

fn object(value: Value) -> DatasetConfig {
    match value {
        Value::Object(map) => map,
        _ => DatasetConfig::new(),
    }
}

impl Preset {
    fn new(name: &'static str, config: Value, t_pre: f64, t_fade_in: f64) -> Self {
        Self {
            name,
            dataset_config: object(config),
            t_pre,
            t_fade_in,
            batch_size: 4,
        }
    }

    pub fn flashes(dt: f64) -> Self {
        Self::new(
            "flashes",
            json!({
                "dynamic_range": [0, 1],
                "t_stim": 1,
                "t_pre": 1.0,
                "dt": dt,
                "radius": [-1, 6],
                "alternations": [0, 1, 0],
            }),
            1.0,
            0.0,
        )
    }

    pub fn moving_edge(dt: f64) -> Self {
        Self::new(
            "moving_edge",
            json!({
                "offsets": [-10, 11],
                "intensities": [0, 1],
                "speeds": [2.4, 4.8, 9.7, 13, 19, 25],
                "height": 80,
                "post_pad_mode": "continue",
                "dt": dt,
                "t_pre": 1.0,
                "t_post": 1.0,
            }),
            1.0,
            0.0,
        )
    }

    pub fn moving_bar(dt: f64) -> Self {
        Self::new(
            "moving_bar",
            json!({
                "widths": [1, 2, 4],
                "offsets": [-10, 11],
                "intensities": [0, 1],
                "speeds": [2.4, 4.8, 9.7, 13, 19, 25],
                "height": 9,
                "post_pad_mode": "continue",
                "dt": dt,
                "t_pre": 1.0,
                "t_post": 1.0,
            }),
            1.0,
            0.0,
        )
    }

    pub fn naturalistic(dt: f64) -> Self {
        Self::new(
            "naturalistic",
            json!({
                "tasks": ["flow"],
                "interpolate": false,
                "boxfilter": {"extent": 15, "kernel_size": 13},
                "temporal_split": true,
                "dt": dt,
            }),
            0.0,
            2.0,
        )
    }

    pub fn central_impulses(dt: f64) -> Self {
        Self::new(
            "central_impulses",
            json!({
                "impulse_durations": [5e-3, 20e-3, 50e-3, 100e-3, 200e-3, 300e-3],
                "dot_column_radius": 0,
                "bg_intensity": 0.5,
                "t_stim": 2,
                "dt": dt,
                "n_ommatidia": 721,
                "t_pre": 1.0,
                "t_post": 0,
                "intensity": 1,
                "mode": "impulse",
            }),
            4.0,
            0.0,
        )
    }

    pub fn spatial_impulses(dt: f64) -> Self {
        Self::new(
            "spatial_impulses",
            json!({
                "impulse_durations": [5e-3, 20e-3],
                "max_extent": 4,
                "dot_column_radius": 0,
                "bg_intensity": 0.5,
                "t_stim": 2,
                "dt": dt,
                "n_ommatidia": 721,
                "t_pre": 1.0,
                "t_post": 0,
                "intensity": 1,
                "mode": "impulse",
            }),
            4.0,
            0.0,
        )
    }

    /// Looks a preset up by name with its default `dt`
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "flashes" => Ok(Self::flashes(1.0 / 200.0)),
            "moving_edge" => Ok(Self::moving_edge(1.0 / 200.0)),
            "moving_bar" => Ok(Self::moving_bar(1.0 / 200.0)),
            "naturalistic" => Ok(Self::naturalistic(1.0 / 100.0)),
            "central_impulses" => Ok(Self::central_impulses(1.0 / 200.0)),
            "spatial_impulses" => Ok(Self::spatial_impulses(1.0 / 200.0)),
            other => Err(Error::InvalidConfig(format!("unknown preset '{}'", other))),
        }
    }

    /// Replaces the dataset configuration, e.g. with the config of an existing dataset
    pub fn with_dataset_config(mut self, config: DatasetConfig) -> Self {
        self.dataset_config = config;
        self
    }

    /// Overrides a single dataset configuration entry
    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.dataset_config.insert(key.into(), value);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn options(&self) -> ResponseOptions {
        ResponseOptions::new()
            .with_t_pre(self.t_pre)
            .with_t_fade_in(self.t_fade_in)
            .with_batch_size(self.batch_size)
    }
}

/// Responses to a preset experiment on dataset `D`
pub fn preset_responses<B, V, D>(
    views: &[&V],
    preset: &Preset,
    cell_index: &CellIndex,
) -> Result<LabeledSet>
where
    B: Backend,
    V: NetworkView<B>,
    D: StimulusDataset<B>,
{
    tracing::info!(preset = preset.name, handles = views.len(), "computing responses");
    generic_responses::<B, V, D>(views, &preset.dataset_config, &preset.options(), cell_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::config_f64;

    #[test]
    fn test_preset_timing() {
        let flashes = Preset::flashes(0.005);
        assert_eq!(flashes.options().t_pre, 1.0);
        assert_eq!(config_f64(&flashes.dataset_config, "dt"), Some(0.005));

        let naturalistic = Preset::by_name("naturalistic").unwrap();
        assert_eq!(naturalistic.t_pre, 0.0);
        assert_eq!(naturalistic.options().t_fade_in, 2.0);

        assert!(Preset::by_name("gratings").is_err());
    }

    #[test]
    fn test_overrides() {
        let preset = Preset::moving_edge(0.01)
            .with_entry("speeds", json!([19]))
            .with_batch_size(1);
        assert_eq!(preset.dataset_config["speeds"], json!([19]));
        assert_eq!(preset.options().batch_size, 1);
    }
}

//! Labeled multi-dimensional arrays
//!
//! A [`LabeledSet`] groups arrays that share named dimensions, coordinate
//! columns along those dimensions and free-form attributes. It is the output
//! format of the response drivers:
//!
//! | Variable | Dimensions |
//! |----------|------------|
//! | `stimulus` | `sample, frame, channel, hex_pixel` |
//! | `responses` | `network_id, sample, frame, neuron` |
//!
//! Attributes are stored as JSON text so that a set round-trips through the
//! binary cache encoding.

use crate::error::{Error, Result};
use crate::table::Column;
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An array with one name per axis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledArray {
    pub dims: Vec<String>,
    pub data: ArrayD<f32>,
}

impl LabeledArray {
    pub fn new(dims: &[&str], data: ArrayD<f32>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(Error::ShapeMismatch(format!(
                "{} dimension names for an array of shape {:?}",
                dims.len(),
                data.shape()
            )));
        }
        Ok(Self {
            dims: dims.iter().map(|d| d.to_string()).collect(),
            data,
        })
    }

    /// Position of a named dimension
    pub fn axis(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn len_of(&self, dim: &str) -> Option<usize> {
        self.axis(dim).map(|a| self.data.shape()[a])
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Keeps the given positions along `dim`
    pub fn select(&self, dim: &str, indices: &[usize]) -> Result<Self> {
        let axis = self
            .axis(dim)
            .ok_or_else(|| Error::MissingKey(dim.to_string()))?;
        let len = self.data.shape()[axis];
        if let Some(i) = indices.iter().find(|&&i| i >= len) {
            return Err(Error::ShapeMismatch(format!(
                "index {} outside of dimension '{}' of size {}",
                i, dim, len
            )));
        }
        Ok(Self {
            dims: self.dims.clone(),
            data: self.data.select(Axis(axis), indices),
        })
    }
}

/// Values labeling the positions of one dimension
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub dim: String,
    pub values: Column,
}

/// Arrays sharing named dimensions, with coordinates and attributes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledSet {
    pub data_vars: BTreeMap<String, LabeledArray>,
    pub coords: BTreeMap<String, Coordinate>,
    attrs: BTreeMap<String, String>,
}

impl LabeledSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable whose shared dimensions must agree in size
    pub fn insert_var(&mut self, name: impl Into<String>, array: LabeledArray) -> Result<()> {
        let name = name.into();
        for (dim, &len) in array.dims.iter().zip(array.shape()) {
            match self.dim_size(dim) {
                Some(existing) if existing != len => {
                    return Err(Error::ShapeMismatch(format!(
                        "'{}' has {} entries along '{}', set has {}",
                        name, len, dim, existing
                    )))
                }
                _ => {}
            }
        }
        self.data_vars.insert(name, array);
        Ok(())
    }

    pub fn var(&self, name: &str) -> Result<&LabeledArray> {
        self.data_vars
            .get(name)
            .ok_or_else(|| Error::MissingKey(name.to_string()))
    }

    /// Size of a dimension according to the first variable that has it
    pub fn dim_size(&self, dim: &str) -> Option<usize> {
        self.data_vars.values().find_map(|v| v.len_of(dim))
    }

    /// Attach a coordinate; its length must match the dimension size.
    pub fn set_coord(&mut self, name: impl Into<String>, dim: &str, values: Column) -> Result<()> {
        let name = name.into();
        let size = self
            .dim_size(dim)
            .ok_or_else(|| Error::MissingKey(dim.to_string()))?;
        if values.len() != size {
            return Err(Error::ShapeMismatch(format!(
                "coordinate '{}' has {} values, dimension '{}' has {}",
                name,
                values.len(),
                dim,
                size
            )));
        }
        self.coords.insert(
            name,
            Coordinate {
                dim: dim.to_string(),
                values,
            },
        );
        Ok(())
    }

    pub fn coord(&self, name: &str) -> Result<&Column> {
        self.coords
            .get(name)
            .map(|c| &c.values)
            .ok_or_else(|| Error::MissingKey(name.to_string()))
    }

    pub fn set_attr<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        self.attrs.insert(key.into(), serde_json::to_string(value)?);
        Ok(())
    }

    pub fn attr(&self, key: &str) -> Result<Value> {
        let text = self
            .attrs
            .get(key)
            .ok_or_else(|| Error::MissingKey(key.to_string()))?;
        Ok(serde_json::from_str(text)?)
    }

    pub fn attr_keys(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Concatenates `sets` along `dim`.
    ///
    /// Only the variables in `vars` and the coordinates on `dim` are
    /// concatenated; everything else is taken from the first set.
    pub fn concat(sets: &[LabeledSet], dim: &str, vars: &[&str]) -> Result<LabeledSet> {
        let (first, rest) = sets
            .split_first()
            .ok_or_else(|| Error::InvalidConfig("nothing to concatenate".to_string()))?;
        let mut out = first.clone();

        for &name in vars {
            let head = first.var(name)?;
            let axis = head
                .axis(dim)
                .ok_or_else(|| Error::MissingKey(format!("{}.{}", name, dim)))?;
            let mut views = vec![head.data.view()];
            for set in rest {
                let other = set.var(name)?;
                if other.dims != head.dims {
                    return Err(Error::ShapeMismatch(format!(
                        "'{}' has dimensions {:?} and {:?}",
                        name, head.dims, other.dims
                    )));
                }
                views.push(other.data.view());
            }
            let data = ndarray::concatenate(Axis(axis), &views)?;
            out.data_vars.insert(
                name.to_string(),
                LabeledArray {
                    dims: head.dims.clone(),
                    data,
                },
            );
        }

        for (name, coord) in first.coords.iter().filter(|(_, c)| c.dim == dim) {
            let mut values = coord.values.clone();
            for set in rest {
                let other = set
                    .coords
                    .get(name)
                    .ok_or_else(|| Error::MissingKey(name.clone()))?;
                values.extend_from(&other.values)?;
            }
            out.coords.insert(
                name.clone(),
                Coordinate {
                    dim: dim.to_string(),
                    values,
                },
            );
        }

        Ok(out)
    }
}

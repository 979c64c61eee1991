//! Row-oriented relational tables
//!
//! Node and edge attributes of a connectome, and the argument table of a
//! stimulus dataset, are both small column stores. [`Table::group_by`] is the
//! primitive behind parameter sharing: rows that agree on the grouping columns
//! collapse into one group, and every original row keeps a pointer to its group.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single named column
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Str(Vec<String>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Str(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather rows by position
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Str(v) => Column::Str(rows.iter().map(|&r| v[r].clone()).collect()),
            Column::Int(v) => Column::Int(rows.iter().map(|&r| v[r]).collect()),
            Column::Float(v) => Column::Float(rows.iter().map(|&r| v[r]).collect()),
        }
    }

    /// Append the rows of `other`, which must hold the same kind of values
    pub fn extend_from(&mut self, other: &Column) -> Result<()> {
        match (self, other) {
            (Column::Str(a), Column::Str(b)) => a.extend(b.iter().cloned()),
            (Column::Int(a), Column::Int(b)) => a.extend_from_slice(b),
            (Column::Float(a), Column::Float(b)) => a.extend_from_slice(b),
            (a, _) => {
                return Err(Error::TypeMismatch {
                    key: "column".to_string(),
                    expected: a.kind(),
                })
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Column::Str(_) => "string column",
            Column::Int(_) => "integer column",
            Column::Float(_) => "float column",
        }
    }

    fn cell(&self, row: usize) -> Cell {
        match self {
            Column::Str(v) => Cell::Str(v[row].clone()),
            Column::Int(v) => Cell::Int(v[row]),
            Column::Float(v) => Cell::Float(v[row].to_bits()),
        }
    }

    fn aggregate(&self, members: &[Vec<usize>], aggregate: Aggregate) -> Column {
        let first: Vec<usize> = members.iter().map(|m| m[0]).collect();
        match (self, aggregate) {
            (_, Aggregate::First) | (Column::Str(_), _) => self.take(&first),
            (Column::Int(v), Aggregate::Sum) => {
                Column::Int(members.iter().map(|m| m.iter().map(|&r| v[r]).sum()).collect())
            }
            (Column::Int(v), Aggregate::Mean) => Column::Float(
                members
                    .iter()
                    .map(|m| m.iter().map(|&r| v[r] as f64).sum::<f64>() / m.len() as f64)
                    .collect(),
            ),
            (Column::Float(v), Aggregate::Sum) => {
                Column::Float(members.iter().map(|m| m.iter().map(|&r| v[r]).sum()).collect())
            }
            (Column::Float(v), Aggregate::Mean) => Column::Float(
                members
                    .iter()
                    .map(|m| m.iter().map(|&r| v[r]).sum::<f64>() / m.len() as f64)
                    .collect(),
            ),
        }
    }
}

/// How non-key columns collapse within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    /// Keep the first row of the group
    #[default]
    First,
    /// Arithmetic mean of numeric columns
    Mean,
    /// Sum of numeric columns
    Sum,
}

/// Hashable view of one table cell, floats compared by bit pattern
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Cell {
    Str(String),
    Int(i64),
    Float(u64),
}

/// Ordered collection of equal-length named columns
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, rejecting lengths that disagree with existing columns
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if let Some((_, existing)) = self.columns.first() {
            if existing.len() != column.len() {
                return Err(Error::ShapeMismatch(format!(
                    "column '{}' has {} rows, table has {}",
                    name,
                    column.len(),
                    existing.len()
                )));
            }
        }
        self.columns.retain(|(n, _)| n != &name);
        self.columns.push((name, column));
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.take(rows)))
                .collect(),
        }
    }

    /// Group rows by the values of `by`.
    ///
    /// Returns the grouped table, one row per group in order of first
    /// occurrence, and for every original row the position of its group.
    pub fn group_by(&self, by: &[&str], aggregate: Aggregate) -> Result<(Table, Vec<usize>)> {
        let keys: Vec<&Column> = by.iter().map(|k| self.column(k)).collect::<Result<_>>()?;

        let mut to_index: HashMap<Vec<Cell>, usize> = HashMap::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        let mut indices = Vec::with_capacity(self.n_rows());

        for row in 0..self.n_rows() {
            let key: Vec<Cell> = keys.iter().map(|c| c.cell(row)).collect();
            let group = *to_index.entry(key).or_insert_with(|| {
                members.push(Vec::new());
                members.len() - 1
            });
            members[group].push(row);
            indices.push(group);
        }

        let columns = self
            .columns
            .iter()
            .map(|(name, column)| {
                let agg = if by.contains(&name.as_str()) {
                    Aggregate::First
                } else {
                    aggregate
                };
                (name.clone(), column.aggregate(&members, agg))
            })
            .collect();

        Ok((Table { columns }, indices))
    }
}

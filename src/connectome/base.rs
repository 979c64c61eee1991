use super::ConnectomeConfig;
use crate::error::{Error, Result};
use crate::table::{Column, Table};
use std::collections::HashMap;

/// A synapse population between two nodes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub source_type: String,
    pub target_type: String,
}

/// Base trait for connectome indexing views
///
/// Indices are stable for the lifetime of an instance.
pub trait ConnectomeIndex: Send + Sync {
    /// Total number of nodes per sample
    fn n_nodes(&self) -> usize;

    /// Cell type of every node
    fn node_types(&self) -> &[String];

    /// Hexagonal `u` coordinate of every node
    fn node_u(&self) -> &[i32];

    /// Hexagonal `v` coordinate of every node
    fn node_v(&self) -> &[i32];

    /// Distinct cell types in order of first occurrence
    fn unique_cell_types(&self) -> &[String];

    /// Node positions of a cell type
    fn layer_index(&self, cell_type: &str) -> Option<&[usize]>;

    /// The central node of a cell type
    fn central_index(&self, cell_type: &str) -> Option<usize>;

    /// Types driven by the external video, in a fixed order
    fn input_types(&self) -> &[String];

    fn edges(&self) -> &[Edge];

    /// One central node per unique cell type, in unique-type order
    fn central_cells_index(&self) -> Vec<usize> {
        self.unique_cell_types()
            .iter()
            .filter_map(|t| self.central_index(t))
            .collect()
    }

    /// Node positions of each input type
    fn input_layer_index(&self) -> Vec<&[usize]> {
        self.input_types()
            .iter()
            .filter_map(|t| self.layer_index(t))
            .collect()
    }

    /// Whether `other` has the same node count and node ordering
    fn same_layout(&self, other: &dyn ConnectomeIndex) -> bool {
        self.n_nodes() == other.n_nodes() && self.node_types() == other.node_types()
    }
}

/// Connectome built from node and edge lists
#[derive(Clone, Debug)]
pub struct Connectome {
    node_types: Vec<String>,
    u: Vec<i32>,
    v: Vec<i32>,
    unique_types: Vec<String>,
    layer_index: HashMap<String, Vec<usize>>,
    central_index: HashMap<String, usize>,
    input_types: Vec<String>,
    edges: Vec<Edge>,
}

impl Connectome {
    /// Creates a connectome from per-node types and coordinates.
    ///
    /// The central node of a type is the node at `(0, 0)`, or the node of that
    /// type closest to the origin when no node sits exactly there.
    pub fn new(
        node_types: Vec<String>,
        u: Vec<i32>,
        v: Vec<i32>,
        edges: &[(usize, usize)],
        input_types: Vec<String>,
    ) -> Result<Self> {
        let n_nodes = node_types.len();
        if u.len() != n_nodes || v.len() != n_nodes {
            return Err(Error::ShapeMismatch(format!(
                "{} node types but {} u and {} v coordinates",
                n_nodes,
                u.len(),
                v.len()
            )));
        }

        let mut unique_types: Vec<String> = Vec::new();
        let mut layer_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (node, cell_type) in node_types.iter().enumerate() {
            layer_index
                .entry(cell_type.clone())
                .or_insert_with(|| {
                    unique_types.push(cell_type.clone());
                    Vec::new()
                })
                .push(node);
        }

        let central_index = layer_index
            .iter()
            .map(|(cell_type, nodes)| {
                let central = nodes
                    .iter()
                    .copied()
                    .min_by_key(|&n| hex_distance(u[n], v[n]))
                    .unwrap_or(nodes[0]);
                (cell_type.clone(), central)
            })
            .collect();

        for input_type in &input_types {
            if !layer_index.contains_key(input_type) {
                return Err(Error::UnknownCellType(input_type.clone()));
            }
        }

        let edges = edges
            .iter()
            .map(|&(source, target)| {
                if source >= n_nodes || target >= n_nodes {
                    return Err(Error::ShapeMismatch(format!(
                        "edge ({}, {}) outside of {} nodes",
                        source, target, n_nodes
                    )));
                }
                Ok(Edge {
                    source,
                    target,
                    source_type: node_types[source].clone(),
                    target_type: node_types[target].clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            node_types,
            u,
            v,
            unique_types,
            layer_index,
            central_index,
            input_types,
            edges,
        })
    }

    pub fn from_config(config: ConnectomeConfig) -> Result<Self> {
        Self::new(
            config.node_types,
            config.u,
            config.v,
            &config.edges,
            config.input_types,
        )
    }

    pub fn get_config(&self) -> ConnectomeConfig {
        ConnectomeConfig {
            node_types: self.node_types.clone(),
            u: self.u.clone(),
            v: self.v.clone(),
            edges: self.edges.iter().map(|e| (e.source, e.target)).collect(),
            input_types: self.input_types.clone(),
        }
    }

    /// Node attributes as a table with columns `type`, `u`, `v`
    pub fn nodes_table(&self) -> Table {
        Table::new()
            .with_column("type", Column::Str(self.node_types.clone()))
            .and_then(|t| t.with_column("u", int_column(&self.u)))
            .and_then(|t| t.with_column("v", int_column(&self.v)))
            .unwrap_or_default()
    }

    /// Edge attributes as a table with columns `source_type`, `target_type`,
    /// `du`, `dv` (target minus source coordinates)
    pub fn edges_table(&self) -> Table {
        let (mut du, mut dv) = (Vec::new(), Vec::new());
        for e in &self.edges {
            du.push((self.u[e.target] - self.u[e.source]) as i64);
            dv.push((self.v[e.target] - self.v[e.source]) as i64);
        }
        Table::new()
            .with_column(
                "source_type",
                Column::Str(self.edges.iter().map(|e| e.source_type.clone()).collect()),
            )
            .and_then(|t| {
                t.with_column(
                    "target_type",
                    Column::Str(self.edges.iter().map(|e| e.target_type.clone()).collect()),
                )
            })
            .and_then(|t| t.with_column("du", Column::Int(du)))
            .and_then(|t| t.with_column("dv", Column::Int(dv)))
            .unwrap_or_default()
    }
}

impl ConnectomeIndex for Connectome {
    fn n_nodes(&self) -> usize {
        self.node_types.len()
    }

    fn node_types(&self) -> &[String] {
        &self.node_types
    }

    fn node_u(&self) -> &[i32] {
        &self.u
    }

    fn node_v(&self) -> &[i32] {
        &self.v
    }

    fn unique_cell_types(&self) -> &[String] {
        &self.unique_types
    }

    fn layer_index(&self, cell_type: &str) -> Option<&[usize]> {
        self.layer_index.get(cell_type).map(Vec::as_slice)
    }

    fn central_index(&self, cell_type: &str) -> Option<usize> {
        self.central_index.get(cell_type).copied()
    }

    fn input_types(&self) -> &[String] {
        &self.input_types
    }

    fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Distance on the hexagonal lattice in axial coordinates
fn hex_distance(u: i32, v: i32) -> i32 {
    (u.abs() + v.abs() + (u + v).abs()) / 2
}

fn int_column(values: &[i32]) -> Column {
    Column::Int(values.iter().map(|&x| x as i64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice() -> Connectome {
        // two hexals per type, the second one at the center
        let types = ["R1", "R1", "L1", "L1", "Mi1", "Mi1"];
        Connectome::new(
            types.iter().map(|t| t.to_string()).collect(),
            vec![1, 0, 1, 0, 1, 0],
            vec![0, 0, 0, 0, 0, 0],
            &[(0, 2), (1, 3), (2, 4), (3, 5), (1, 5)],
            vec!["R1".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_layer_and_central_index() {
        let ctome = lattice();
        assert_eq!(ctome.n_nodes(), 6);
        assert_eq!(ctome.unique_cell_types(), &["R1", "L1", "Mi1"]);
        assert_eq!(ctome.layer_index("L1"), Some(&[2usize, 3][..]));
        assert_eq!(ctome.central_index("Mi1"), Some(5));
        assert_eq!(ctome.central_cells_index(), vec![1, 3, 5]);
        assert_eq!(ctome.input_layer_index(), vec![&[0usize, 1][..]]);
    }

    #[test]
    fn test_unknown_input_type() {
        let err = Connectome::new(vec!["R1".into()], vec![0], vec![0], &[], vec!["R7".into()])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownCellType(_)));
    }

    #[test]
    fn test_config_roundtrip_keeps_layout() {
        let ctome = lattice();
        let restored = Connectome::from_config(ctome.get_config()).unwrap();
        assert!(ctome.same_layout(&restored));
        assert_eq!(restored.edges(), ctome.edges());
    }

    #[test]
    fn test_edges_table_offsets() {
        let table = lattice().edges_table();
        assert_eq!(table.n_rows(), 5);
        assert_eq!(
            table.column("du").unwrap(),
            &Column::Int(vec![0, 0, 0, 0, 0])
        );
    }
}

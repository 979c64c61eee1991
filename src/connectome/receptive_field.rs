use super::ConnectomeIndex;
use crate::error::{Error, Result};

/// Edges converging on the central node of one target type, by source type
#[derive(Clone, Debug, PartialEq)]
pub struct ReceptiveField {
    pub target_type: String,
    /// `(source_type, edge positions)` in order of first occurrence
    pub sources: Vec<(String, Vec<usize>)>,
}

impl ReceptiveField {
    pub fn new(connectome: &dyn ConnectomeIndex, target_type: &str) -> Result<Self> {
        let central = connectome
            .central_index(target_type)
            .ok_or_else(|| Error::UnknownCellType(target_type.to_string()))?;

        let mut sources: Vec<(String, Vec<usize>)> = Vec::new();
        for (position, edge) in connectome.edges().iter().enumerate() {
            if edge.target != central {
                continue;
            }
            match sources.iter_mut().find(|(t, _)| t == &edge.source_type) {
                Some((_, edges)) => edges.push(position),
                None => sources.push((edge.source_type.clone(), vec![position])),
            }
        }

        Ok(Self {
            target_type: target_type.to_string(),
            sources,
        })
    }

    /// Receptive fields of every type that receives at least one edge
    pub fn all(connectome: &dyn ConnectomeIndex) -> Result<Vec<Self>> {
        let mut targets: Vec<&str> = Vec::new();
        for edge in connectome.edges() {
            if !targets.contains(&edge.target_type.as_str()) {
                targets.push(&edge.target_type);
            }
        }
        targets
            .into_iter()
            .map(|t| Self::new(connectome, t))
            .collect()
    }

    pub fn source_types(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(t, _)| t.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectome::Connectome;

    #[test]
    fn test_sources_of_central_target() {
        let ctome = Connectome::new(
            vec!["R1".into(), "R1".into(), "L1".into(), "Mi1".into()],
            vec![1, 0, 0, 0],
            vec![0, 0, 0, 0],
            &[(0, 3), (1, 3), (2, 3), (1, 2)],
            vec!["R1".into()],
        )
        .unwrap();

        let fields = ReceptiveField::all(&ctome).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].target_type, "Mi1");
        assert_eq!(
            fields[0].sources,
            vec![("R1".to_string(), vec![0, 1]), ("L1".to_string(), vec![2])]
        );
        assert_eq!(fields[1].source_types().collect::<Vec<_>>(), vec!["R1"]);
    }
}

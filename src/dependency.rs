//! Processing dependency graph.
//!
//! The dependency table is configuration: a list of directed edges between
//! `(instrument, data_level, descriptor)` triples, each tagged with a
//! [`Relationship`] and a [`Direction`]. It is written once with
//! `sds deps load` and read into an immutable [`DependencyGraph`] at process
//! start. The ingest path never mutates it.
//!
//! # Table file format
//!
//! ```toml
//! [[dependency]]
//! primary_instrument = "swe"
//! primary_data_level = "l1b"
//! primary_descriptor = "sci"
//! dependent_instrument = "lo"
//! dependent_data_level = "l1c"
//! dependent_descriptor = "sci"
//! relationship = "SOFT"
//! direction = "DOWNSTREAM"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::models::{Direction, PreProcessingDependency, Relationship};

type Triple = (String, String, String);

/// In-memory index of dependency edges keyed by their primary triple.
///
/// Edges sharing a key keep the order in which they were loaded.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<Triple, Vec<PreProcessingDependency>>,
    len: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges(edges: impl IntoIterator<Item = PreProcessingDependency>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            let key = (
                edge.primary_instrument.clone(),
                edge.primary_data_level.clone(),
                edge.primary_descriptor.clone(),
            );
            graph.edges.entry(key).or_default().push(edge);
            graph.len += 1;
        }
        graph
    }

    /// Builds the graph from the `pre_processing_dependency` table.
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let rows = sqlx::query(
            r#"
            SELECT primary_instrument, primary_data_level, primary_descriptor,
                   dependent_instrument, dependent_data_level, dependent_descriptor,
                   relationship, direction
            FROM pre_processing_dependency
            ORDER BY id ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in &rows {
            let relationship: String = row.get("relationship");
            let direction: String = row.get("direction");
            edges.push(PreProcessingDependency {
                primary_instrument: row.get("primary_instrument"),
                primary_data_level: row.get("primary_data_level"),
                primary_descriptor: row.get("primary_descriptor"),
                dependent_instrument: row.get("dependent_instrument"),
                dependent_data_level: row.get("dependent_data_level"),
                dependent_descriptor: row.get("dependent_descriptor"),
                relationship: Relationship::from_str(&relationship).map_err(anyhow::Error::msg)?,
                direction: Direction::from_str(&direction).map_err(anyhow::Error::msg)?,
            });
        }

        Ok(Self::from_edges(edges))
    }

    /// Returns the edges whose primary triple, direction, and relationship
    /// all match exactly, in load order.
    pub fn get_dependency(
        &self,
        instrument: &str,
        data_level: &str,
        descriptor: &str,
        direction: Direction,
        relationship: Relationship,
    ) -> Vec<&PreProcessingDependency> {
        let key = (
            instrument.to_string(),
            data_level.to_string(),
            descriptor.to_string(),
        );
        self.edges
            .get(&key)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|e| e.direction == direction && e.relationship == relationship)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All edges in `direction` regardless of strength, HARD before SOFT.
    pub fn dependents(
        &self,
        instrument: &str,
        data_level: &str,
        descriptor: &str,
        direction: Direction,
    ) -> Vec<&PreProcessingDependency> {
        let mut out =
            self.get_dependency(instrument, data_level, descriptor, direction, Relationship::Hard);
        out.extend(self.get_dependency(
            instrument,
            data_level,
            descriptor,
            direction,
            Relationship::Soft,
        ));
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Deserialize)]
struct TableFile {
    #[serde(default)]
    dependency: Vec<PreProcessingDependency>,
}

/// Reads a dependency table file.
pub fn load_table(path: &Path) -> Result<Vec<PreProcessingDependency>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dependency table: {}", path.display()))?;
    parse_table(&content)
        .with_context(|| format!("Failed to parse dependency table: {}", path.display()))
}

pub fn parse_table(content: &str) -> Result<Vec<PreProcessingDependency>> {
    let table: TableFile = toml::from_str(content)?;
    Ok(table.dependency)
}

/// Replaces the stored dependency table with `edges`, preserving their order.
pub async fn store_table(pool: &SqlitePool, edges: &[PreProcessingDependency]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM pre_processing_dependency")
        .execute(&mut *tx)
        .await?;

    for edge in edges {
        sqlx::query(
            r#"
            INSERT INTO pre_processing_dependency (
                primary_instrument, primary_data_level, primary_descriptor,
                dependent_instrument, dependent_data_level, dependent_descriptor,
                relationship, direction
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&edge.primary_instrument)
        .bind(&edge.primary_data_level)
        .bind(&edge.primary_descriptor)
        .bind(&edge.dependent_instrument)
        .bind(&edge.dependent_data_level)
        .bind(&edge.dependent_descriptor)
        .bind(edge.relationship.as_str())
        .bind(edge.direction.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(
        primary: (&str, &str, &str),
        dependent: (&str, &str, &str),
        relationship: Relationship,
        direction: Direction,
    ) -> PreProcessingDependency {
        PreProcessingDependency {
            primary_instrument: primary.0.to_string(),
            primary_data_level: primary.1.to_string(),
            primary_descriptor: primary.2.to_string(),
            dependent_instrument: dependent.0.to_string(),
            dependent_data_level: dependent.1.to_string(),
            dependent_descriptor: dependent.2.to_string(),
            relationship,
            direction,
        }
    }

    fn sample_graph() -> DependencyGraph {
        use Direction::*;
        use Relationship::*;
        DependencyGraph::from_edges(vec![
            edge(("swapi", "l2", "sci-1m"), ("swapi", "l1", "hk"), Hard, Upstream),
            edge(("swe", "l2", "sci"), ("glows", "l3", "sci"), Hard, Downstream),
            edge(("swe", "l1b", "sci"), ("mag", "l2", "sci"), Hard, Upstream),
            edge(("swe", "l1b", "sci"), ("hi-45", "l1c", "sci"), Soft, Downstream),
            edge(("swe", "l1b", "sci"), ("lo", "l1c", "sci"), Soft, Downstream),
            edge(("swe", "l1b", "sci"), ("ultra-45", "l1c", "sci"), Soft, Downstream),
            edge(("codice", "l1b", "sci"), ("hi-45", "l1c", "sci"), Soft, Downstream),
            edge(("hit", "l2", "sci"), ("glows", "l3", "sci"), Hard, Downstream),
        ])
    }

    #[test]
    fn fan_out_preserves_load_order() {
        let graph = sample_graph();
        let deps = graph.get_dependency("swe", "l1b", "sci", Direction::Downstream, Relationship::Soft);
        let names: Vec<&str> = deps.iter().map(|d| d.dependent_instrument.as_str()).collect();
        assert_eq!(names, vec!["hi-45", "lo", "ultra-45"]);
    }

    #[test]
    fn all_five_filters_must_match() {
        let graph = sample_graph();

        let deps = graph.get_dependency("swapi", "l2", "sci-1m", Direction::Upstream, Relationship::Hard);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].dependent_instrument, "swapi");
        assert_eq!(deps[0].dependent_data_level, "l1");
        assert_eq!(deps[0].dependent_descriptor, "hk");

        assert!(graph
            .get_dependency("swapi", "l2", "sci-1m", Direction::Downstream, Relationship::Hard)
            .is_empty());
        assert!(graph
            .get_dependency("swapi", "l2", "sci-1m", Direction::Upstream, Relationship::Soft)
            .is_empty());
        assert!(graph
            .get_dependency("swapi", "l2", "sci", Direction::Upstream, Relationship::Hard)
            .is_empty());
    }

    #[test]
    fn unknown_triple_is_empty() {
        let graph = sample_graph();
        assert!(graph
            .get_dependency("idex", "l1a", "sci", Direction::Downstream, Relationship::Hard)
            .is_empty());
    }

    #[test]
    fn dependents_lists_hard_then_soft() {
        let graph = sample_graph();
        let deps = graph.dependents("swe", "l1b", "sci", Direction::Upstream);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].dependent_instrument, "mag");
        assert_eq!(graph.len(), 8);
    }

    #[test]
    fn parse_table_file() {
        let toml = r#"
[[dependency]]
primary_instrument = "hit"
primary_data_level = "l2"
primary_descriptor = "sci"
dependent_instrument = "glows"
dependent_data_level = "l3"
dependent_descriptor = "sci"
relationship = "HARD"
direction = "DOWNSTREAM"

[[dependency]]
primary_instrument = "hit"
primary_data_level = "l2"
primary_descriptor = "sci"
dependent_instrument = "swe"
dependent_data_level = "l3"
dependent_descriptor = "sci"
relationship = "SOFT"
direction = "DOWNSTREAM"
"#;
        let edges = parse_table(toml).unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].relationship, Relationship::Hard);
        assert_eq!(edges[1].dependent_instrument, "swe");
    }

    #[test]
    fn parse_table_rejects_bad_enum() {
        let toml = r#"
[[dependency]]
primary_instrument = "hit"
primary_data_level = "l2"
primary_descriptor = "sci"
dependent_instrument = "glows"
dependent_data_level = "l3"
dependent_descriptor = "sci"
relationship = "MAYBE"
direction = "DOWNSTREAM"
"#;
        assert!(parse_table(toml).is_err());
    }
}

use anyhow::{anyhow, Result};
use ndarray::Array2;
use ndarray_npy::ReadNpyExt;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

pub const EMBEDDINGS_FILE: &str = "section_embeddings.npy";
pub const METADATA_FILE: &str = "section_metadata.json";

#[derive(Deserialize)]
struct Metadata {
    slug: String,
}

/// Precomputed section embeddings for semantic search.
///
/// Row `i` of the matrix is the embedding of section `slugs[i]`. Query vectors
/// must come from the same embedding model the rows were built with.
pub struct SectionIndex {
    embeddings: Array2<f32>,
    slugs: Vec<String>,
}

impl SectionIndex {
    /// Load embeddings from .npy file and metadata from JSON
    pub fn load(data_dir: &Path) -> Result<Self> {
        let embeddings_path = data_dir.join(EMBEDDINGS_FILE);
        let metadata_path = data_dir.join(METADATA_FILE);

        let embeddings_file = File::open(&embeddings_path)
            .map_err(|e| anyhow!("Failed to open embeddings file {:?}: {}", embeddings_path, e))?;
        let embeddings: Array2<f32> = Array2::read_npy(embeddings_file)
            .map_err(|e| anyhow!("Failed to read .npy file: {}", e))?;

        let metadata_file = File::open(&metadata_path)
            .map_err(|e| anyhow!("Failed to open metadata file {:?}: {}", metadata_path, e))?;
        let metadata: Vec<Metadata> = serde_json::from_reader(BufReader::new(metadata_file))?;

        let slugs: Vec<String> = metadata.into_iter().map(|m| m.slug).collect();

        let index = Self::from_parts(embeddings, slugs)?;
        debug!(sections = index.len(), dimensions = index.dimensions(), "Loaded section index");
        Ok(index)
    }

    pub fn from_parts(embeddings: Array2<f32>, slugs: Vec<String>) -> Result<Self> {
        if embeddings.nrows() != slugs.len() {
            return Err(anyhow!(
                "Embeddings count ({}) doesn't match metadata count ({})",
                embeddings.nrows(),
                slugs.len()
            ));
        }

        Ok(Self { embeddings, slugs })
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.embeddings.ncols()
    }

    /// Find sections semantically similar to the query embedding.
    /// Returns (slug, similarity_score) pairs sorted by similarity (highest first)
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>> {
        if query.len() != self.dimensions() {
            return Err(anyhow!(
                "Query has {} dimensions but the index has {}",
                query.len(),
                self.dimensions()
            ));
        }

        let mut scores: Vec<(usize, f32)> = self
            .embeddings
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let score = match row.as_slice() {
                    Some(values) => cosine_similarity(values, query),
                    None => cosine_similarity(&row.to_vec(), query),
                };
                (i, score)
            })
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(limit);

        Ok(scores
            .into_iter()
            .map(|(i, score)| (self.slugs[i].clone(), score))
            .collect())
    }
}

/// Compute cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

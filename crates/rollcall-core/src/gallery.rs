//! In-memory gallery: parallel lists of stored embeddings and their names.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Embedding;

#[derive(Error, Debug, PartialEq)]
pub enum GalleryError {
    #[error("gallery lists out of step: {embeddings} embeddings vs {names} names")]
    LengthMismatch { embeddings: usize, names: usize },
}

/// Enrolled faces. `embeddings[i]` belongs to `names[i]`.
///
/// Fields stay private so the two lists can only grow together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gallery {
    embeddings: Vec<Vec<f32>>,
    names: Vec<String>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the alignment invariant. Needed after deserialization.
    pub fn validate(&self) -> Result<(), GalleryError> {
        if self.embeddings.len() != self.names.len() {
            return Err(GalleryError::LengthMismatch {
                embeddings: self.embeddings.len(),
                names: self.names.len(),
            });
        }
        Ok(())
    }

    pub fn push(&mut self, name: impl Into<String>, embedding: &Embedding) {
        self.embeddings.push(embedding.values.clone());
        self.names.push(name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Iterate `(name, embedding)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.embeddings.iter().map(Vec::as_slice))
    }
}

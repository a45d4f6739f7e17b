//! Testbed build matrix loading and flattening.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::MatrixEntry;

#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("matrix file {} could not be read: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("matrix file {} is not a valid build matrix: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixLayer {
    pub data: Vec<MatrixEntry>,
}

/// A testbed matrix in either of its two on-disk shapes.
///
/// The layered shape (`[{"data": [...]}, ...]`) is tried first; an array of
/// bare entries is the flat shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestbedMatrix {
    Layered(Vec<MatrixLayer>),
    Flat(Vec<MatrixEntry>),
}

impl TestbedMatrix {
    /// Entries in layer order, then entry order. Each call starts a fresh walk.
    pub fn entries(&self) -> Box<dyn Iterator<Item = &MatrixEntry> + '_> {
        match self {
            TestbedMatrix::Layered(layers) => {
                Box::new(layers.iter().flat_map(|layer| layer.data.iter()))
            }
            TestbedMatrix::Flat(entries) => Box::new(entries.iter()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            TestbedMatrix::Layered(layers) => layers.iter().map(|layer| layer.data.len()).sum(),
            TestbedMatrix::Flat(entries) => entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn parse_matrix(path: &Path, contents: &str) -> Result<TestbedMatrix, MatrixError> {
    serde_json::from_str(contents).map_err(|source| MatrixError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_matrix(path: &Path) -> Result<TestbedMatrix, MatrixError> {
    let contents = fs::read_to_string(path).map_err(|source| MatrixError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_matrix(path, &contents)
}

/// Default matrix location inside a downloaded results directory.
#[must_use]
pub fn default_matrix_path(results_dir: &Path) -> PathBuf {
    results_dir.join("matrix").join("matrix.json")
}

impl MatrixError {
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, MatrixError::Unreadable { source, .. } if source.kind() == ErrorKind::NotFound)
    }
}

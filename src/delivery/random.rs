//! Post files and random line selection.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::DeliveryError;

/// Chooses an index in `0..len`. Injectable so selection can be pinned.
pub trait IndexSource: Send {
    /// Return an index below `len`. Never called with `len == 0`.
    fn next_index(&mut self, len: usize) -> usize;
}

/// [`IndexSource`] backed by a [`StdRng`].
#[derive(Debug, Clone)]
pub struct RngIndex(StdRng);

impl RngIndex {
    /// Deterministic source; the same seed always picks the same lines.
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    /// Source seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl IndexSource for RngIndex {
    fn next_index(&mut self, len: usize) -> usize {
        self.0.gen_range(0..len)
    }
}

/// Newline-delimited candidate posts. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFile {
    path: PathBuf,
    lines: Vec<String>,
}

impl PostFile {
    /// Read `path`, keeping every non-blank line as written.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::PostFile`] if the file cannot be read or holds no
    /// non-blank lines.
    pub fn load(path: &Path) -> Result<Self, DeliveryError> {
        let contents = std::fs::read_to_string(path).map_err(|e| DeliveryError::PostFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_lines(path, &contents)
    }

    /// Build from already-read contents.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::PostFile`] if `contents` holds no non-blank lines.
    pub fn from_lines(path: &Path, contents: &str) -> Result<Self, DeliveryError> {
        let lines: Vec<String> = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect();
        if lines.is_empty() {
            return Err(DeliveryError::PostFile {
                path: path.to_path_buf(),
                reason: "no posts found".to_owned(),
            });
        }
        debug!(path = %path.display(), count = lines.len(), "loaded post file");
        Ok(Self {
            path: path.to_path_buf(),
            lines,
        })
    }

    /// The file the lines came from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All candidate lines.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Pick one line uniformly using `source`.
    pub fn pick(&self, source: &mut dyn IndexSource) -> &str {
        let index = source.next_index(self.lines.len());
        self.lines
            .get(index)
            .or_else(|| self.lines.last())
            .map_or("", String::as_str)
    }
}

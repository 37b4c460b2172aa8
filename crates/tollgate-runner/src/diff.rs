//! Fixed changed-path lists for offline runs.

use async_trait::async_trait;
use std::io::Read;
use std::path::Path;
use tollgate_core::Result;
use tollgate_core::ports::DiffProvider;
use tollgate_core::run::RevisionPair;

/// Reports the same changed paths for every revision pair.
#[derive(Debug, Clone, Default)]
pub struct StaticDiffProvider {
    paths: Vec<String>,
}

impl StaticDiffProvider {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// One path per line; blank lines and `#` comments are ignored.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Ok(Self::new(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        ))
    }

    /// Read the list from a file, or from stdin when `path` is `-`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new("-") {
            Self::from_reader(std::io::stdin().lock())
        } else {
            Self::from_reader(std::fs::File::open(path)?)
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

#[async_trait]
impl DiffProvider for StaticDiffProvider {
    async fn changed_paths(&self, _revisions: &RevisionPair) -> Result<Vec<String>> {
        Ok(self.paths.clone())
    }
}

use std::{
    fs::File,
    io::Read,
    path::{
        Path,
        PathBuf,
    },
};

use tracing::debug;

use crate::error::DecodeError;


/// Called with the loaded fraction in `[0, 1]`.
pub type Progress<'a> = &'a mut dyn FnMut(f32);

/// Byte source for containers that reference sibling files by name.
pub trait Fetch: Send + Sync {
    fn fetch(
        &self,
        location: &str,
        on_progress: Option<Progress<'_>>,
    ) -> Result<Vec<u8>, DecodeError>;
}


const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Reads from the local filesystem, resolving relative locations against
/// `root`.
#[derive(Clone, Debug)]
pub struct FsFetcher {
    root: PathBuf,
    chunk_size: usize,
}

impl Default for FsFetcher {
    fn default() -> Self {
        Self::new(".")
    }
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Fetcher rooted at the directory holding `path`.
    pub fn sibling_of(path: &Path) -> Self {
        Self::new(path.parent().unwrap_or_else(|| Path::new(".")))
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn resolve(&self, location: &str) -> PathBuf {
        let location = location.split(['?', '#']).next().unwrap_or(location);
        let path = Path::new(location);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Fetch for FsFetcher {
    fn fetch(
        &self,
        location: &str,
        mut on_progress: Option<Progress<'_>>,
    ) -> Result<Vec<u8>, DecodeError> {
        let path = self.resolve(location);
        let mut file = File::open(&path)?;
        let total = file.metadata()?.len() as usize;
        debug!("fetching {} ({total} bytes)", path.display());

        let mut data = Vec::with_capacity(total);
        let mut chunk = vec![0; self.chunk_size];
        loop {
            let read = file.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);

            if let Some(on_progress) = on_progress.as_mut() {
                on_progress(if total == 0 { 1.0 } else { (data.len() as f32 / total as f32).min(1.0) });
            }
        }

        if data.is_empty() {
            if let Some(on_progress) = on_progress.as_mut() {
                on_progress(1.0);
            }
        }

        Ok(data)
    }
}

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use md5::{Digest, Md5};
use tracing::debug;

use crate::{ObjectStore, StorageError, UploadOptions, UploadOutput};

/// Object store backed by a local directory. Used for on-premise targets and
/// as a real filesystem store in integration tests.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at the given directory path.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root_path = root.as_ref().to_path_buf();
        // Canonicalize if the path already exists for clearer errors and
        // correct strip_prefix behavior with symlinked roots.
        let root = if root_path.exists() {
            fs::canonicalize(&root_path)?
        } else {
            root_path
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reject storage keys that could escape the root.
    fn validate_key(key: &str) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty".into()));
        }
        if key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!("absolute path '{key}'")));
        }
        if key.contains('\\') {
            return Err(StorageError::InvalidKey(format!(
                "contains backslash '{key}'"
            )));
        }
        if Path::new(key)
            .components()
            .any(|component| component == Component::ParentDir)
        {
            return Err(StorageError::InvalidKey(format!(
                "parent traversal '{key}'"
            )));
        }
        Ok(())
    }

    /// Resolve a `/`-separated storage key to a filesystem path under the root.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        Self::validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl ObjectStore for LocalBackend {
    fn upload(
        &self,
        key: &str,
        body: &mut dyn Read,
        options: &UploadOptions,
    ) -> Result<UploadOutput, StorageError> {
        let path = self.resolve(key)?;
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        // Stream into a temp file in the same directory, then rename into
        // place so readers never observe a partial object.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        let written = io::copy(body, &mut tmp)?;
        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        debug!(
            key,
            bytes = written,
            storage_class = %options.storage_class,
            "stored object on local filesystem"
        );
        Ok(UploadOutput {
            location: path.to_string_lossy().into_owned(),
            version_id: None,
        })
    }

    fn object_tag(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.resolve(key)?;
        let mut file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Some(format!("\"{}\"", hex::encode(hasher.finalize()))))
    }
}

use anyhow::{Context, Result};
use std::path::Path;

/// A named blob of bytes to hand to ExifTool.
///
/// The name (with extension) becomes the file's path in the virtual
/// filesystem, so ExifTool can use the extension to detect the format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFile {
    /// Filename with extension (e.g. `"image.jpg"`).
    pub name: String,
    pub data: Vec<u8>,
}

impl BinaryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), data: data.into() }
    }

    /// Read a host file. The name is the file name component of `path`.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .with_context(|| format!("No file name in {}", path.display()))?
            .to_string_lossy()
            .into_owned();
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self { name, data })
    }

    /// Path of this file inside the virtual filesystem.
    pub fn virtual_path(&self) -> String {
        crate::vfs::normalize(&format!("/{}", self.name))
    }
}

/// Per-call options for reads and writes.
///
/// ```rust
/// use exiftool_vfs::exif::ExifToolOptions;
///
/// // Extract specific tags as JSON
/// let options = ExifToolOptions::with_args(["-json", "-Artist", "-CreateDate"]);
/// assert_eq!(options.args.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExifToolOptions {
    /// Additional ExifTool command-line arguments, placed first.
    ///
    /// See <https://exiftool.org/exiftool_pod.html> for the available options.
    pub args: Vec<String>,
    /// An `ExifTool_config` file, staged and passed with `-config`.
    pub config: Option<BinaryFile>,
}

impl ExifToolOptions {
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { args: args.into_iter().map(Into::into).collect(), config: None }
    }

    pub fn config(mut self, config: BinaryFile) -> Self {
        self.config = Some(config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn virtual_path_is_rooted() {
        assert_eq!(BinaryFile::new("test.jpg", vec![]).virtual_path(), "/test.jpg");
        assert_eq!(BinaryFile::new("../up.jpg", vec![]).virtual_path(), "/up.jpg");
    }

    #[tokio::test]
    async fn from_path_uses_file_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"\xFF\xD8").unwrap();

        let file = BinaryFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "photo.jpg");
        assert_eq!(file.data, vec![0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(BinaryFile::from_path(dir.path().join("missing.jpg")).await.is_err());
    }

    #[test]
    fn options_builder() {
        let options = ExifToolOptions::with_args(["-n"])
            .config(BinaryFile::new("cfg", b"1;".to_vec()));
        assert_eq!(options.args, vec!["-n".to_string()]);
        assert_eq!(options.config.unwrap().name, "cfg");
    }
}

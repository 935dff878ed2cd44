//! # exiftool-vfs
//!
//! Read and write EXIF, IPTC and XMP metadata by running [ExifTool](https://exiftool.org)
//! inside a Perl interpreter that only sees an in-memory filesystem. Input
//! files are staged into that filesystem, ExifTool runs against them, and the
//! result comes back as a value: stdout for reads, the rewritten file for writes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exiftool_vfs::exif::{self, BinaryFile, ExifTags, ExifToolOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let photo = BinaryFile::from_path("photo.jpg").await?;
//!
//!     // Read: raw ExifTool output
//!     let result = exif::parse_metadata(&photo, &ExifToolOptions::with_args(["-json"])).await?;
//!     match result.data() {
//!         Some(json) => println!("{json}"),
//!         None => eprintln!("ExifTool failed: {:?}", result.error()),
//!     }
//!
//!     // Write: the original bytes are untouched, a modified copy is returned
//!     let tags = ExifTags::new()
//!         .with("Artist", "Jane Smith")
//!         .with("Keywords", vec!["landscape", "sunset"])
//!         .with("GPS:GPSLatitude", 40.7128);
//!     let written = exif::write_metadata(&photo, &tags, &ExifToolOptions::default()).await?;
//!     if let Some(bytes) = written.data() {
//!         std::fs::write("photo-tagged.jpg", bytes)?;
//!     }
//!
//!     exif::dispose().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! The interpreter sits behind [`runtime::PerlRuntime`]. The bundled
//! [`runtime::ProcessRuntimeFactory`] runs a host `perl` in a throwaway
//! directory that mirrors the virtual filesystem; other sandboxes plug in by
//! implementing [`runtime::RuntimeFactory`] and passing it to
//! [`exif::ExifTool::new`].
//!
//! ## Modules
//!
//! - [`exif`] — the read/write/dispose facade and its types
//! - [`runtime`] — interpreter traits, output capture, and the process backend
//! - [`vfs`] — the in-memory filesystem shared with the interpreter
//! - [`config`] — configuration types and loading/saving
//! - [`pipeline`] — batch helpers over host files and directories

pub mod config;
pub mod exif;
pub mod pipeline;
pub mod runtime;
pub mod vfs;

//! Source bundles
//!
//! Packages a function's source directory into a zip and names the upload
//! after the MD5 of the archive bytes. Entries are written in sorted order
//! with a fixed timestamp and fixed permissions, so unchanged sources always
//! produce the same archive and therefore the same object name.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::Result;

/// Archive produced by a [`Packager`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    pub archive_path: PathBuf,
    /// Lowercase hex MD5 of the archive bytes
    pub digest: String,
}

/// Content-addressed bundle ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArtifact {
    pub artifact_path: PathBuf,
    pub object_name: String,
    pub digest: String,
}

/// Turns a source directory into a single archive
pub trait Packager {
    fn package(&self, source_dir: &Path, excludes: &[String], output_path: &Path) -> Result<PackagedArtifact>;
}

/// Deterministic zip packager
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

impl Packager for ZipPackager {
    #[instrument(skip(self, excludes, output_path), fields(source = %source_dir.display()))]
    fn package(&self, source_dir: &Path, excludes: &[String], output_path: &Path) -> Result<PackagedArtifact> {
        let mut excludes: Vec<String> = excludes.iter().map(|e| normalize_exclude(e)).collect();

        let parent = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        // Never pack the archive into itself, however either path is spelled
        let source_root = std::fs::canonicalize(source_dir)?;
        let archive = match output_path.file_name() {
            Some(file_name) => std::fs::canonicalize(parent)?.join(file_name),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("output path {} has no file name", output_path.display()),
                )
                .into())
            }
        };
        if let Ok(inside) = archive.strip_prefix(&source_root) {
            excludes.push(relative_key(inside)?);
        }

        let mut files = Vec::new();
        collect_files(source_dir, source_dir, &excludes, &mut files)?;
        if files.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no files to package in {}", source_dir.display()),
            )
            .into());
        }

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut writer = ZipWriter::new(BufWriter::new(File::create(output_path)?));
        for (name, path) in &files {
            writer.start_file(name.as_str(), options)?;
            let mut file = BufReader::new(File::open(path)?);
            io::copy(&mut file, &mut writer)?;
        }
        writer.finish()?.flush()?;

        let digest = md5_file(output_path)?;
        debug!(files = files.len(), digest = %digest, "source bundle written");

        Ok(PackagedArtifact {
            archive_path: output_path.to_path_buf(),
            digest,
        })
    }
}

/// Object name for an archive digest
pub fn object_name(digest: &str) -> String {
    format!("bundle-{}.zip", digest)
}

/// Where a bundle is written when the deployment does not say
pub fn default_output_path(full_name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("cloudfn-plan")
        .join(format!("{}-bundle.zip", full_name))
}

/// Package `source_dir` and name the result after its content
pub fn name(
    packager: &dyn Packager,
    source_dir: &Path,
    excludes: &[String],
    output_path: &Path,
) -> Result<NamedArtifact> {
    let artifact = packager.package(source_dir, excludes, output_path)?;
    let object_name = object_name(&artifact.digest);

    info!(
        "Packaged {} -> {} ({})",
        source_dir.display(),
        artifact.archive_path.display(),
        object_name
    );

    Ok(NamedArtifact {
        artifact_path: artifact.archive_path,
        object_name,
        digest: artifact.digest,
    })
}

/// Calculate the MD5 of a file, hex encoded
pub fn md5_file(path: &Path) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut reader = BufReader::new(File::open(path)?);

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Walk `dir` in sorted order, collecting `(archive name, path)` for every file
fn collect_files(
    root: &Path,
    dir: &Path,
    excludes: &[String],
    out: &mut Vec<(String, PathBuf)>,
) -> io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;

    // Sort for deterministic ordering
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path.strip_prefix(root).map_err(io::Error::other)?;
        let key = relative_key(relative)?;

        if is_excluded(&key, excludes) {
            debug!("excluding {}", key);
            continue;
        }

        let metadata = std::fs::metadata(&path)?;
        if metadata.is_dir() {
            collect_files(root, &path, excludes, out)?;
        } else if metadata.is_file() {
            out.push((key, path));
        }
    }

    Ok(())
}

/// Forward-slash relative path, independent of the host separator
///
/// Non-UTF-8 names are rejected; a lossy conversion could map two files to
/// the same archive entry.
fn relative_key(path: &Path) -> io::Result<String> {
    let parts = path
        .components()
        .map(|c| {
            c.as_os_str().to_str().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("path is not valid UTF-8: {}", path.display()),
                )
            })
        })
        .collect::<io::Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}

fn normalize_exclude(exclude: &str) -> String {
    let trimmed = exclude.trim().trim_start_matches("./").trim_end_matches('/');
    trimmed.replace('\\', "/")
}

fn is_excluded(key: &str, excludes: &[String]) -> bool {
    excludes.iter().any(|ex| {
        !ex.is_empty()
            && (key == ex || key.strip_prefix(ex.as_str()).is_some_and(|rest| rest.starts_with('/')))
    })
}

//! On-disk store of enrolled face samples: one normalized `.jpg` per sample.

use crate::normalize::normalize_image;
use crate::types::{label_from_file_name, LabelParseError, LabelPolicy, Sample};
use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SAMPLE_PREFIX: &str = "image";
const SAMPLE_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("sample directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write sample {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Label(#[from] LabelParseError),
}

/// Directory of enrolled samples.
#[derive(Debug, Clone)]
pub struct SampleStore {
    dir: PathBuf,
    face_size: u32,
}

impl SampleStore {
    /// Open (and create if needed) the sample directory.
    pub fn open(dir: impl Into<PathBuf>, face_size: u32) -> Result<Self, SampleError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SampleError::Directory {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir, face_size })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Normalize `face` and save it as a new sample file.
    ///
    /// With a `label` the file is named `image_<label>_<n>.jpg` so that
    /// [`LabelPolicy::FromFileName`] can group it; otherwise `image_<n>.jpg`.
    pub fn capture(&self, face: &GrayImage, label: Option<i32>) -> Result<PathBuf, SampleError> {
        let normalized = normalize_image(face, self.face_size);
        let path = self.next_path(label)?;

        normalized.save(&path).map_err(|source| SampleError::Write {
            path: path.display().to_string(),
            source,
        })?;

        tracing::info!(path = %path.display(), ?label, "sample saved");
        Ok(path)
    }

    /// All samples in enrollment order, labelled per `policy`.
    pub fn list(&self, policy: LabelPolicy) -> Result<Vec<Sample>, SampleError> {
        let paths = jpeg_files(&self.dir).map_err(|source| SampleError::Directory {
            path: self.dir.display().to_string(),
            source,
        })?;

        paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| {
                let label = match policy {
                    LabelPolicy::PerImage => index as i32,
                    LabelPolicy::FromFileName => label_from_file_name(&path)?,
                };
                Ok(Sample { path, label })
            })
            .collect()
    }

    /// First free `image_[<label>_]<n>.jpg`, counting on from the number of files
    /// already present.
    fn next_path(&self, label: Option<i32>) -> Result<PathBuf, SampleError> {
        let existing = jpeg_files(&self.dir)
            .map_err(|source| SampleError::Directory {
                path: self.dir.display().to_string(),
                source,
            })?
            .len();

        (existing..)
            .map(|n| {
                let name = match label {
                    Some(l) => format!("{SAMPLE_PREFIX}_{l}_{n}.{SAMPLE_EXTENSION}"),
                    None => format!("{SAMPLE_PREFIX}_{n}.{SAMPLE_EXTENSION}"),
                };
                self.dir.join(name)
            })
            .find(|p| !p.exists())
            .ok_or_else(|| SampleError::Directory {
                path: self.dir.display().to_string(),
                source: std::io::Error::other("no free sample file name"),
            })
    }
}

/// `.jpg` files (case-insensitive) directly inside `dir`.
///
/// Files named `image_[<label>_]<n>.jpg` come first, ordered by `n`; any other
/// file follows in file-name order.
pub(crate) fn jpeg_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(SAMPLE_EXTENSION));
        if is_jpeg && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by_cached_key(|path| {
        let index = capture_index(path);
        (index.is_none(), index, path.clone())
    });
    Ok(files)
}

/// The trailing `<n>` of `image_[<label>_]<n>.jpg`.
fn capture_index(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix(SAMPLE_PREFIX)?.strip_prefix('_')?;
    rest.rsplit('_').next()?.parse().ok()
}

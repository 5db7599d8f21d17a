//! Merging of per-organ binary masks into a single labeled volume.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array3, Zip};
use serde::Serialize;
use thiserror::Error;

use crate::naming::{MASK_SUFFIX, case_prefix, organ_name_from_filename};
use crate::nrrd::{self, NrrdError};

pub const BACKGROUND: &str = "background";

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("no organ masks given")]
    NoMasks,

    #[error("no organ name in mask filename {0:?}")]
    UnmatchedFilename(String),

    #[error("mask {file} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        file: PathBuf,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("failed to read mask {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: NrrdError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Label value to organ name; `0` is always background.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelDictionary(BTreeMap<usize, String>);

impl Default for LabelDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelDictionary {
    pub fn new() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(0, BACKGROUND.to_string());
        Self(labels)
    }

    pub fn insert(&mut self, label: usize, organ: impl Into<String>) {
        self.0.insert(label, organ.into());
    }

    pub fn get(&self, label: usize) -> Option<&str> {
        self.0.get(&label).map(String::as_str)
    }

    /// Label assigned to `organ`, if any.
    pub fn label_of(&self, organ: &str) -> Option<usize> {
        self.0
            .iter()
            .find_map(|(label, name)| (name == organ).then_some(*label))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.0.iter().map(|(label, name)| (*label, name.as_str()))
    }
}

/// Merge the masks `filenames` (relative to `case_dir`) into one `u8` volume.
///
/// The mask at position `idx` contributes `idx + 1` to every voxel it
/// covers. Overlapping masks add their labels, and sums above 255 wrap, so
/// a voxel can end up carrying another organ's label.
pub fn merge_segmentations<S: AsRef<str>>(
    case_dir: impl AsRef<Path>,
    filenames: &[S],
) -> Result<(Array3<u8>, LabelDictionary), SegmentationError> {
    let case_dir = case_dir.as_ref();
    if filenames.is_empty() {
        return Err(SegmentationError::NoMasks);
    }

    let mut labels = LabelDictionary::new();
    let mut accumulator: Option<Array3<u32>> = None;
    let mut overlapping = 0usize;

    for (idx, filename) in filenames.iter().enumerate() {
        let filename = filename.as_ref();
        let organ = organ_name_from_filename(filename)
            .ok_or_else(|| SegmentationError::UnmatchedFilename(filename.to_string()))?;
        let label = idx + 1;
        labels.insert(label, organ);

        let path = case_dir.join(filename);
        let (mask, _) = nrrd::read_volume::<u32>(&path).map_err(|source| {
            SegmentationError::Read {
                path: path.clone(),
                source,
            }
        })?;
        log::debug!("merging {organ} as label {label} from {}", path.display());

        let merged = accumulator.get_or_insert_with(|| Array3::zeros(mask.dim()));
        if merged.dim() != mask.dim() {
            return Err(SegmentationError::ShapeMismatch {
                file: path,
                expected: merged.dim(),
                found: mask.dim(),
            });
        }

        let weight = label as u32;
        Zip::from(&mut *merged).and(&mask).for_each(|total, &voxel| {
            if voxel != 0 && *total != 0 {
                overlapping += 1;
            }
            *total = total.wrapping_add(voxel.wrapping_mul(weight));
        });
    }

    let Some(merged) = accumulator else {
        return Err(SegmentationError::NoMasks);
    };

    if overlapping > 0 {
        log::warn!("{overlapping} voxels are covered by more than one mask; their labels were summed");
    }
    if merged.iter().any(|&v| v > u8::MAX as u32) {
        log::warn!("merged labels exceed 255 and were truncated to 8 bits");
    }
    log::info!(
        "merged {} masks from {} into {:?} volume",
        filenames.len(),
        case_dir.display(),
        merged.dim()
    );

    Ok((merged.mapv(|v| v as u8), labels))
}

/// Mask filenames (`case_<NN>_OAR_*.seg.nrrd`) for a case, sorted by name.
pub fn list_mask_files(
    labels_dir: impl AsRef<Path>,
    case_number: u32,
) -> Result<Vec<String>, SegmentationError> {
    let prefix = format!("{}_OAR_", case_prefix(case_number));
    let mut names = Vec::new();
    for entry in fs::read_dir(labels_dir.as_ref())? {
        let name = match entry?.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                log::warn!("skipping non-UTF-8 file name {name:?}");
                continue;
            }
        };
        if name.starts_with(&prefix) && name.ends_with(MASK_SUFFIX) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Merge every mask found for `case_number` in `labels_dir`.
pub fn merge_case(
    labels_dir: impl AsRef<Path>,
    case_number: u32,
) -> Result<(Array3<u8>, LabelDictionary), SegmentationError> {
    let labels_dir = labels_dir.as_ref();
    let masks = list_mask_files(labels_dir, case_number)?;
    merge_segmentations(labels_dir, &masks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_starts_with_background() {
        let labels = LabelDictionary::new();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get(0), Some(BACKGROUND));
    }

    #[test]
    fn dictionary_serializes_as_map() {
        let mut labels = LabelDictionary::new();
        labels.insert(1, "Brainstem");
        assert_eq!(labels.label_of("Brainstem"), Some(1));
        assert_eq!(
            serde_json::to_string(&labels).unwrap(),
            r#"{"0":"background","1":"Brainstem"}"#
        );
    }

    #[test]
    fn empty_mask_list_is_rejected() {
        let none: [&str; 0] = [];
        assert!(matches!(
            merge_segmentations(".", &none),
            Err(SegmentationError::NoMasks)
        ));
    }

    #[test]
    fn unmatched_filename_fails_before_reading() {
        assert!(matches!(
            merge_segmentations("/nonexistent", &["case_01_segmentation.nrrd"]),
            Err(SegmentationError::UnmatchedFilename(_))
        ));
    }
}

use crate::config::{Config, DEFAULT_IMAGES_TR_FOLDER, DEFAULT_LABELS_TR_FOLDER};
use crate::naming::{ct_file_name, mr_file_name, segmentation_file_name};
use crate::nrrd::{self, NrrdError};
use crate::volume::Volume;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: NrrdError,
    },
}

/// Files belonging to one case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplePaths {
    pub ct: PathBuf,
    pub mr: PathBuf,
    pub segmentation: PathBuf,
}

impl SamplePaths {
    /// Paths in load order: CT, MR, segmentation.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [&self.ct, &self.mr, &self.segmentation]
            .into_iter()
            .map(PathBuf::as_path)
    }
}

/// CT, MR and segmentation volumes of one case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    pub ct: Volume<f32>,
    pub mr: Volume<f32>,
    pub segmentation: Volume<u8>,
}

pub struct SampleLoader {
    images_tr_folder: PathBuf,
    labels_tr_folder: PathBuf,
}

impl Default for SampleLoader {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGES_TR_FOLDER, DEFAULT_LABELS_TR_FOLDER)
    }
}

impl From<&Config> for SampleLoader {
    fn from(config: &Config) -> Self {
        Self::new(&config.images_tr_folder, &config.labels_tr_folder)
    }
}

impl SampleLoader {
    pub fn new(images_tr_folder: impl AsRef<Path>, labels_tr_folder: impl AsRef<Path>) -> Self {
        Self {
            images_tr_folder: images_tr_folder.as_ref().to_path_buf(),
            labels_tr_folder: labels_tr_folder.as_ref().to_path_buf(),
        }
    }

    pub fn labels_tr_folder(&self) -> &Path {
        &self.labels_tr_folder
    }

    pub fn sample_paths(&self, case_number: u32) -> SamplePaths {
        get_sample_paths(case_number, &self.images_tr_folder, &self.labels_tr_folder)
    }

    /// Load the CT, MR and segmentation volumes of a case.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::MissingFile`] for the first absent file before
    /// anything is read, or [`SampleError::Read`] if a file fails to decode.
    pub fn load(&self, case_number: u32) -> Result<Sample, SampleError> {
        let paths = self.sample_paths(case_number);
        if let Some(missing) = paths.iter().find(|path| !path.is_file()) {
            return Err(SampleError::MissingFile(missing.to_path_buf()));
        }

        let sample = Sample {
            ct: Self::read(&paths.ct)?,
            mr: Self::read(&paths.mr)?,
            segmentation: Self::read(&paths.segmentation)?,
        };
        log::info!(
            "loaded case {case_number}: CT {:?}, MR {:?}, segmentation {:?}",
            sample.ct.dim(),
            sample.mr.dim(),
            sample.segmentation.dim()
        );
        Ok(sample)
    }

    // Header metadata is not part of the sample.
    fn read<T: nrrd::Sample>(path: &Path) -> Result<Volume<T>, SampleError> {
        nrrd::read_volume::<T>(path)
            .map(|(data, _header)| Volume::new(data))
            .map_err(|source| SampleError::Read {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Resolve the three files of a case; the number is zero-padded to two digits.
pub fn get_sample_paths(
    case_number: u32,
    images_tr_folder: impl AsRef<Path>,
    labels_tr_folder: impl AsRef<Path>,
) -> SamplePaths {
    let images = images_tr_folder.as_ref();
    let labels = labels_tr_folder.as_ref();
    SamplePaths {
        ct: images.join(ct_file_name(case_number)),
        mr: images.join(mr_file_name(case_number)),
        segmentation: labels.join(segmentation_file_name(case_number)),
    }
}

/// Load a case from the given folders, or the default `data/` layout.
pub fn load_sample(
    case_number: u32,
    images_tr_folder: Option<&Path>,
    labels_tr_folder: Option<&Path>,
) -> Result<Sample, SampleError> {
    SampleLoader::new(
        images_tr_folder.unwrap_or(Path::new(DEFAULT_IMAGES_TR_FOLDER)),
        labels_tr_folder.unwrap_or(Path::new(DEFAULT_LABELS_TR_FOLDER)),
    )
    .load(case_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_padded_paths() {
        let paths = get_sample_paths(3, "images", "labels");
        assert_eq!(paths.ct, Path::new("images/case_03_IMG_CT.nrrd"));
        assert_eq!(paths.mr, Path::new("images/case_03_IMG_MR_T1.nrrd"));
        assert_eq!(
            paths.segmentation,
            Path::new("labels/case_03_segmentation.nrrd")
        );

        let paths = get_sample_paths(12, "images", "labels");
        assert!(paths.ct.to_string_lossy().contains("case_12_"));
    }

    #[test]
    fn default_loader_uses_data_folders() {
        let paths = SampleLoader::default().sample_paths(1);
        assert_eq!(paths.ct, Path::new("data/imagesTr/case_01_IMG_CT.nrrd"));
        assert_eq!(
            paths.segmentation,
            Path::new("data/labelsTr/case_01_segmentation.nrrd")
        );
    }
}

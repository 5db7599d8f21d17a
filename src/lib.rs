//! # OAR-volume library
//!
//! Utilities for a head-and-neck dataset that pairs a CT and a T1 MR volume
//! per case with organ-at-risk (OAR) segmentations, all stored as NRRD
//! files.
//!
//! The crate covers the small set of operations needed to work with such a
//! dataset from a notebook or the bundled CLI:
//!  - Reading the project configuration ([`config::read_config`])
//!  - Parsing case numbers and organ names from filenames ([`naming`])
//!  - Merging per-organ binary masks into one labeled `u8` volume
//!    ([`segmentation::merge_segmentations`])
//!  - Loading the CT, MR and segmentation of a case
//!    ([`sample_loader::load_sample`])
//!  - Rendering axial, coronal or sagittal comparison figures
//!    ([`plotting::plot_sample`])
//!
//! Files are expected in two folders:
//!   - `imagesTr/case_<NN>_IMG_CT.nrrd` and `imagesTr/case_<NN>_IMG_MR_T1.nrrd`
//!   - `labelsTr/case_<NN>_segmentation.nrrd` or
//!     `labelsTr/case_<NN>_OAR_<organ>.seg.nrrd`, one per organ
//!
//! Everything is synchronous and nothing is cached; every call re-reads from
//! disk.
//!
//! # Examples
//!
//! ## Merging organ masks
//!
//! ```no_run
//! # use oar_volume::segmentation::merge_segmentations;
//! let (labels, dictionary) = merge_segmentations(
//!     "data/labelsTr",
//!     &["case_01_OAR_Brainstem.seg.nrrd", "case_01_OAR_Parotid_L.seg.nrrd"],
//! )
//! .expect("should have merged masks");
//! assert_eq!(dictionary.get(2), Some("Parotid_L"));
//! # let _ = labels;
//! ```
//!
//! ## Rendering a slice
//!
//! ```no_run
//! # use oar_volume::{enums::Plane, plotting::plot_sample, sample_loader::load_sample};
//! let sample = load_sample(3, None, None).expect("should have loaded case 3");
//! let figure = plot_sample(&sample, Plane::Axial, 40, 0.5)
//!     .expect("should have rendered slice 40");
//! figure.save("case_03_axial_40.png").expect("should have saved figure");
//! ```

pub mod config;
pub mod enums;
pub mod naming;
pub mod nrrd;
pub mod plotting;
pub mod sample_loader;
pub mod segmentation;
pub mod volume;

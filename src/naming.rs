//! Filename conventions of the dataset.
//!
//! Images live in `case_<NN>_IMG_CT.nrrd` / `case_<NN>_IMG_MR_T1.nrrd`,
//! labels in `case_<NN>_segmentation.nrrd` or one
//! `case_<NN>_OAR_<organ>.seg.nrrd` mask per organ.

use std::sync::LazyLock;

use regex::Regex;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("number pattern is valid"));

static ORGAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_OAR_([^./\\]+)\.[^/\\]+$").expect("organ pattern is valid"));

pub const MASK_SUFFIX: &str = ".seg.nrrd";

/// `case_03` for case 3. Numbers wider than two digits are kept whole.
pub fn case_prefix(case_number: u32) -> String {
    format!("case_{case_number:02}")
}

pub fn ct_file_name(case_number: u32) -> String {
    format!("{}_IMG_CT.nrrd", case_prefix(case_number))
}

pub fn mr_file_name(case_number: u32) -> String {
    format!("{}_IMG_MR_T1.nrrd", case_prefix(case_number))
}

pub fn segmentation_file_name(case_number: u32) -> String {
    format!("{}_segmentation.nrrd", case_prefix(case_number))
}

/// First run of decimal digits in `name`, with leading zeros stripped.
///
/// An all-zero run strips to the empty string (`case_00` yields `""`).
/// Returns `None` when the name has no digits at all.
pub fn get_number_from_name(name: &str) -> Option<String> {
    NUMBER
        .find(name)
        .map(|m| m.as_str().trim_start_matches('0').to_string())
}

/// Organ name embedded in a mask filename, e.g. `Parotid_L` in
/// `case_01_OAR_Parotid_L.seg.nrrd`.
pub fn organ_name_from_filename(name: &str) -> Option<&str> {
    ORGAN
        .captures(name)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_strips_leading_zeros() {
        assert_eq!(
            get_number_from_name("case_07_segmentation.nrrd").as_deref(),
            Some("7")
        );
        assert_eq!(get_number_from_name("case_12_IMG_CT.nrrd").as_deref(), Some("12"));
        assert_eq!(get_number_from_name("case_100_x").as_deref(), Some("100"));
    }

    #[test]
    fn all_zero_number_is_empty() {
        assert_eq!(get_number_from_name("case_00_x.nrrd").as_deref(), Some(""));
    }

    #[test]
    fn no_digits_yields_none() {
        assert_eq!(get_number_from_name("segmentation.nrrd"), None);
    }

    #[test]
    fn extracts_organ_names() {
        assert_eq!(
            organ_name_from_filename("case_01_OAR_Parotid_L.seg.nrrd"),
            Some("Parotid_L")
        );
        assert_eq!(
            organ_name_from_filename("case_01_OAR_SpinalCord.nrrd"),
            Some("SpinalCord")
        );
        assert_eq!(organ_name_from_filename("case_01_segmentation.nrrd"), None);
        assert_eq!(organ_name_from_filename("case_01_OAR_Brainstem"), None);
    }

    #[test]
    fn pads_case_numbers() {
        assert_eq!(ct_file_name(3), "case_03_IMG_CT.nrrd");
        assert_eq!(mr_file_name(12), "case_12_IMG_MR_T1.nrrd");
        assert_eq!(segmentation_file_name(104), "case_104_segmentation.nrrd");
    }
}

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Anatomical plane a volume is sliced along.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Plane {
    #[default]
    Axial,
    Coronal,
    Sagittal,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid plane {0:?}: must be one of a (axial), c (coronal) or s (sagittal)")]
pub struct InvalidPlane(pub String);

impl FromStr for Plane {
    type Err = InvalidPlane;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" | "axial" => Ok(Plane::Axial),
            "c" | "coronal" => Ok(Plane::Coronal),
            "s" | "sagittal" => Ok(Plane::Sagittal),
            other => Err(InvalidPlane(other.to_string())),
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Plane::Axial => "axial",
            Plane::Coronal => "coronal",
            Plane::Sagittal => "sagittal",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Colormap {
    #[default]
    Gray,
    Jet,
}

impl Colormap {
    /// Map a value in `[0, 1]` to an RGB triple.
    pub fn rgb(self, t: f32) -> [u8; 3] {
        let t = t.clamp(0.0, 1.0);
        match self {
            Colormap::Gray => {
                let v = (t * 255.0).round() as u8;
                [v, v, v]
            }
            Colormap::Jet => {
                let channel = |offset: f32| {
                    let v = (1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0);
                    (v * 255.0).round() as u8
                };
                [channel(3.0), channel(2.0), channel(1.0)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_plane_names() {
        assert_eq!("a".parse::<Plane>(), Ok(Plane::Axial));
        assert_eq!("c".parse::<Plane>(), Ok(Plane::Coronal));
        assert_eq!("s".parse::<Plane>(), Ok(Plane::Sagittal));
        assert!("x".parse::<Plane>().is_err());
    }

    #[test]
    fn jet_runs_from_blue_to_red() {
        let low = Colormap::Jet.rgb(0.0);
        let high = Colormap::Jet.rgb(1.0);
        assert_eq!(low[0], 0);
        assert!(low[2] > 100);
        assert!(high[0] > 100);
        assert_eq!(high[2], 0);
    }
}

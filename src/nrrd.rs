//! Reading and writing of NRRD volume files.
//!
//! Only the subset of the format used by segmentation datasets is handled:
//! attached or single detached data files, `raw`, `gzip` and `ascii`
//! encodings, and the scalar sample types. Samples are decoded into whatever
//! numeric type the caller asks for, in NRRD's fastest-axis-first order, so
//! that index `[x, y, z]` of the returned array addresses the same voxel as
//! the file's axis order.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use ndarray::{Array3, ArrayD, ArrayView3, Ix3, IxDyn, ShapeBuilder};
use rayon::prelude::*;
use thiserror::Error;

const MAGIC_PREFIX: &str = "NRRD000";

#[derive(Debug, Error)]
pub enum NrrdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing NRRD magic line")]
    MissingMagic,

    #[error("malformed header line: {0:?}")]
    MalformedLine(String),

    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    #[error("invalid value {value:?} for field \"{field}\"")]
    InvalidValue { field: String, value: String },

    #[error("unsupported sample type {0:?}")]
    UnsupportedType(String),

    #[error("unsupported encoding {0:?}")]
    UnsupportedEncoding(String),

    #[error("header declares {dimension} dimensions but lists {sizes} sizes")]
    DimensionMismatch { dimension: usize, sizes: usize },

    #[error("expected a 3-dimensional volume, found {0} dimensions")]
    NotThreeDimensional(usize),

    #[error("data truncated: expected {expected}, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid ascii sample {0:?}")]
    InvalidAsciiSample(String),

    #[error("gzip decode failed: {0}")]
    Decompression(std::io::Error),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Scalar sample types a NRRD file can store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarKind {
    fn parse(value: &str) -> Result<Self, NrrdError> {
        let kind = match value {
            "signed char" | "int8" | "int8_t" => ScalarKind::I8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => ScalarKind::U8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
                ScalarKind::I16
            }
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
                ScalarKind::U16
            }
            "int" | "signed int" | "int32" | "int32_t" => ScalarKind::I32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => ScalarKind::U32,
            "longlong" | "long long" | "long long int" | "signed long long"
            | "signed long long int" | "int64" | "int64_t" => ScalarKind::I64,
            "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64"
            | "uint64_t" => ScalarKind::U64,
            "float" => ScalarKind::F32,
            "double" => ScalarKind::F64,
            other => return Err(NrrdError::UnsupportedType(other.to_string())),
        };
        Ok(kind)
    }

    /// Canonical spelling used when writing headers.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::I8 => "int8",
            ScalarKind::U8 => "uint8",
            ScalarKind::I16 => "int16",
            ScalarKind::U16 => "uint16",
            ScalarKind::I32 => "int32",
            ScalarKind::U32 => "uint32",
            ScalarKind::I64 => "int64",
            ScalarKind::U64 => "uint64",
            ScalarKind::F32 => "float",
            ScalarKind::F64 => "double",
        }
    }

    pub fn width(self) -> usize {
        match self {
            ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
        }
    }
}

/// A numeric type volumes can be decoded into.
pub trait Sample: bytemuck::Pod + Default + Send + Sync {
    const KIND: ScalarKind;

    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;
}

macro_rules! impl_sample {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Sample for $ty {
                const KIND: ScalarKind = ScalarKind::$kind;

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $ty
                }

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_sample! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Gzip,
    Ascii,
}

impl Encoding {
    fn parse(value: &str) -> Result<Self, NrrdError> {
        match value {
            "raw" => Ok(Encoding::Raw),
            "gzip" | "gz" => Ok(Encoding::Gzip),
            "ascii" | "text" | "txt" => Ok(Encoding::Ascii),
            other => Err(NrrdError::UnsupportedEncoding(other.to_string())),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Gzip => "gzip",
            Encoding::Ascii => "ascii",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    fn name(self) -> &'static str {
        match self {
            Endian::Little => "little",
            Endian::Big => "big",
        }
    }
}

/// Parsed NRRD header.
#[derive(Clone, Debug)]
pub struct NrrdHeader {
    pub version: u32,
    pub kind: ScalarKind,
    pub sizes: Vec<usize>,
    pub encoding: Encoding,
    pub endian: Option<Endian>,
    /// Per-axis spacing, from `spacings` or the norms of `space directions`.
    pub spacings: Option<Vec<f64>>,
    pub data_file: Option<PathBuf>,
    pub line_skip: usize,
    pub byte_skip: i64,
    /// Every `field: value` line as written, keyed by lower-cased field name.
    pub fields: BTreeMap<String, String>,
    /// `key:=value` pairs.
    pub key_values: BTreeMap<String, String>,
}

impl NrrdHeader {
    pub fn dimension(&self) -> usize {
        self.sizes.len()
    }

    /// `None` when the product of `sizes` overflows `usize`.
    pub fn num_samples(&self) -> Option<usize> {
        self.sizes
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
    }

    /// Length of the decoded binary payload in bytes.
    pub fn byte_len(&self) -> Option<usize> {
        self.num_samples()?.checked_mul(self.kind.width())
    }

    fn checked_byte_len(&self) -> Result<usize, NrrdError> {
        self.byte_len().ok_or_else(|| NrrdError::InvalidValue {
            field: "sizes".to_string(),
            value: sizes_field(&self.sizes),
        })
    }

    /// Parse header text; `text` must not include the blank terminator line.
    pub fn parse(text: &str) -> Result<Self, NrrdError> {
        let mut lines = text.lines();
        let magic = lines.next().ok_or(NrrdError::MissingMagic)?.trim_end();
        let version = magic
            .strip_prefix(MAGIC_PREFIX)
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or(NrrdError::MissingMagic)?;

        let mut fields = BTreeMap::new();
        let mut key_values = BTreeMap::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once(":=") {
                key_values.insert(key.to_string(), value.to_string());
            } else if let Some((field, value)) = line.split_once(": ") {
                fields.insert(field.trim().to_ascii_lowercase(), value.trim().to_string());
            } else {
                return Err(NrrdError::MalformedLine(line.to_string()));
            }
        }

        let kind = ScalarKind::parse(required(&fields, "type")?)?;
        let dimension: usize = parse_field("dimension", required(&fields, "dimension")?)?;
        let sizes = required(&fields, "sizes")?
            .split_whitespace()
            .map(|size| parse_field::<usize>("sizes", size))
            .collect::<Result<Vec<_>, _>>()?;
        if sizes.len() != dimension {
            return Err(NrrdError::DimensionMismatch {
                dimension,
                sizes: sizes.len(),
            });
        }
        if sizes
            .iter()
            .try_fold(kind.width(), |acc, &n| acc.checked_mul(n))
            .is_none()
        {
            return Err(NrrdError::InvalidValue {
                field: "sizes".to_string(),
                value: sizes_field(&sizes),
            });
        }
        let encoding = Encoding::parse(required(&fields, "encoding")?)?;

        let endian = match fields.get("endian").map(String::as_str) {
            Some("little") => Some(Endian::Little),
            Some("big") => Some(Endian::Big),
            Some(other) => {
                return Err(NrrdError::InvalidValue {
                    field: "endian".to_string(),
                    value: other.to_string(),
                });
            }
            None if kind.width() > 1 && encoding != Encoding::Ascii => {
                return Err(NrrdError::MissingField("endian"));
            }
            None => None,
        };

        let spacings = match (fields.get("spacings"), fields.get("space directions")) {
            (Some(spacings), _) => Some(
                spacings
                    .split_whitespace()
                    .map(|s| parse_field::<f64>("spacings", s))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            (None, Some(directions)) => Some(parse_space_directions(directions)?),
            (None, None) => None,
        };

        let data_file = fields
            .get("data file")
            .or_else(|| fields.get("datafile"))
            .map(PathBuf::from);
        let line_skip = match fields.get("line skip").or_else(|| fields.get("lineskip")) {
            Some(value) => parse_field("line skip", value)?,
            None => 0,
        };
        let byte_skip = match fields.get("byte skip").or_else(|| fields.get("byteskip")) {
            Some(value) => parse_field("byte skip", value)?,
            None => 0,
        };

        Ok(Self {
            version,
            kind,
            sizes,
            encoding,
            endian,
            spacings,
            data_file,
            line_skip,
            byte_skip,
            fields,
            key_values,
        })
    }
}

fn sizes_field(sizes: &[usize]) -> String {
    sizes
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn required<'a>(
    fields: &'a BTreeMap<String, String>,
    name: &'static str,
) -> Result<&'a str, NrrdError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or(NrrdError::MissingField(name))
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, NrrdError> {
    value.trim().parse().map_err(|_| NrrdError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// `space directions: (1,0,0) (0,1,0) none` -> per-axis vector norms.
/// Axes declared `none` (e.g. a list axis) get a spacing of NaN.
fn parse_space_directions(value: &str) -> Result<Vec<f64>, NrrdError> {
    value
        .split_whitespace()
        .map(|vector| {
            if vector == "none" {
                return Ok(f64::NAN);
            }
            let inner = vector
                .strip_prefix('(')
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| NrrdError::InvalidValue {
                    field: "space directions".to_string(),
                    value: vector.to_string(),
                })?;
            let squared: f64 = inner
                .split(',')
                .map(|c| {
                    c.trim()
                        .parse::<f64>()
                        .map(|c| c * c)
                        .map_err(|_| NrrdError::InvalidValue {
                            field: "space directions".to_string(),
                            value: vector.to_string(),
                        })
                })
                .sum::<Result<f64, _>>()?;
            Ok(squared.sqrt())
        })
        .collect()
}

/// Split a file into header text and the bytes following the blank line.
fn split_header(bytes: &[u8]) -> Result<(&str, &[u8]), NrrdError> {
    let mut offset = 0;
    while offset < bytes.len() {
        let end = bytes[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |p| offset + p);
        let line = &bytes[offset..end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            let header = std::str::from_utf8(&bytes[..offset])
                .map_err(|_| NrrdError::MalformedLine("non-UTF-8 header".to_string()))?;
            return Ok((header, &bytes[(end + 1).min(bytes.len())..]));
        }
        offset = end + 1;
    }
    // Detached headers may end without a blank line.
    let header = std::str::from_utf8(bytes)
        .map_err(|_| NrrdError::MalformedLine("non-UTF-8 header".to_string()))?;
    Ok((header, &bytes[bytes.len()..]))
}

fn skip_lines(mut bytes: &[u8], count: usize) -> &[u8] {
    for _ in 0..count {
        match bytes.iter().position(|&b| b == b'\n') {
            Some(p) => bytes = &bytes[p + 1..],
            None => return &[],
        }
    }
    bytes
}

/// Read only the header of a NRRD file.
pub fn read_header(path: impl AsRef<Path>) -> Result<NrrdHeader, NrrdError> {
    let bytes = fs::read(path.as_ref())?;
    let (header, _) = split_header(&bytes)?;
    NrrdHeader::parse(header)
}

/// Read a NRRD file of any dimensionality.
pub fn read_nrrd<T: Sample>(
    path: impl AsRef<Path>,
) -> Result<(ArrayD<T>, NrrdHeader), NrrdError> {
    let path = path.as_ref();
    log::debug!("reading NRRD file {}", path.display());
    let bytes = fs::read(path)?;
    let (header_text, attached) = split_header(&bytes)?;
    let header = NrrdHeader::parse(header_text)?;

    let detached;
    let payload = match &header.data_file {
        Some(data_file) => {
            let data_path = match path.parent() {
                Some(dir) if data_file.is_relative() => dir.join(data_file),
                _ => data_file.clone(),
            };
            detached = fs::read(&data_path)?;
            detached.as_slice()
        }
        None => attached,
    };
    let payload = skip_lines(payload, header.line_skip);

    let samples = decode_payload::<T>(&header, payload)?;
    // NRRD's first axis varies fastest, which is Fortran order in ndarray.
    let array = ArrayD::from_shape_vec(IxDyn(&header.sizes).f(), samples)?;
    Ok((array, header))
}

/// Read a 3-dimensional NRRD volume.
pub fn read_volume<T: Sample>(
    path: impl AsRef<Path>,
) -> Result<(Array3<T>, NrrdHeader), NrrdError> {
    let (array, header) = read_nrrd::<T>(path)?;
    let dimension = header.dimension();
    let array = array
        .into_dimensionality::<Ix3>()
        .map_err(|_| NrrdError::NotThreeDimensional(dimension))?;
    Ok((array, header))
}

fn decode_payload<T: Sample>(header: &NrrdHeader, payload: &[u8]) -> Result<Vec<T>, NrrdError> {
    let expected = header.checked_byte_len()?;
    let count = expected / header.kind.width();

    if header.encoding == Encoding::Ascii {
        let text = String::from_utf8_lossy(payload);
        let samples = text
            .split_whitespace()
            .take(count)
            .map(|token| {
                token
                    .parse::<f64>()
                    .map(T::from_f64)
                    .map_err(|_| NrrdError::InvalidAsciiSample(token.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if samples.len() < count {
            return Err(NrrdError::Truncated {
                expected: count,
                actual: samples.len(),
            });
        }
        return Ok(samples);
    }

    let inflated;
    let data = match header.encoding {
        Encoding::Gzip => {
            // Byte skip applies to the decompressed stream.
            let skip = header.byte_skip.max(0) as u64;
            let limit = (expected as u64).saturating_add(skip);
            // Capacity is bounded by the compressed size.
            let mut buffer = Vec::with_capacity(expected.min(payload.len().saturating_mul(4)));
            MultiGzDecoder::new(payload)
                .take(limit)
                .read_to_end(&mut buffer)
                .map_err(NrrdError::Decompression)?;
            inflated = buffer;
            inflated.get(skip as usize..).unwrap_or(&[])
        }
        _ if header.byte_skip == -1 => {
            // Data is the trailing `expected` bytes.
            let start = payload.len().checked_sub(expected).ok_or(NrrdError::Truncated {
                expected,
                actual: payload.len(),
            })?;
            &payload[start..]
        }
        _ => payload.get(header.byte_skip.max(0) as usize..).unwrap_or(&[]),
    };

    if data.len() < expected {
        return Err(NrrdError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    let endian = header.endian.unwrap_or_else(Endian::native);
    let data = &data[..expected];

    let samples = match header.kind {
        ScalarKind::I8 => decode_raw::<i8, T>(data, endian),
        ScalarKind::U8 => decode_raw::<u8, T>(data, endian),
        ScalarKind::I16 => decode_raw::<i16, T>(data, endian),
        ScalarKind::U16 => decode_raw::<u16, T>(data, endian),
        ScalarKind::I32 => decode_raw::<i32, T>(data, endian),
        ScalarKind::U32 => decode_raw::<u32, T>(data, endian),
        ScalarKind::I64 => decode_raw::<i64, T>(data, endian),
        ScalarKind::U64 => decode_raw::<u64, T>(data, endian),
        ScalarKind::F32 => decode_raw::<f32, T>(data, endian),
        ScalarKind::F64 => decode_raw::<f64, T>(data, endian),
    };
    Ok(samples)
}

fn decode_raw<S: Sample, T: Sample>(data: &[u8], endian: Endian) -> Vec<T> {
    let width = std::mem::size_of::<S>();
    let swap = width > 1 && endian != Endian::native();
    data.par_chunks_exact(width)
        .map(|chunk| {
            let stored: S = if swap {
                let mut buf = [0u8; 8];
                for (dst, src) in buf.iter_mut().zip(chunk.iter().rev()) {
                    *dst = *src;
                }
                bytemuck::pod_read_unaligned(&buf[..width])
            } else {
                bytemuck::pod_read_unaligned(chunk)
            };
            if S::KIND == T::KIND {
                // Same type: reinterpret without the f64 detour.
                bytemuck::pod_read_unaligned(bytemuck::bytes_of(&stored))
            } else {
                T::from_f64(stored.to_f64())
            }
        })
        .collect()
}

/// Write a 3-dimensional volume as an attached NRRD file in native byte order.
pub fn write_nrrd<T: Sample>(
    path: impl AsRef<Path>,
    data: &ArrayView3<'_, T>,
    encoding: Encoding,
) -> Result<(), NrrdError> {
    let path = path.as_ref();
    let (x, y, z) = data.dim();
    let mut out = format!(
        "NRRD0004\n# written by oar-volume\ntype: {}\ndimension: 3\nsizes: {x} {y} {z}\nencoding: {}\n",
        T::KIND.name(),
        encoding.name(),
    );
    if T::KIND.width() > 1 && encoding != Encoding::Ascii {
        out.push_str(&format!("endian: {}\n", Endian::native().name()));
    }
    out.push('\n');
    let mut bytes = out.into_bytes();

    // Reversed axes iterate with x fastest, matching the file order.
    let ordered = data.view().reversed_axes();
    match encoding {
        Encoding::Ascii => {
            let text: Vec<String> = ordered.iter().map(|v| v.to_f64().to_string()).collect();
            bytes.extend_from_slice(text.join("\n").as_bytes());
            bytes.push(b'\n');
        }
        Encoding::Raw => {
            for value in ordered.iter() {
                bytes.extend_from_slice(bytemuck::bytes_of(value));
            }
        }
        Encoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            for value in ordered.iter() {
                encoder.write_all(bytemuck::bytes_of(value))?;
            }
            bytes.extend_from_slice(&encoder.finish()?);
        }
    }

    fs::write(path, bytes)?;
    log::debug!("wrote NRRD file {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_fields_and_key_values() {
        let header = NrrdHeader::parse(
            "NRRD0004\n# comment\ntype: short\ndimension: 3\nsizes: 4 3 2\nencoding: gzip\nendian: little\nspace directions: (2,0,0) (0,3,0) (0,0,4)\nSegment0_Name:=Parotid_L",
        )
        .unwrap();
        assert_eq!(header.version, 4);
        assert_eq!(header.kind, ScalarKind::I16);
        assert_eq!(header.sizes, vec![4, 3, 2]);
        assert_eq!(header.encoding, Encoding::Gzip);
        assert_eq!(header.endian, Some(Endian::Little));
        assert_eq!(header.spacings, Some(vec![2.0, 3.0, 4.0]));
        assert_eq!(header.key_values["Segment0_Name"], "Parotid_L");
    }

    #[test]
    fn multi_byte_binary_requires_endian() {
        let err =
            NrrdHeader::parse("NRRD0004\ntype: float\ndimension: 1\nsizes: 2\nencoding: raw")
                .unwrap_err();
        assert!(matches!(err, NrrdError::MissingField("endian")));
    }

    #[test]
    fn rejects_mismatched_sizes() {
        let err = NrrdHeader::parse("NRRD0004\ntype: uchar\ndimension: 3\nsizes: 2 2\nencoding: raw")
            .unwrap_err();
        assert!(matches!(
            err,
            NrrdError::DimensionMismatch {
                dimension: 3,
                sizes: 2
            }
        ));
    }

    #[test]
    fn rejects_missing_magic() {
        assert!(matches!(
            NrrdHeader::parse("type: uchar"),
            Err(NrrdError::MissingMagic)
        ));
    }

    #[test]
    fn decodes_big_endian_samples() {
        let header = NrrdHeader::parse(
            "NRRD0004\ntype: uint16\ndimension: 1\nsizes: 2\nencoding: raw\nendian: big",
        )
        .unwrap();
        let samples = decode_payload::<u16>(&header, &[0x01, 0x02, 0x00, 0xff]).unwrap();
        assert_eq!(samples, vec![0x0102, 0x00ff]);
    }

    #[test]
    fn converts_between_sample_types() {
        let header = NrrdHeader::parse(
            "NRRD0004\ntype: int16\ndimension: 1\nsizes: 2\nencoding: raw\nendian: little",
        )
        .unwrap();
        let payload = [(-1000i16).to_le_bytes(), 40i16.to_le_bytes()].concat();
        let samples = decode_payload::<f32>(&header, &payload).unwrap();
        assert_eq!(samples, vec![-1000.0, 40.0]);
    }

    #[test]
    fn short_payload_is_truncated() {
        let header =
            NrrdHeader::parse("NRRD0004\ntype: uchar\ndimension: 1\nsizes: 4\nencoding: raw")
                .unwrap();
        assert!(matches!(
            decode_payload::<u8>(&header, &[1, 2]),
            Err(NrrdError::Truncated {
                expected: 4,
                actual: 2
            })
        ));
    }
}

//! Marker dictionaries: packed codes plus metadata.

use crate::matcher::rotate_code_u64;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum DictionaryError {
    #[error("marker size {0} unsupported (expected 2..=8 bits per side)")]
    InvalidMarkerSize(usize),
    #[error("dictionary has no codes")]
    Empty,
    #[error("code {index} has bits outside the {bits}-bit marker area")]
    CodeOutOfRange { index: usize, bits: usize },
    #[error("only {found} of {requested} codes satisfy the distance constraint")]
    Exhausted { found: usize, requested: usize },
    #[error("failed to read dictionary: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dictionary: {0}")]
    Json(#[from] serde_json::Error),
    #[error("OpenCV dictionary field `{0}` is missing or malformed")]
    OpenCvField(String),
}

/// A marker dictionary.
///
/// Codes hold the inner `marker_size × marker_size` bits, row-major
/// (`idx = y * marker_size + x`), with **black = 1**. [`Dictionary::load_json`]
/// reads both the serde layout and the layout OpenCV's `writeDictionary`
/// produces, so the OpenCV tables can be used directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dictionary {
    pub name: String,
    pub marker_size: usize,
    /// Bits that can be corrected while decoding.
    pub max_correction_bits: u8,
    /// One code per marker id.
    pub codes: Vec<u64>,
}

impl Dictionary {
    pub fn new(
        name: impl Into<String>,
        marker_size: usize,
        max_correction_bits: u8,
        codes: Vec<u64>,
    ) -> Result<Self, DictionaryError> {
        let dict = Self {
            name: name.into(),
            marker_size,
            max_correction_bits,
            codes,
        };
        dict.validate()?;
        Ok(dict)
    }

    pub fn validate(&self) -> Result<(), DictionaryError> {
        if !(2..=8).contains(&self.marker_size) {
            return Err(DictionaryError::InvalidMarkerSize(self.marker_size));
        }
        if self.codes.is_empty() {
            return Err(DictionaryError::Empty);
        }
        let bits = self.bit_count();
        if bits < 64 {
            if let Some(index) = self.codes.iter().position(|&c| c >> bits != 0) {
                return Err(DictionaryError::CodeOutOfRange { index, bits });
            }
        }
        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self, DictionaryError> {
        let dict: Self = serde_json::from_str(s)?;
        dict.validate()?;
        Ok(dict)
    }

    /// Parse OpenCV's dictionary export: `nmarkers`, `markersize`,
    /// `maxCorrectionBits` and one `marker_<id>` bit string per marker,
    /// row-major with `'1'` for white cells.
    pub fn from_opencv_json_str(name: impl Into<String>, s: &str) -> Result<Self, DictionaryError> {
        let value: serde_json::Value = serde_json::from_str(s)?;
        let field = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| DictionaryError::OpenCvField(key.to_owned()))
        };
        let count = field("nmarkers")? as usize;
        let marker_size = field("markersize")? as usize;
        let max_correction_bits = u8::try_from(field("maxCorrectionBits")?)
            .map_err(|_| DictionaryError::OpenCvField("maxCorrectionBits".to_owned()))?;
        if !(2..=8).contains(&marker_size) {
            return Err(DictionaryError::InvalidMarkerSize(marker_size));
        }

        let bits = marker_size * marker_size;
        let codes = (0..count)
            .map(|id| {
                let key = format!("marker_{id}");
                let text = value
                    .get(&key)
                    .and_then(serde_json::Value::as_str)
                    .filter(|t| t.len() == bits)
                    .ok_or_else(|| DictionaryError::OpenCvField(key.clone()))?;
                text.bytes().enumerate().try_fold(0u64, |code, (idx, ch)| match ch {
                    b'0' => Ok(code | 1 << idx),
                    b'1' => Ok(code),
                    _ => Err(DictionaryError::OpenCvField(key.clone())),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, marker_size, max_correction_bits, codes)
    }

    /// Load a dictionary file in either supported layout. OpenCV exports are
    /// named after the file stem.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        if value.get("nmarkers").is_some() {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Self::from_opencv_json_str(name, &text)
        } else {
            Self::from_json_str(&text)
        }
    }

    /// Total number of inner bits per marker.
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn code(&self, id: u32) -> Option<u64> {
        self.codes.get(id as usize).copied()
    }

    /// Smallest Hamming distance between any two markers under any rotation,
    /// including a marker and its own rotations.
    pub fn min_distance(&self) -> u32 {
        let n = self.marker_size;
        let mut best = u32::MAX;
        for (i, &a) in self.codes.iter().enumerate() {
            best = best.min(self_distance(a, n));
            for &b in &self.codes[i + 1..] {
                best = best.min(rotation_distance(a, b, n));
            }
        }
        best
    }

    /// Deterministically generate `count` codes with pairwise rotation-aware
    /// distance of at least `min_distance`.
    pub fn generate(
        name: impl Into<String>,
        marker_size: usize,
        count: usize,
        min_distance: u32,
        seed: u64,
    ) -> Result<Self, DictionaryError> {
        if !(2..=8).contains(&marker_size) {
            return Err(DictionaryError::InvalidMarkerSize(marker_size));
        }
        let bits = marker_size * marker_size;
        let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
        // Balanced-ish interiors keep markers from degenerating into plain rings.
        let min_black = (bits / 4) as u32;
        let max_black = (bits - bits / 4) as u32;

        let mut rng = SplitMix64(seed);
        let mut codes: Vec<u64> = Vec::with_capacity(count);
        const MAX_DRAWS: usize = 2_000_000;
        for _ in 0..MAX_DRAWS {
            if codes.len() == count {
                break;
            }
            let cand = rng.next() & mask;
            let ones = cand.count_ones();
            if ones < min_black || ones > max_black {
                continue;
            }
            if self_distance(cand, marker_size) < min_distance {
                continue;
            }
            if codes
                .iter()
                .all(|&c| rotation_distance(cand, c, marker_size) >= min_distance)
            {
                codes.push(cand);
            }
        }
        if codes.len() < count {
            return Err(DictionaryError::Exhausted {
                found: codes.len(),
                requested: count,
            });
        }
        let max_correction_bits = (min_distance.saturating_sub(1) / 2) as u8;
        Self::new(name, marker_size, max_correction_bits, codes)
    }
}

/// `min_r hamming(a, rot(b, r))`.
pub fn rotation_distance(a: u64, b: u64, n: usize) -> u32 {
    (0..4u8)
        .map(|r| (a ^ rotate_code_u64(b, n, r)).count_ones())
        .min()
        .unwrap_or(0)
}

/// Distance of a code to its own non-trivial rotations.
fn self_distance(a: u64, n: usize) -> u32 {
    (1..4u8)
        .map(|r| (a ^ rotate_code_u64(a, n, r)).count_ones())
        .min()
        .unwrap_or(0)
}

/// Small deterministic generator; dictionaries must be identical across runs.
struct SplitMix64(u64);

impl SplitMix64 {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

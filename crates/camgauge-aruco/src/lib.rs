//! Square fiducial markers: dictionaries, detection and decoding.
//!
//! Detection follows the usual square-marker pipeline: inverted adaptive
//! thresholding at several window sizes, outer contours reduced to convex
//! quads, bit sampling through a per-candidate homography with an Otsu
//! threshold, a black-frame check and a rotation-aware dictionary lookup.
//! Decoded corners are then fitted to the frame edges with sub-pixel
//! accuracy.
//! Candidates that fail any stage are dropped silently (`trace!` logs).

pub mod builtins;
mod decode;
mod detector;
mod dictionary;
mod matcher;
mod params;
mod quad;
mod refine;
mod render;
mod threshold;

pub use builtins::{builtin_dictionary, BUILTIN_NAMES, DEFAULT_DICTIONARY};
pub use decode::{DecodeReject, MarkerObservation, SampleGrid};
pub use detector::{detect_markers, MarkerDetection, MarkerDetector};
pub use dictionary::{rotation_distance, Dictionary, DictionaryError};
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use params::MarkerDetectorParams;
pub use quad::Candidate;
pub use render::render_marker;
pub use threshold::adaptive_threshold_inv;

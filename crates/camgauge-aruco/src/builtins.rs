//! Built-in dictionaries.
//!
//! The families are generated on first use from fixed seeds, so every build
//! produces the same codes. Their names carry a `GEN_` prefix because the
//! codes differ from the OpenCV tables. For interoperability, export an
//! OpenCV dictionary with `cv::aruco::Dictionary::writeDictionary` to JSON
//! and load it with [`Dictionary::load_json`].

use crate::dictionary::Dictionary;
use std::sync::OnceLock;

/// Names accepted by [`builtin_dictionary`].
pub const BUILTIN_NAMES: [&str; 3] = ["GEN_4X4_50", "GEN_5X5_100", "GEN_6X6_250"];

/// Dictionary used when none is configured.
pub const DEFAULT_DICTIONARY: &str = "GEN_4X4_50";

struct Family {
    name: &'static str,
    marker_size: usize,
    count: usize,
    min_distance: u32,
    seed: u64,
}

const FAMILIES: [Family; 3] = [
    Family {
        name: "GEN_4X4_50",
        marker_size: 4,
        count: 50,
        min_distance: 3,
        seed: 0x4a41_5255_0404,
    },
    Family {
        name: "GEN_5X5_100",
        marker_size: 5,
        count: 100,
        min_distance: 5,
        seed: 0x4a41_5255_0505,
    },
    Family {
        name: "GEN_6X6_250",
        marker_size: 6,
        count: 250,
        min_distance: 7,
        seed: 0x4a41_5255_0606,
    },
];

static CACHE: [OnceLock<Option<Dictionary>>; 3] = [OnceLock::new(), OnceLock::new(), OnceLock::new()];

/// Look up a built-in dictionary by name (case-insensitive).
pub fn builtin_dictionary(name: &str) -> Option<&'static Dictionary> {
    let idx = FAMILIES
        .iter()
        .position(|f| f.name.eq_ignore_ascii_case(name))?;
    CACHE[idx]
        .get_or_init(|| {
            let f = &FAMILIES[idx];
            match Dictionary::generate(f.name, f.marker_size, f.count, f.min_distance, f.seed) {
                Ok(d) => Some(d),
                Err(err) => {
                    log::error!("failed to build dictionary {}: {err}", f.name);
                    None
                }
            }
        })
        .as_ref()
}

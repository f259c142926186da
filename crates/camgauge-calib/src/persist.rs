//! Plain-text calibration file.
//!
//! ```text
//! Camera Matrix:
//! fx,0,cx,
//! 0,fy,cy,
//! 0,0,1,
//!
//! Distortion Coefficients:
//! k1,k2,p1,p2,k3,
//! ```

use camgauge_core::{CameraError, Distortion, Intrinsics};
use log::{debug, info};
use nalgebra::Matrix3;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_CALIBRATION_FILE: &str = "calibration_results.csv";

const MATRIX_HEADER: &str = "Camera Matrix:";
const DISTORTION_HEADER: &str = "Distortion Coefficients:";

#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("refusing to save: {0}")]
    Invalid(#[from] CameraError),
}

fn parse_error(line: usize, message: impl Into<String>) -> PersistError {
    PersistError::Parse {
        line,
        message: message.into(),
    }
}

fn row(values: &[f64]) -> String {
    let mut s = String::new();
    for v in values {
        s.push_str(&format!("{v},"));
    }
    s
}

/// Serialize a calibration in the file format above.
pub fn save(intrinsics: &Intrinsics, distortion: &Distortion) -> String {
    let k = intrinsics.matrix();
    let mut out = String::new();
    out.push_str(MATRIX_HEADER);
    out.push('\n');
    for r in 0..3 {
        out.push_str(&row(&[k[(r, 0)], k[(r, 1)], k[(r, 2)]]));
        out.push('\n');
    }
    out.push('\n');
    out.push_str(DISTORTION_HEADER);
    out.push('\n');
    out.push_str(&row(&distortion.coeffs()));
    out.push('\n');
    out
}

/// Comma-separated numbers; empty fields (trailing commas) are skipped.
fn parse_values(text: &str, line: usize) -> Result<Vec<f64>, PersistError> {
    text.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(|f| {
            f.parse::<f64>()
                .map_err(|_| parse_error(line, format!("invalid number {f:?}")))
        })
        .collect()
}

enum Section {
    Start,
    Matrix,
    Coefficients,
}

/// Parse a calibration file.
///
/// Accepts CRLF line endings, surrounding whitespace, trailing commas and
/// coefficients written either on one row or one per line.
pub fn load(text: &str) -> Result<(Intrinsics, Distortion), PersistError> {
    let mut section = Section::Start;
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(3);
    let mut coeffs: Vec<f64> = Vec::with_capacity(8);
    let mut matrix_line = 0;
    let mut coeff_line = 0;
    let mut last_line = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        last_line = line;
        if trimmed.eq_ignore_ascii_case(MATRIX_HEADER) {
            if !matches!(section, Section::Start) {
                return Err(parse_error(line, "duplicate camera matrix section"));
            }
            section = Section::Matrix;
            matrix_line = line;
            continue;
        }
        if trimmed.eq_ignore_ascii_case(DISTORTION_HEADER) {
            if !matches!(section, Section::Matrix) {
                return Err(parse_error(line, "distortion section before camera matrix"));
            }
            if rows.len() != 3 {
                return Err(parse_error(line, format!("camera matrix has {} rows, expected 3", rows.len())));
            }
            section = Section::Coefficients;
            coeff_line = line;
            continue;
        }
        match section {
            Section::Start => {
                return Err(parse_error(line, format!("expected {MATRIX_HEADER:?}")));
            }
            Section::Matrix => {
                let values = parse_values(trimmed, line)?;
                if values.len() != 3 {
                    return Err(parse_error(line, format!("matrix row has {} values, expected 3", values.len())));
                }
                if rows.len() == 3 {
                    return Err(parse_error(line, "camera matrix has more than 3 rows"));
                }
                rows.push(values);
            }
            Section::Coefficients => coeffs.extend(parse_values(trimmed, line)?),
        }
    }

    if !matches!(section, Section::Coefficients) {
        return Err(parse_error(last_line.max(1), format!("missing {DISTORTION_HEADER:?} section")));
    }
    let k = Matrix3::from_fn(|r, c| rows[r][c]);
    let intrinsics = Intrinsics::from_matrix(&k).map_err(|e| parse_error(matrix_line, e.to_string()))?;
    let distortion = Distortion::from_coeffs(&coeffs).map_err(|e| parse_error(coeff_line, e.to_string()))?;
    Ok((intrinsics, distortion))
}

/// Read and parse a calibration file.
pub fn read_calibration(path: impl AsRef<Path>) -> Result<(Intrinsics, Distortion), PersistError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = load(&text)?;
    debug!("loaded calibration from {}", path.display());
    Ok(parsed)
}

/// Atomically write a calibration file.
///
/// The text goes to a temporary file in the destination directory which is
/// then renamed over `path`; on any failure the previous file is untouched.
pub fn write_calibration(
    path: impl AsRef<Path>,
    intrinsics: &Intrinsics,
    distortion: &Distortion,
) -> Result<(), PersistError> {
    let path = path.as_ref();
    if !intrinsics.matrix().iter().all(|v| v.is_finite()) {
        return Err(CameraError::InvalidIntrinsics {
            fx: intrinsics.fx,
            fy: intrinsics.fy,
            cx: intrinsics.cx,
            cy: intrinsics.cy,
        }
        .into());
    }
    if distortion.coeffs().iter().any(|v| !v.is_finite()) {
        return Err(CameraError::NonFiniteCoefficient.into());
    }

    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(save(intrinsics, distortion).as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    info!("calibration saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camgauge_core::DistortionModel;

    fn sample() -> (Intrinsics, Distortion) {
        let mut d = Distortion::zero(DistortionModel::BrownConrady5);
        d.set_coeffs(&[-0.2125, 0.0431, 0.00051, -0.00032, 0.0]);
        (Intrinsics::new(812.5, 809.25, 319.75, 241.0), d)
    }

    #[test]
    fn text_layout() {
        let (k, d) = sample();
        let text = save(&k, &d);
        let expected = "Camera Matrix:\n812.5,0,319.75,\n0,809.25,241,\n0,0,1,\n\nDistortion Coefficients:\n-0.2125,0.0431,0.00051,-0.00032,0,\n";
        assert_eq!(text, expected);
        assert_eq!(load(&text).unwrap(), (k, d));
    }

    #[test]
    fn tolerant_parsing() {
        let text = "  Camera Matrix:\r\n 900 , 0 , 320\r\n0,900,240,\r\n0,0,1,\r\n\r\nDistortion Coefficients:\r\n0.1,\r\n-0.05\r\n0\r\n0\r\n0.01\r\n";
        let (k, d) = load(text).unwrap();
        assert_eq!(k, Intrinsics::new(900.0, 900.0, 320.0, 240.0));
        assert_eq!(d.coeffs(), vec![0.1, -0.05, 0.0, 0.0, 0.01]);

        let eight = "Camera Matrix:\n1,0,0,\n0,1,0,\n0,0,1,\nDistortion Coefficients:\n1,2,3,4,5,6,7,8,\n";
        assert_eq!(load(eight).unwrap().1.model, DistortionModel::Rational8);
    }

    #[test]
    fn malformed_files_are_rejected() {
        let bad = [
            // Wrong coefficient count.
            "Camera Matrix:\n1,0,0,\n0,1,0,\n0,0,1,\nDistortion Coefficients:\n1,2,3,4,\n",
            // Two matrix rows.
            "Camera Matrix:\n1,0,0,\n0,1,0,\nDistortion Coefficients:\n0,0,0,0,0,\n",
            // Short row.
            "Camera Matrix:\n1,0,\n0,1,0,\n0,0,1,\nDistortion Coefficients:\n0,0,0,0,0,\n",
            // Not a number.
            "Camera Matrix:\n1,0,x,\n0,1,0,\n0,0,1,\nDistortion Coefficients:\n0,0,0,0,0,\n",
            // Skew.
            "Camera Matrix:\n1,0.5,0,\n0,1,0,\n0,0,1,\nDistortion Coefficients:\n0,0,0,0,0,\n",
            // No header.
            "1,0,0,\n0,1,0,\n0,0,1,\n",
            "",
        ];
        for text in bad {
            assert!(matches!(load(text), Err(PersistError::Parse { .. })), "{text:?}");
        }
        match load("Camera Matrix:\n1,0,0,\n0,1,zz,\n") {
            Err(PersistError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CALIBRATION_FILE);
        let (k, d) = sample();
        write_calibration(&path, &k, &d).unwrap();
        assert_eq!(read_calibration(&path).unwrap(), (k, d));
    }

    #[test]
    fn failed_save_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CALIBRATION_FILE);
        let (k, d) = sample();
        write_calibration(&path, &k, &d).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let broken = Intrinsics::new(f64::NAN, 800.0, 320.0, 240.0);
        assert!(matches!(
            write_calibration(&path, &broken, &d),
            Err(PersistError::Invalid(_))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let missing = dir.path().join("no-such-dir").join("calib.csv");
        assert!(matches!(
            write_calibration(&missing, &k, &d),
            Err(PersistError::Io { .. })
        ));
        assert!(matches!(
            read_calibration(dir.path().join("absent.csv")),
            Err(PersistError::Io { .. })
        ));
    }
}

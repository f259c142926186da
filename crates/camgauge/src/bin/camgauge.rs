//! camgauge CLI: calibration, distortion correction, marker poses and
//! measurements from image files.

use camgauge::aruco::MarkerDetector;
use camgauge::calib::{read_calibration, save, undistort};
use camgauge::config::AppConfig;
use camgauge::core::{CameraModel, DistortionModel};
use camgauge::detect::{marker_poses, MarkerPose};
use camgauge::measure::{distance_cm, polygon_area_cm2, polygon_area_signed};
use camgauge::overlay::{draw_axes, draw_marker};
use camgauge::session::{open_image_sequence, SessionRunner};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use nalgebra::Point3;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "camgauge")]
#[command(about = "Camera calibration and marker-based distance/area measurement")]
#[command(version)]
struct Cli {
    /// JSON configuration file; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate from a directory of chessboard images.
    Calibrate(CalibrateArgs),

    /// Correct lens distortion of one image.
    Undistort {
        #[arg(long)]
        calibration: PathBuf,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },

    /// Decode markers and print them as JSON.
    DetectMarkers {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        dictionary: DictionaryArgs,
        /// Write the image with marker outlines.
        #[arg(long)]
        annotated: Option<PathBuf>,
    },

    /// Estimate marker poses and print them as JSON.
    Pose {
        #[arg(long)]
        calibration: PathBuf,
        #[arg(long)]
        input: PathBuf,
        /// Marker side length in meters.
        #[arg(long)]
        marker_size: Option<f64>,
        #[command(flatten)]
        dictionary: DictionaryArgs,
        /// Write the image with outlines and pose axes.
        #[arg(long)]
        annotated: Option<PathBuf>,
    },

    /// Distance between two points, in centimeters.
    MeasureDistance {
        /// JSON `[[x, y, z], [x, y, z]]` in meters, inline or as a file path.
        points: String,
    },

    /// Area of a planar polygon, in square centimeters.
    MeasureArea {
        /// JSON list of at least three `[x, y, z]` vertices in meters, inline
        /// or as a file path.
        points: String,
    },

    /// Print the default configuration as JSON.
    DefaultConfig {
        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    /// k1, k2, p1, p2, k3.
    Five,
    /// Adds the rational k4, k5, k6 terms.
    Eight,
}

impl From<ModelArg> for DistortionModel {
    fn from(m: ModelArg) -> Self {
        match m {
            ModelArg::Five => DistortionModel::BrownConrady5,
            ModelArg::Eight => DistortionModel::Rational8,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// Directory of images, read in file-name order.
    #[arg(long)]
    images: PathBuf,
    /// Internal corners per row.
    #[arg(long)]
    cols: Option<u32>,
    /// Internal corners per column.
    #[arg(long)]
    rows: Option<u32>,
    /// Square side length.
    #[arg(long)]
    square_size: Option<f64>,
    /// Use every N-th image (default 1 without a config file).
    #[arg(long)]
    interval: Option<u32>,
    /// Images to use (default: all, without a config file).
    #[arg(long)]
    count: Option<usize>,
    #[arg(long, value_enum)]
    model: Option<ModelArg>,
    /// Calibration file to write.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct DictionaryArgs {
    /// Built-in dictionary name.
    #[arg(long, conflicts_with = "dictionary_json")]
    dictionary: Option<String>,
    /// Dictionary JSON file.
    #[arg(long)]
    dictionary_json: Option<PathBuf>,
}

impl DictionaryArgs {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(name) = &self.dictionary {
            cfg.markers.dictionary = name.clone();
            cfg.markers.dictionary_json = None;
        }
        if let Some(path) = &self.dictionary_json {
            cfg.markers.dictionary_json = Some(path.clone());
        }
    }
}

#[derive(Serialize)]
struct PoseReport {
    id: u32,
    rvec: [f64; 3],
    tvec: [f64; 3],
    distance_m: f64,
}

impl From<&MarkerPose> for PoseReport {
    fn from(p: &MarkerPose) -> Self {
        let r = p.pose.rvec();
        let t = p.pose.translation;
        Self {
            id: p.marker.id,
            rvec: [r.x, r.y, r.z],
            tvec: [t.x, t.y, t.z],
            distance_m: t.norm(),
        }
    }
}

fn init_logging(level: LevelFilter) {
    #[cfg(feature = "tracing")]
    {
        let _ = level;
        camgauge::core::init_tracing(false);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = camgauge::core::init_with_level(level);
    }
}

fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    match path {
        Some(p) => Ok(AppConfig::load_json(p)?),
        None => Ok(AppConfig::default()),
    }
}

fn read_points(arg: &str) -> CliResult<Vec<Point3<f64>>> {
    let text = if arg.trim_start().starts_with('[') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).map_err(|e| format!("failed to read {arg}: {e}"))?
    };
    Ok(serde_json::from_str(&text)?)
}

fn run_calibrate(args: &CalibrateArgs, mut cfg: AppConfig, from_file: bool) -> CliResult<()> {
    let source = open_image_sequence(&args.images)?;
    if !from_file {
        cfg.calibration.interval = 1;
        cfg.calibration.target_count = source.len();
    }
    let c = &mut cfg.calibration;
    if let Some(v) = args.cols {
        c.cols = v;
    }
    if let Some(v) = args.rows {
        c.rows = v;
    }
    if let Some(v) = args.square_size {
        c.square_size = v;
    }
    if let Some(v) = args.interval {
        c.interval = v;
    }
    if let Some(v) = args.count {
        c.target_count = v;
    }
    if let Some(m) = args.model {
        c.model = m.into();
    }
    if let Some(p) = &args.output {
        c.output = p.clone();
    }
    let available = source.len() / c.interval.max(1) as usize;
    if c.target_count > available {
        return Err(format!(
            "{} captures requested but only {available} images are available at interval {}",
            c.target_count, c.interval
        )
        .into());
    }

    let mut runner = SessionRunner::new();
    runner.start_calibration(source, &cfg)?;
    let Some(outcome) = runner.join() else {
        return Err("calibration session did not start".into());
    };
    let summary = outcome?;
    let Some(result) = summary.calibration else {
        return Err(format!("calibration failed after {} captures", summary.captured).into());
    };
    println!("rms: {:.6} px over {} views", result.rms, result.extrinsics.len());
    print!("{}", save(&result.intrinsics, &result.distortion));
    info!("written to {}", cfg.calibration.output.display());
    Ok(())
}

fn load_camera(path: &Path) -> CliResult<CameraModel> {
    let (k, d) = read_calibration(path)?;
    Ok(CameraModel::new(k, d))
}

fn try_main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    let mut cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Calibrate(args) => run_calibrate(&args, cfg, cli.config.is_some())?,
        Commands::Undistort {
            calibration,
            input,
            output,
        } => {
            let (k, d) = read_calibration(&calibration)?;
            let frame = image::open(&input)?.to_rgb8();
            undistort(&frame, &k, &d)?.save(&output)?;
            info!("undistorted {} -> {}", input.display(), output.display());
        }
        Commands::DetectMarkers {
            input,
            dictionary,
            annotated,
        } => {
            dictionary.apply(&mut cfg);
            let detector = MarkerDetector::new(cfg.markers.load_dictionary()?, cfg.markers.params.clone())?;
            let frame = image::open(&input)?.to_rgb8();
            let markers = detector.detect_rgb(&frame);
            println!("{}", serde_json::to_string_pretty(&markers)?);
            if let Some(path) = annotated {
                let mut out = frame;
                for m in &markers {
                    draw_marker(&mut out, m);
                }
                out.save(path)?;
            }
        }
        Commands::Pose {
            calibration,
            input,
            marker_size,
            dictionary,
            annotated,
        } => {
            dictionary.apply(&mut cfg);
            if let Some(size) = marker_size {
                cfg.markers.marker_size_m = size;
            }
            cfg.validate()?;
            let camera = load_camera(&calibration)?;
            let detector = MarkerDetector::new(cfg.markers.load_dictionary()?, cfg.markers.params.clone())?;
            let frame = image::open(&input)?.to_rgb8();
            let markers = detector.detect_rgb(&frame);
            let poses = marker_poses(&markers, cfg.markers.marker_size_m, &camera);
            let report: Vec<PoseReport> = poses.iter().map(PoseReport::from).collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if let Some(path) = annotated {
                let mut out = frame;
                for m in &markers {
                    draw_marker(&mut out, m);
                }
                for p in &poses {
                    draw_axes(&mut out, &camera, &p.pose, cfg.markers.marker_size_m);
                }
                out.save(path)?;
            }
        }
        Commands::MeasureDistance { points } => {
            let pts = read_points(&points)?;
            let [a, b] = pts.as_slice() else {
                return Err(format!("a distance needs exactly 2 points, got {}", pts.len()).into());
            };
            println!("{:.2} cm", distance_cm(a, b));
        }
        Commands::MeasureArea { points } => {
            let pts = read_points(&points)?;
            let ratio = cfg.measurement.max_flatness_ratio;
            let signed = polygon_area_signed(&pts, ratio)?;
            info!("signed area {signed:.6} m²");
            println!("{:.2} cm²", polygon_area_cm2(&pts, ratio)?);
        }
        Commands::DefaultConfig { output } => {
            let cfg = AppConfig::default();
            match output {
                Some(path) => cfg.write_json(path)?,
                None => println!("{}", serde_json::to_string_pretty(&cfg)?),
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

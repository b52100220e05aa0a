//! sal360 CLI: saliency estimation and scan-path prediction for 360° panoramas.
//!
//! Usage:
//!   sal360 saliency <INPUT> <OUTPUT>   Estimate a saliency map
//!   sal360 scanpath <INPUT>            Predict observer scan paths
//!   sal360 tiles <INPUT> <DIR>         Export rectilinear tiles and a manifest
//!   sal360 fuse <DIR> <OUTPUT>         Fuse a tile directory back into a map
//!   sal360 heatmap <TRACES> <OUTPUT>   Build a heatmap from head traces
//!
//! Exit codes: 0 on success or a graceful early stop (missing input),
//! 1 when help or version is displayed or a command fails, 255 when media
//! cannot be opened.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use sal360_common::{AppConfig, KernelKind, ModelKind, PipelineConfig, PriorMode, Sal360Error};

mod commands;
mod io;

#[derive(Parser)]
#[command(
    name = "sal360",
    about = "Saliency maps and scan paths for equirectangular 360° images",
    version,
    author
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/sal360/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the saliency map of an equirectangular panorama
    Saliency {
        /// Input panorama (any format the image crate reads)
        input: PathBuf,

        /// Output grayscale saliency image
        output: PathBuf,

        /// Write a JSON run report (status, failures, stage timings)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Also fuse every intermediate feature map into this directory
        #[arg(long)]
        dump_features: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Predict scan paths from a panorama or a precomputed saliency map
    Scanpath {
        /// Input panorama, or saliency map with --from-saliency
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ScanPathFormat,

        /// Treat the input as a grayscale saliency map
        #[arg(long)]
        from_saliency: bool,

        /// Number of simulated observers
        #[arg(long)]
        repetitions: Option<usize>,

        /// Fixations per observer
        #[arg(long)]
        fixations: Option<usize>,

        /// Viewing duration in seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Project a panorama into rectilinear tiles plus manifest.json
    Tiles {
        /// Input panorama
        input: PathBuf,

        /// Output directory
        output: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Compute and back-project a tile directory written by `tiles`
    Fuse {
        /// Directory holding manifest.json and the tile images
        dir: PathBuf,

        /// Output grayscale saliency image
        output: PathBuf,

        /// Write a JSON run report
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Build an attention heatmap from recorded head traces (JSONL)
    Heatmap {
        /// Head-trace file, one observer session per line
        traces: PathBuf,

        /// Output grayscale heatmap image
        output: PathBuf,

        /// Only use traces recorded for this content id
        #[arg(long)]
        content: Option<String>,

        /// Grid columns
        #[arg(long, default_value = "64")]
        cols: usize,

        /// Grid rows
        #[arg(long, default_value = "32")]
        rows: usize,

        /// Gaussian spread around each view centre (degrees)
        #[arg(long, default_value = "0")]
        spread: f64,

        /// Resample traces at this frame rate before counting
        #[arg(long)]
        fps: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScanPathFormat {
    Csv,
    Json,
}

/// Pipeline overrides shared by the estimating subcommands. Unset flags
/// keep the value from the configuration file.
#[derive(Args, Debug, Clone, Default)]
struct PipelineArgs {
    /// Saliency model: contrast, constant, passthrough
    #[arg(short, long)]
    model: Option<ModelKind>,

    /// Worker threads per stage
    #[arg(short, long)]
    threads: Option<usize>,

    /// Tile field of view in degrees
    #[arg(long)]
    fov: Option<f64>,

    /// Tile edge in pixels
    #[arg(long)]
    tile_size: Option<usize>,

    /// Interpolation kernel: nearest, bilinear, bicubic
    #[arg(long)]
    kernel: Option<KernelKind>,

    /// Equator prior: off, fixed, adaptive
    #[arg(long)]
    prior: Option<PriorMode>,

    /// Gaussian blur sigma applied to the fused map (pixels)
    #[arg(long)]
    blur: Option<f64>,

    /// Longest side of the fused map
    #[arg(long)]
    max_dimension: Option<usize>,

    /// Only tile the equator row
    #[arg(long)]
    equatorial_only: bool,
}

impl PipelineArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(model) = self.model {
            config.model.kind = model;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(fov) = self.fov {
            config.field_of_view = fov;
        }
        if self.tile_size.is_some() {
            config.tile_size = self.tile_size;
        }
        if let Some(kernel) = self.kernel {
            config.kernel = kernel;
        }
        if let Some(prior) = self.prior {
            config.prior = prior;
        }
        if let Some(blur) = self.blur {
            config.blur_sigma = blur;
        }
        if let Some(max_dimension) = self.max_dimension {
            config.max_dimension = max_dimension;
        }
        if self.equatorial_only {
            config.equatorial_only = true;
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print().ok();
            return match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => ExitCode::from(1),
                _ => ExitCode::from(2),
            };
        }
    };

    let config = match &cli.config {
        Some(path) => match AppConfig::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {e}", path.display());
                return ExitCode::from(1);
            }
        },
        None => AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose > 0 {
        logging.level = sal360_common::logging::level_for_verbosity(cli.verbose).to_string();
    }
    logging.json |= cli.json_logs;
    sal360_common::logging::init_logging(&logging);

    match dispatch(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => ExitCode::from(exit_status(&e)),
    }
}

fn dispatch(command: Commands, config: AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Saliency {
            input,
            output,
            report,
            dump_features,
            pipeline,
        } => {
            let mut pipeline_config = config.pipeline;
            pipeline.apply(&mut pipeline_config);
            commands::saliency::run(input, output, report, dump_features, pipeline_config)
        }
        Commands::Scanpath {
            input,
            output,
            format,
            from_saliency,
            repetitions,
            fixations,
            duration,
            seed,
            pipeline,
        } => {
            let mut pipeline_config = config.pipeline;
            pipeline.apply(&mut pipeline_config);
            let mut scanpath_config = config.scanpath;
            if let Some(repetitions) = repetitions {
                scanpath_config.experiment_repetition = repetitions;
            }
            if let Some(fixations) = fixations {
                scanpath_config.number_fixations = fixations;
            }
            if let Some(duration) = duration {
                scanpath_config.duration_secs = duration;
            }
            if let Some(seed) = seed {
                scanpath_config.seed = seed;
            }
            commands::scanpath::run(
                input,
                output,
                matches!(format, ScanPathFormat::Json),
                from_saliency,
                pipeline_config,
                scanpath_config,
            )
        }
        Commands::Tiles {
            input,
            output,
            pipeline,
        } => {
            let mut pipeline_config = config.pipeline;
            pipeline.apply(&mut pipeline_config);
            commands::tiles::run(input, output, pipeline_config)
        }
        Commands::Fuse {
            dir,
            output,
            report,
            pipeline,
        } => {
            let mut pipeline_config = config.pipeline;
            pipeline.apply(&mut pipeline_config);
            let kernel_from_manifest = pipeline.kernel.is_none();
            commands::fuse::run(dir, output, report, pipeline_config, kernel_from_manifest)
        }
        Commands::Heatmap {
            traces,
            output,
            content,
            cols,
            rows,
            spread,
            fps,
        } => commands::heatmap::run(traces, output, content, cols, rows, spread, fps),
    }
}

/// Map a command failure to the process exit status.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Sal360Error>() {
        Some(Sal360Error::FileNotFound { path }) => {
            tracing::warn!(path = %path.display(), "input not found, nothing to do");
            eprintln!("Input not found: {}", path.display());
            0
        }
        Some(e) if e.is_media_open() => {
            tracing::error!(error = %e, "media could not be opened");
            eprintln!("Error: {err:#}");
            255
        }
        _ => {
            tracing::error!(error = %err, "command failed");
            eprintln!("Error: {err:#}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_is_a_display_error() {
        let err = match Cli::try_parse_from(["sal360", "--help"]) {
            Err(e) => e,
            Ok(_) => panic!("--help must not parse"),
        };
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_pipeline_flags_override_config() {
        let cli = Cli::try_parse_from([
            "sal360",
            "saliency",
            "in.png",
            "out.png",
            "--model",
            "constant",
            "--threads",
            "2",
            "--kernel",
            "bicubic",
            "--prior",
            "adaptive",
        ])
        .unwrap();

        let Commands::Saliency { pipeline, .. } = cli.command else {
            panic!("expected saliency subcommand");
        };
        let mut config = PipelineConfig::default();
        pipeline.apply(&mut config);
        assert_eq!(config.model.kind, ModelKind::Constant);
        assert_eq!(config.threads, 2);
        assert_eq!(config.kernel, KernelKind::Bicubic);
        assert_eq!(config.prior, PriorMode::Adaptive);
        assert_eq!(config.field_of_view, PipelineConfig::default().field_of_view);
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        assert!(Cli::try_parse_from(["sal360", "saliency", "a", "b", "--model", "dnn"]).is_err());
    }

    #[test]
    fn test_missing_input_exits_gracefully() {
        let err = anyhow::Error::from(Sal360Error::FileNotFound {
            path: PathBuf::from("absent.png"),
        });
        assert_eq!(exit_status(&err), 0);
    }

    #[test]
    fn test_media_open_failure_exits_255() {
        let err = anyhow::Error::from(Sal360Error::MediaOpen {
            path: PathBuf::from("broken.png"),
        })
        .context("loading panorama");
        assert_eq!(exit_status(&err), 255);
    }
}

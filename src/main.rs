//! yiqdiff CLI
//!
//! Exits with 0 when the images match, 21 when their dimensions differ and
//! 22 when pixels differ. Any other failure exits with 1. With `--server` the
//! binary instead answers JSON requests on stdin until stdin closes.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use yiqdiff::{
    BackendPreference, CompareConfig, DEFAULT_THRESHOLD, DiffResult, IgnoreRegion, OverlayStyle,
    Pixel, codec,
};

const EXIT_LAYOUT_DIFF: u8 = 21;
const EXIT_PIXEL_DIFF: u8 = 22;

#[derive(Debug, Parser)]
#[command(name = "yiqdiff", version)]
#[command(about = "Perceptual pixel-by-pixel image comparison", long_about = None)]
struct Cli {
    /// Baseline image
    #[arg(required_unless_present = "server")]
    base: Option<PathBuf>,
    /// Image compared against the baseline
    #[arg(required_unless_present = "server")]
    compare: Option<PathBuf>,
    /// Where to write the diff image when the inputs differ
    diff_output: Option<PathBuf>,

    /// Color difference threshold from 0 to 1. Lower is stricter
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Highlight color for differing pixels (#rrggbb or #rrggbbaa)
    #[arg(long, default_value = "#ff0000")]
    diff_color: Pixel,

    /// Draw only the differing pixels on a transparent background
    #[arg(long, conflicts_with = "diff_overlay")]
    diff_mask: bool,

    /// Draw differences over the base image faded toward white
    /// (`--diff-overlay` or `--diff-overlay=FACTOR`)
    #[arg(
        long,
        value_name = "FACTOR",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "0.5"
    )]
    diff_overlay: Option<f32>,

    /// Regions excluded from comparison, as x1:y1-x2:y2 (comma separated)
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<IgnoreRegion>,

    /// Report the rows that contain differences
    #[arg(long)]
    output_diff_lines: bool,

    /// Print `count;percentage[;lines]` instead of a human-readable report
    #[arg(long)]
    parsable_stdout: bool,

    /// Use the scalar reference kernel
    #[arg(long)]
    scalar: bool,

    /// Compare on a single thread
    #[arg(long)]
    no_parallel: bool,

    /// Serve line-delimited JSON comparison requests on stdin
    #[arg(long, conflicts_with_all = ["base", "compare", "diff_output", "parsable_stdout"])]
    server: bool,
}

impl Cli {
    fn compare_config(&self) -> CompareConfig {
        let backend = if self.scalar {
            BackendPreference::Scalar
        } else {
            BackendPreference::Auto
        };
        let mut config = CompareConfig::default()
            .with_threshold(self.threshold)
            .with_diff_color(self.diff_color)
            .with_ignore_regions(self.ignore.iter().copied())
            .with_diff_lines(self.output_diff_lines)
            .with_backend(backend)
            .with_parallel(!self.no_parallel);
        config.overlay_style = if self.diff_mask {
            OverlayStyle::Mask
        } else if let Some(factor) = self.diff_overlay {
            OverlayStyle::Shaded(factor)
        } else {
            OverlayStyle::Base
        };
        config
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if cli.server {
        let stdin = std::io::stdin();
        return match yiqdiff::server::serve(stdin.lock(), std::io::stdout().lock()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("Error: server stream failed: {err}");
                ExitCode::FAILURE
            }
        };
    }

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let (Some(base), Some(compare)) = (&cli.base, &cli.compare) else {
        bail!("both BASE and COMPARE images are required");
    };
    let config = cli.compare_config();
    let result = match codec::compare_files(base, compare, cli.diff_output.as_deref(), &config) {
        Ok(result) => result,
        Err(err) if err.is_layout_mismatch() => {
            if !cli.parsable_stdout {
                println!("Failure! Images have different layout: {err}");
            }
            return Ok(ExitCode::from(EXIT_LAYOUT_DIFF));
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!(
                    "failed to compare {} with {}",
                    base.display(),
                    compare.display()
                )
            });
        }
    };

    if result.is_match() {
        if !cli.parsable_stdout {
            println!("Success! Images are equal.");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if cli.parsable_stdout {
        println!("{}", parsable_report(&result));
    } else {
        println!(
            "Failure! Images are different.\nDifferent pixels: {} ({:.2}%)",
            result.differing_pixels,
            result.diff_percentage()
        );
        if let Some(lines) = &result.diff_lines {
            println!("Lines with differences: {}", join_lines(lines));
        }
        if let Some(path) = &cli.diff_output {
            println!("Diff output created: {}", path.display());
        }
    }
    Ok(ExitCode::from(EXIT_PIXEL_DIFF))
}

fn parsable_report(result: &DiffResult) -> String {
    let mut report = format!("{};{:.2}", result.differing_pixels, result.diff_percentage());
    if let Some(lines) = &result.diff_lines {
        report.push(';');
        report.push_str(&join_lines(lines));
    }
    report
}

fn join_lines(lines: &[u32]) -> String {
    lines
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use yiqdiff::KernelBackend;

    #[test]
    fn flags_map_onto_the_compare_config() {
        let cli = Cli::try_parse_from([
            "yiqdiff",
            "a.png",
            "b.png",
            "diff.png",
            "--threshold=0.3",
            "--diff-color=#00ff00",
            "--diff-overlay",
            "--ignore=0:0-4:4,10:10-12:20",
            "--output-diff-lines",
            "--scalar",
        ])
        .unwrap();
        let config = cli.compare_config();

        assert_eq!(config.threshold, 0.3);
        assert_eq!(config.diff_color, Pixel::from_rgba(0, 255, 0, 255));
        assert_eq!(config.overlay_style, OverlayStyle::Shaded(0.5));
        assert_eq!(config.ignore_regions.len(), 2);
        assert!(config.capture_diff_lines);
        assert_eq!(config.backend, BackendPreference::Scalar);
        assert!(config.parallel);
    }

    #[test]
    fn mask_conflicts_with_overlay() {
        let parsed = Cli::try_parse_from(["yiqdiff", "a.png", "b.png", "--diff-mask", "--diff-overlay"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn bare_overlay_flag_does_not_consume_the_paths() {
        let cli = Cli::try_parse_from(["yiqdiff", "--diff-overlay", "a.png", "b.png"]).unwrap();
        assert_eq!(cli.base, Some(PathBuf::from("a.png")));
        assert_eq!(cli.compare, Some(PathBuf::from("b.png")));
        assert_eq!(cli.compare_config().overlay_style, OverlayStyle::Shaded(0.5));

        let cli = Cli::try_parse_from(["yiqdiff", "--diff-overlay=0.2", "a.png", "b.png"]).unwrap();
        assert_eq!(cli.compare_config().overlay_style, OverlayStyle::Shaded(0.2));
    }

    #[test]
    fn server_mode_needs_no_paths() {
        let cli = Cli::try_parse_from(["yiqdiff", "--server"]).unwrap();
        assert!(cli.server);
        assert!(cli.base.is_none());

        assert!(Cli::try_parse_from(["yiqdiff", "a.png"]).is_err());
        assert!(Cli::try_parse_from(["yiqdiff", "--server", "a.png", "b.png"]).is_err());
    }

    #[test]
    fn parsable_report_appends_lines_only_when_captured() {
        let mut result = DiffResult {
            differing_pixels: 3,
            total_pixels: 200,
            overlay: None,
            diff_lines: None,
            backend: KernelBackend::Scalar,
        };
        assert_eq!(parsable_report(&result), "3;1.50");
        result.diff_lines = Some(vec![2, 9]);
        assert_eq!(parsable_report(&result), "3;1.50;2,9");
    }
}

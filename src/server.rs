//! Line-oriented JSON server for running many comparisons in one process.
//!
//! The server writes `{"ready":true}` once, then answers every request line
//! read from the input with exactly one response line. Requests look like
//!
//! ```text
//! {"requestId":1,"base":"a.png","compare":"b.png","output":"diff.png",
//!  "options":{"threshold":0.1,"captureDiffLines":true}}
//! ```
//!
//! and responses carry the same `requestId` plus `match` and, for a
//! mismatch, a `reason` of `layout-diff`, `pixel-diff`, `file-not-exists`
//! or `error`. Malformed lines get an `error` response instead of ending the
//! session; the loop stops at end of input.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec;
use crate::config::{CompareConfig, DEFAULT_SHADE_FACTOR, IgnoreRegion, OverlayStyle};
use crate::compare::DiffResult;
use crate::error::CompareResult;
use crate::pixel::Pixel;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerRequest {
    #[serde(default)]
    request_id: Value,
    base: PathBuf,
    compare: PathBuf,
    #[serde(default)]
    output: Option<PathBuf>,
    #[serde(default)]
    options: Option<RequestOptions>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RequestOptions {
    threshold: Option<f64>,
    diff_color: Option<String>,
    output_diff_mask: bool,
    diff_overlay: Option<OverlayOption>,
    /// Layout differences always end the comparison; accepted for
    /// compatibility.
    fail_on_layout_diff: bool,
    no_fail_on_fs_errors: bool,
    /// Anti-aliased pixels are classified like any other pixel.
    antialiasing: bool,
    capture_diff_lines: bool,
    reduce_ram_usage: bool,
    ignore_regions: Vec<RegionOption>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(untagged)]
enum OverlayOption {
    Enabled(bool),
    Factor(f32),
}

#[derive(Clone, Copy, Debug, Deserialize)]
struct RegionOption {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

impl RequestOptions {
    fn to_config(&self) -> CompareResult<CompareConfig> {
        let mut config = CompareConfig::default().with_diff_lines(self.capture_diff_lines);
        if let Some(threshold) = self.threshold {
            config = config.with_threshold(threshold);
        }
        if let Some(color) = &self.diff_color {
            config = config.with_diff_color(Pixel::from_hex(color)?);
        }
        let regions = self
            .ignore_regions
            .iter()
            .map(|r| IgnoreRegion::new(r.x1, r.y1, r.x2, r.y2))
            .collect::<CompareResult<Vec<_>>>()?;
        config = config.with_ignore_regions(regions);

        config.overlay_style = if self.output_diff_mask {
            OverlayStyle::Mask
        } else {
            match self.diff_overlay {
                Some(OverlayOption::Enabled(true)) => OverlayStyle::Shaded(DEFAULT_SHADE_FACTOR),
                Some(OverlayOption::Factor(factor)) => OverlayStyle::Shaded(factor),
                Some(OverlayOption::Enabled(false)) | None => OverlayStyle::Base,
            }
        };

        if self.antialiasing || self.reduce_ram_usage || self.fail_on_layout_diff {
            log::trace!(
                "accepted options without effect: antialiasing={} reduceRamUsage={} failOnLayoutDiff={}",
                self.antialiasing,
                self.reduce_ram_usage,
                self.fail_on_layout_diff
            );
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerResponse {
    request_id: Value,
    #[serde(rename = "match")]
    is_match: bool,
    #[serde(flatten)]
    mismatch: Option<Mismatch>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum Mismatch {
    LayoutDiff,
    PixelDiff {
        diff_count: u64,
        diff_percentage: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        diff_lines: Option<Vec<u32>>,
    },
    FileNotExists {
        file: PathBuf,
    },
    Error {
        message: String,
    },
}

impl ServerResponse {
    fn matched(request_id: Value) -> Self {
        Self {
            request_id,
            is_match: true,
            mismatch: None,
        }
    }

    fn mismatch(request_id: Value, mismatch: Mismatch) -> Self {
        Self {
            request_id,
            is_match: false,
            mismatch: Some(mismatch),
        }
    }
}

/// Serve requests from `input` until it is exhausted, writing one JSON
/// response per request line to `output`. Only I/O failures on the two
/// streams end the loop early.
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> io::Result<()> {
    writeln!(output, "{}", serde_json::json!({ "ready": true }))?;
    output.flush()?;

    let mut served = 0u64;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&line);
        serde_json::to_writer(&mut output, &response)?;
        writeln!(output)?;
        output.flush()?;
        served += 1;
    }
    log::debug!("server input closed after {served} request(s)");
    Ok(())
}

fn handle_line(line: &str) -> ServerResponse {
    match serde_json::from_str::<ServerRequest>(line) {
        Ok(request) => handle_request(request),
        Err(err) => {
            // Echo the id when the line is valid JSON with the wrong shape.
            let request_id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|value| value.get("requestId").cloned())
                .unwrap_or(Value::Null);
            log::warn!("rejecting malformed request: {err}");
            ServerResponse::mismatch(
                request_id,
                Mismatch::Error {
                    message: format!("malformed request: {err}"),
                },
            )
        }
    }
}

fn handle_request(request: ServerRequest) -> ServerResponse {
    let ServerRequest {
        request_id,
        base,
        compare,
        output,
        options,
    } = request;
    let options = options.unwrap_or_default();

    if options.no_fail_on_fs_errors
        && let Some(missing) = [&base, &compare].into_iter().find(|path| !path.is_file())
    {
        return ServerResponse::mismatch(
            request_id,
            Mismatch::FileNotExists {
                file: missing.clone(),
            },
        );
    }

    match run_comparison(&base, &compare, output.as_deref(), &options) {
        Ok(result) if result.is_match() => ServerResponse::matched(request_id),
        Ok(result) => ServerResponse::mismatch(
            request_id,
            Mismatch::PixelDiff {
                diff_count: result.differing_pixels,
                diff_percentage: result.diff_percentage(),
                diff_lines: result.diff_lines,
            },
        ),
        Err(err) if err.is_layout_mismatch() => {
            ServerResponse::mismatch(request_id, Mismatch::LayoutDiff)
        }
        Err(err) => ServerResponse::mismatch(
            request_id,
            Mismatch::Error {
                message: err.to_string(),
            },
        ),
    }
}

fn run_comparison(
    base: &Path,
    compare: &Path,
    output: Option<&Path>,
    options: &RequestOptions,
) -> CompareResult<DiffResult> {
    let config = options.to_config()?;
    codec::compare_files(base, compare, output, &config)
}

use std::collections::HashMap;
use std::fs;
use std::hint::black_box;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use yiqdiff::{BackendPreference, CompareConfig, ImageBuffer, OverlayStyle, Pixel, compare};

const DEFAULT_WARMUP_ITERS: usize = 8;
const DEFAULT_MEASURE_ITERS: usize = 80;
const DEFAULT_MAX_REGRESSION_PCT: f64 = 8.0;
const BASELINE_HEADER: &str = "scenario,avg_ms,p50_ms,p95_ms,min_ms,max_ms,mpix_per_s";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Metric {
    Avg,
    #[default]
    P50,
    P95,
}

impl Metric {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "avg" | "mean" => Some(Self::Avg),
            "p50" | "median" => Some(Self::P50),
            "p95" => Some(Self::P95),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::P50 => "p50",
            Self::P95 => "p95",
        }
    }

    fn pick(self, stats: &Stats) -> f64 {
        match self {
            Self::Avg => stats.avg_ms,
            Self::P50 => stats.p50_ms,
            Self::P95 => stats.p95_ms,
        }
    }
}

#[derive(Clone, Debug)]
struct Options {
    warmup_iters: usize,
    measure_iters: usize,
    filter: Option<String>,
    baseline: Option<PathBuf>,
    save_baseline: Option<PathBuf>,
    max_regression_pct: f64,
    metric: Metric,
}

/// How the candidate image deviates from the base.
#[derive(Clone, Copy, Debug)]
enum Damage {
    None,
    /// One changed pixel every `stride` pixels.
    Sparse { stride: usize },
    /// Every pixel changed.
    Dense,
}

#[derive(Clone, Copy, Debug)]
struct Scenario {
    name: &'static str,
    width: u32,
    height: u32,
    damage: Damage,
    overlay: bool,
}

#[derive(Clone, Debug, Default)]
struct Stats {
    avg_ms: f64,
    p50_ms: f64,
    p95_ms: f64,
    min_ms: f64,
    max_ms: f64,
    mpix_per_s: f64,
}

fn next_value<'a>(args: &'a [String], index: usize, flag: &str) -> Result<&'a str> {
    args.get(index + 1)
        .map(String::as_str)
        .with_context(|| format!("{flag} requires a value"))
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        warmup_iters: DEFAULT_WARMUP_ITERS,
        measure_iters: DEFAULT_MEASURE_ITERS,
        filter: None,
        baseline: None,
        save_baseline: None,
        max_regression_pct: DEFAULT_MAX_REGRESSION_PCT,
        metric: Metric::default(),
    };

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1usize;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--warmup" => {
                let raw = next_value(&args, i, flag)?;
                options.warmup_iters = raw
                    .parse()
                    .with_context(|| format!("invalid {flag} value: {raw}"))?;
            }
            "--iters" => {
                let raw = next_value(&args, i, flag)?;
                options.measure_iters = raw
                    .parse()
                    .with_context(|| format!("invalid {flag} value: {raw}"))?;
            }
            "--scenario" => {
                let raw = next_value(&args, i, flag)?.trim();
                options.filter = (!raw.is_empty() && !raw.eq_ignore_ascii_case("all"))
                    .then(|| raw.to_ascii_lowercase());
            }
            "--baseline" => options.baseline = Some(PathBuf::from(next_value(&args, i, flag)?)),
            "--save-baseline" => {
                options.save_baseline = Some(PathBuf::from(next_value(&args, i, flag)?));
            }
            "--max-regression-pct" => {
                let raw = next_value(&args, i, flag)?;
                options.max_regression_pct = raw
                    .parse()
                    .with_context(|| format!("invalid {flag} value: {raw}"))?;
            }
            "--metric" => {
                let raw = next_value(&args, i, flag)?;
                options.metric = Metric::parse(raw)
                    .with_context(|| format!("invalid --metric {raw}; use avg, p50 or p95"))?;
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run --release --example diff_benchmark -- [options]
  --warmup <n>               Warmup iterations per scenario (default: {DEFAULT_WARMUP_ITERS})
  --iters <n>                Measured iterations per scenario (default: {DEFAULT_MEASURE_ITERS})
  --scenario <name|all>      Scenario filter, matched against the name prefix (default: all)
  --baseline <path>          Compare this run against a baseline CSV
  --save-baseline <path>     Write this run as a baseline CSV
  --max-regression-pct <f>   Allowed slowdown vs baseline (default: {DEFAULT_MAX_REGRESSION_PCT})
  --metric <m>               Metric for the regression gate: avg | p50 | p95 (default: p50)

Every scenario runs once on the detected kernel and once on the scalar kernel.
Set YIQDIFF_DISABLE_PARALLEL=1 to measure a single band."
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
        i += 2;
    }

    if options.warmup_iters == 0 || options.measure_iters == 0 {
        bail!("--warmup and --iters must be >= 1");
    }
    if !options.max_regression_pct.is_finite() || options.max_regression_pct < 0.0 {
        bail!("--max-regression-pct must be a finite value >= 0");
    }
    if let (Some(baseline), Some(save)) = (&options.baseline, &options.save_baseline)
        && baseline == save
    {
        bail!("--baseline and --save-baseline must point to different files");
    }
    Ok(options)
}

fn scenario_catalog() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "identical_4k",
            width: 3840,
            height: 2160,
            damage: Damage::None,
            overlay: false,
        },
        Scenario {
            name: "sparse_4k",
            width: 3840,
            height: 2160,
            damage: Damage::Sparse { stride: 4099 },
            overlay: false,
        },
        Scenario {
            name: "sparse_overlay_1080p",
            width: 1920,
            height: 1080,
            damage: Damage::Sparse { stride: 257 },
            overlay: true,
        },
        Scenario {
            name: "dense_1080p",
            width: 1920,
            height: 1080,
            damage: Damage::Dense,
            overlay: false,
        },
    ]
}

fn noise_pixels(len: usize, seed: u64) -> Vec<Pixel> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            Pixel::from_word((state >> 32) as u32 | 0xFF00_0000)
        })
        .collect()
}

fn build_inputs(scenario: Scenario) -> Result<(ImageBuffer, ImageBuffer)> {
    let len = scenario.width as usize * scenario.height as usize;
    let base_pixels = noise_pixels(len, 0x9e37_79b9_7f4a_7c15);
    let mut candidate_pixels = base_pixels.clone();
    match scenario.damage {
        Damage::None => {}
        Damage::Sparse { stride } => {
            for pixel in candidate_pixels.iter_mut().step_by(stride) {
                *pixel = Pixel::from_word(!pixel.word() | 0xFF00_0000);
            }
        }
        Damage::Dense => candidate_pixels = noise_pixels(len, 0x2545_f491_4f6c_dd1d),
    }
    let base = ImageBuffer::new(scenario.width, scenario.height, base_pixels)?;
    let candidate = ImageBuffer::new(scenario.width, scenario.height, candidate_pixels)?;
    Ok((base, candidate))
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx]
}

fn measure(
    base: &ImageBuffer,
    candidate: &ImageBuffer,
    config: &CompareConfig,
    options: &Options,
) -> Result<Stats> {
    for _ in 0..options.warmup_iters {
        black_box(compare(black_box(base), black_box(candidate), config)?);
    }

    let mut samples = Vec::with_capacity(options.measure_iters);
    for _ in 0..options.measure_iters {
        let started = Instant::now();
        let result = compare(black_box(base), black_box(candidate), config)?;
        samples.push(started.elapsed().as_secs_f64() * 1000.0);
        black_box(result);
    }

    let avg_ms = samples.iter().sum::<f64>() / samples.len() as f64;
    samples.sort_by(f64::total_cmp);
    let megapixels = base.pixel_count() as f64 / 1_000_000.0;
    Ok(Stats {
        avg_ms,
        p50_ms: percentile(&samples, 0.50),
        p95_ms: percentile(&samples, 0.95),
        min_ms: samples.first().copied().unwrap_or_default(),
        max_ms: samples.last().copied().unwrap_or_default(),
        mpix_per_s: if avg_ms > 0.0 {
            megapixels / (avg_ms / 1000.0)
        } else {
            0.0
        },
    })
}

fn load_baseline(path: &PathBuf) -> Result<HashMap<String, Stats>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read baseline file {}", path.display()))?;
    let mut lines = text.lines();
    let header = lines.next().context("baseline file is empty")?;
    if header.trim() != BASELINE_HEADER {
        bail!("unexpected baseline header `{header}`, expected `{BASELINE_HEADER}`");
    }

    let mut out = HashMap::new();
    for (offset, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        let [name, avg, p50, p95, min, max, rate] = columns[..] else {
            bail!("invalid baseline line {}: {line}", offset + 2);
        };
        let number = |raw: &str| {
            raw.parse::<f64>()
                .with_context(|| format!("invalid number `{raw}` on baseline line {}", offset + 2))
        };
        out.insert(
            name.to_string(),
            Stats {
                avg_ms: number(avg)?,
                p50_ms: number(p50)?,
                p95_ms: number(p95)?,
                min_ms: number(min)?,
                max_ms: number(max)?,
                mpix_per_s: number(rate)?,
            },
        );
    }
    Ok(out)
}

fn save_baseline(path: &PathBuf, results: &[(String, Stats)]) -> Result<()> {
    let mut out = format!("{BASELINE_HEADER}\n");
    for (name, stats) in results {
        out.push_str(&format!(
            "{name},{:.6},{:.6},{:.6},{:.6},{:.6},{:.3}\n",
            stats.avg_ms, stats.p50_ms, stats.p95_ms, stats.min_ms, stats.max_ms, stats.mpix_per_s,
        ));
    }
    fs::write(path, out).with_context(|| format!("failed to write baseline file {}", path.display()))
}

fn check_regression(
    baseline: &HashMap<String, Stats>,
    results: &[(String, Stats)],
    options: &Options,
) -> Result<()> {
    let regressions: Vec<String> = results
        .iter()
        .filter_map(|(name, stats)| {
            let before = options.metric.pick(baseline.get(name)?);
            if before <= 0.0 {
                return None;
            }
            let after = options.metric.pick(stats);
            let delta_pct = (after - before) / before * 100.0;
            (delta_pct > options.max_regression_pct).then(|| {
                format!(
                    "{name} {} regressed by {delta_pct:.2}% ({before:.3} ms -> {after:.3} ms)",
                    options.metric.as_str()
                )
            })
        })
        .collect();

    if regressions.is_empty() {
        return Ok(());
    }
    bail!("performance regression detected:\n{}", regressions.join("\n"))
}

fn main() -> Result<()> {
    let options = parse_args()?;
    let scenarios: Vec<Scenario> = scenario_catalog()
        .into_iter()
        .filter(|scenario| {
            options
                .filter
                .as_ref()
                .is_none_or(|needle| scenario.name.starts_with(needle.as_str()))
        })
        .collect();
    if scenarios.is_empty() {
        bail!("no scenarios matched the requested filter");
    }

    yiqdiff::warmup();
    println!(
        "Running diff benchmark: warmup={} iters={} detected_backend={}",
        options.warmup_iters,
        options.measure_iters,
        yiqdiff::kernel::active_backend(),
    );

    let mut results = Vec::new();
    for scenario in scenarios {
        let (base, candidate) = build_inputs(scenario)?;
        for preference in [BackendPreference::Auto, BackendPreference::Scalar] {
            let mut config = CompareConfig::default().with_backend(preference);
            if scenario.overlay {
                config = config.with_overlay(OverlayStyle::Mask);
            }
            let backend = yiqdiff::kernel::resolve_backend(preference);
            let name = format!("{}/{}", scenario.name, backend);
            if results.iter().any(|(existing, _)| existing == &name) {
                continue;
            }
            println!("Benchmarking {name}...");
            results.push((name, measure(&base, &candidate, &config, &options)?));
        }
    }

    println!(
        "{:<32} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "scenario", "avg_ms", "p50_ms", "p95_ms", "min_ms", "max_ms", "Mpix/s"
    );
    for (name, stats) in &results {
        println!(
            "{name:<32} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.1}",
            stats.avg_ms, stats.p50_ms, stats.p95_ms, stats.min_ms, stats.max_ms, stats.mpix_per_s
        );
    }

    if let Some(path) = &options.save_baseline {
        save_baseline(path, &results)?;
        println!("Saved baseline to {}", path.display());
    }
    if let Some(path) = &options.baseline {
        check_regression(&load_baseline(path)?, &results, &options)?;
        println!(
            "Regression check passed ({}, limit {:.2}%)",
            options.metric.as_str(),
            options.max_regression_pct
        );
    }
    Ok(())
}

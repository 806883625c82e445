use std::sync::OnceLock;

use crate::env_config::{MAX_WORKERS_VAR, env_var_positive_u64};

/// Pre-initialize the band thread pool so the first large comparison
/// doesn't pay the pool-creation cost. Only the first call has any effect.
pub(crate) fn warmup_pool(max_workers: usize) {
    install_scan_pool(max_workers, || {});
}

#[inline(always)]
pub(crate) fn should_parallelize(
    pixel_count: usize,
    min_pixels: usize,
    min_chunk_pixels: usize,
    max_workers: usize,
) -> bool {
    let workers = scan_workers(max_workers);
    if workers <= 1 {
        return false;
    }
    let min_chunk_total = min_chunk_pixels.saturating_mul(workers);
    pixel_count >= min_pixels.max(min_chunk_total)
}

/// Rows per band so each worker gets at least `min_chunk_pixels`, or `None`
/// when the image would not split into two or more bands.
#[inline]
pub(crate) fn band_rows(
    width: usize,
    height: usize,
    min_chunk_pixels: usize,
    max_workers: usize,
) -> Option<usize> {
    if width == 0 {
        return None;
    }
    let workers = scan_workers(max_workers);
    let rows = height / workers;
    if rows.saturating_mul(width) < min_chunk_pixels {
        return None;
    }
    let rows = rows.max(1);
    if height.div_ceil(rows) < 2 {
        return None;
    }
    Some(rows)
}

/// Usable worker count: available parallelism, capped by `max_workers` and
/// by the `YIQDIFF_MAX_WORKERS` override.
#[inline]
pub(crate) fn scan_workers(max_workers: usize) -> usize {
    static WORKERS: OnceLock<usize> = OnceLock::new();
    let available = *WORKERS.get_or_init(|| {
        let detected = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        match env_var_positive_u64(MAX_WORKERS_VAR) {
            Some(cap) => detected.min(usize::try_from(cap).unwrap_or(usize::MAX)),
            None => detected,
        }
    });
    available.min(max_workers.max(1))
}

/// Run `job` inside the dedicated band pool, or inline when the machine
/// offers a single worker or the pool could not be built.
#[inline]
pub(crate) fn install_scan_pool<F, R>(max_workers: usize, job: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    static POOL: OnceLock<Option<rayon::ThreadPool>> = OnceLock::new();
    if let Some(pool) = POOL
        .get_or_init(|| {
            let workers = scan_workers(max_workers);
            if workers <= 1 {
                return None;
            }
            match rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|index| format!("yiqdiff-band-{index}"))
                .build()
            {
                Ok(pool) => {
                    log::debug!("started band pool with {workers} workers");
                    Some(pool)
                }
                Err(err) => {
                    log::warn!("band pool unavailable, scanning inline: {err}");
                    None
                }
            }
        })
        .as_ref()
    {
        pool.install(job)
    } else {
        job()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_images_are_never_banded() {
        assert!(!should_parallelize(1_000, 262_144, 65_536, 16));
        assert_eq!(band_rows(10, 10, 65_536, 16), None);
    }

    #[test]
    fn bands_cover_the_whole_image() {
        if scan_workers(16) <= 1 {
            return;
        }
        let (width, height) = (4_096, 2_160);
        let rows = band_rows(width, height, 1_024, 16).expect("4K image should split");
        assert!(rows >= 1);
        assert!(height.div_ceil(rows) >= 2);
        assert!(rows * width >= 1_024);
    }

    #[test]
    fn inline_fallback_returns_the_job_result() {
        assert_eq!(install_scan_pool(1, || 7 * 6), 42);
    }
}

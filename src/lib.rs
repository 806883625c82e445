pub mod codec;
pub mod compare;
pub mod config;
pub(crate) mod env_config;
pub mod error;
pub mod image_buffer;
pub mod kernel;
pub mod pixel;
pub mod server;

use std::path::Path;

use error::CompareResult;

pub use codec::{DecodeLimits, decode, decode_bytes, encode};
pub use compare::{DiffResult, compare};
pub use config::{
    BackendPreference, CompareConfig, DEFAULT_THRESHOLD, IgnoreRegion, OverlayStyle,
    parse_ignore_regions,
};
pub use error::{DiffError, DiffErrorClass};
pub use image_buffer::ImageBuffer;
pub use kernel::{KernelBackend, warmup};
pub use pixel::Pixel;

/// Compare two image files with the default configuration.
pub fn compare_paths(base: impl AsRef<Path>, candidate: impl AsRef<Path>) -> CompareResult<DiffResult> {
    codec::compare_files(base, candidate, None, &CompareConfig::default())
}

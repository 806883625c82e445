use std::fmt;

#[derive(Debug)]
pub enum DiffError {
    /// The two images do not share the same layout. Contains the base and
    /// candidate dimensions as `(width, height)`.
    DimensionMismatch {
        base: (u32, u32),
        candidate: (u32, u32),
    },

    InvalidConfig(String),

    InvalidBuffer(String),

    BufferOverflow,

    /// An overlay or decode buffer of the given byte size could not be
    /// allocated. Never degraded to a smaller buffer.
    AllocationFailure(usize),

    UnsupportedFormat(String),

    Decode(anyhow::Error),

    Encode(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffErrorClass {
    InvalidInput,
    LayoutMismatch,
    Unsupported,
    Codec,
    Fatal,
}

impl DiffError {
    pub fn class(&self) -> DiffErrorClass {
        match self {
            Self::InvalidConfig(_) | Self::InvalidBuffer(_) => DiffErrorClass::InvalidInput,
            Self::DimensionMismatch { .. } => DiffErrorClass::LayoutMismatch,
            Self::UnsupportedFormat(_) => DiffErrorClass::Unsupported,
            Self::Decode(_) | Self::Encode(_) => DiffErrorClass::Codec,
            Self::BufferOverflow | Self::AllocationFailure(_) => DiffErrorClass::Fatal,
        }
    }

    pub fn is_layout_mismatch(&self) -> bool {
        matches!(self.class(), DiffErrorClass::LayoutMismatch)
    }
}

impl fmt::Display for DiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { base, candidate } => write!(
                f,
                "image dimensions differ: base is {}x{}, candidate is {}x{}",
                base.0, base.1, candidate.0, candidate.1
            ),
            Self::InvalidConfig(message) => write!(f, "invalid compare configuration: {message}"),
            Self::InvalidBuffer(message) => write!(f, "invalid image buffer: {message}"),
            Self::BufferOverflow => write!(f, "image buffer size overflow"),
            Self::AllocationFailure(bytes) => {
                write!(f, "failed to allocate {bytes} bytes for image buffer")
            }
            Self::UnsupportedFormat(name) => write!(f, "unsupported image format: {name}"),
            Self::Decode(inner) => write!(f, "failed to decode image: {inner:#}"),
            Self::Encode(inner) => write!(f, "failed to encode image: {inner:#}"),
        }
    }
}

impl std::error::Error for DiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(inner) | Self::Encode(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

pub type CompareResult<T> = Result<T, DiffError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_is_layout_class() {
        let err = DiffError::DimensionMismatch {
            base: (10, 10),
            candidate: (10, 11),
        };
        assert!(err.is_layout_mismatch());
        assert_eq!(
            err.to_string(),
            "image dimensions differ: base is 10x10, candidate is 10x11"
        );
    }

    #[test]
    fn codec_errors_expose_source() {
        use std::error::Error;

        let err = DiffError::Decode(anyhow::anyhow!("truncated IDAT"));
        assert_eq!(err.class(), DiffErrorClass::Codec);
        assert!(err.source().is_some());
        assert!(DiffError::BufferOverflow.source().is_none());
    }
}

use thiserror::Error;

/// Errors that can occur while editing a [`Document`](crate::document::Document).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("offset {offset} is out of bounds (document has {len} chars)")]
    OutOfBounds { offset: usize, len: usize },

    #[error("invalid change range {from}..{to}")]
    InvalidRange { from: usize, to: usize },

    #[error("changes overlap at offset {0}")]
    OverlappingChanges(usize),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_displays_offset_and_len() {
        let err = CoreError::OutOfBounds { offset: 12, len: 10 };
        assert_eq!(
            err.to_string(),
            "offset 12 is out of bounds (document has 10 chars)"
        );
    }

    #[test]
    fn invalid_range_displays_correctly() {
        let err = CoreError::InvalidRange { from: 10, to: 5 };
        assert_eq!(err.to_string(), "invalid change range 10..5");
    }

    #[test]
    fn overlapping_changes_displays_offset() {
        let err = CoreError::OverlappingChanges(3);
        assert_eq!(err.to_string(), "changes overlap at offset 3");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CoreError = io_err.into();
        assert!(err.to_string().contains("file I/O error"));
    }
}

/*!
    Errors raised while opening and decoding media.
*/

use thiserror::Error;

/**
    Failure of a media source.

    Any of these ends the playback session; the pipeline maps
    [`Error::UnsupportedFormat`] to its own variant so callers can tell a
    file they cannot play from one that broke halfway through.
*/
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The demuxer or a decoder rejected the stream
    #[error("codec error: {message}")]
    Codec { message: String },
    /// Decoded data did not have the promised shape
    #[error("invalid data: {message}")]
    InvalidData { message: String },
    /// Valid media in a sample or pixel format the player cannot handle
    #[error("unsupported format: {message}")]
    UnsupportedFormat { message: String },
}

impl Error {
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn messages_name_the_kind() {
        assert_eq!(
            Error::codec("decode failed").to_string(),
            "codec error: decode failed"
        );
        assert_eq!(
            Error::unsupported_format("sample format dblp").to_string(),
            "unsupported format: sample format dblp"
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        let e: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.mp4").into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.source().is_some());
        assert!(e.to_string().contains("missing.mp4"));
    }

    #[test]
    fn unsupported_format_is_distinguishable() {
        assert!(Error::unsupported_format("x").is_unsupported_format());
        assert!(!Error::invalid_data("x").is_unsupported_format());
    }
}

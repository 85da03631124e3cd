use thiserror::Error;

/// Errors produced while building, writing or reading a book.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt, truncated or oversized archive.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A required file or element of the package is missing.
    #[error("Invalid package structure: {0}")]
    PackageStructure(String),

    #[error("Cannot infer media type for {0}")]
    TypeInference(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Duplicate item id: {0}")]
    DuplicateId(String),

    #[error("Invalid spine entry: {0}")]
    InvalidSpine(String),

    /// Returned by a [`Plugin`](crate::epub::Plugin) and passed through unchanged.
    #[error(transparent)]
    Hook(Box<dyn std::error::Error + Send + Sync>),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid MOBI format: {0}")]
    InvalidMobi(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures of the output sink itself rather than of the book.
    pub(crate) fn is_sink_failure(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Archive(zip::result::ZipError::Io(_)) => true,
            _ => false,
        }
    }
}

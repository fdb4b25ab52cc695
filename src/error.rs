use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the converter can report.
///
/// Only `EmptyDocument`, `InvalidConfig`, `Io` and `Zip` ever abort a
/// conversion. The rest are recovered where they happen and collected in
/// [`crate::Conversion::recovered`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid length `{0}`")]
    InvalidUnit(String),

    #[error("invalid color `{0}`")]
    InvalidColor(String),

    #[error("malformed declaration `{0}`")]
    MalformedDeclaration(String),

    #[error("unbalanced structure: {0}")]
    UnbalancedStructure(String),

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("document has no content")]
    EmptyDocument,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

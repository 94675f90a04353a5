use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file not exists: {}", .0.display())]
    PathNotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The input does not start with a supported binary plist header.
    #[error("not a binary property list: {0}")]
    Format(String),
    /// The input ends before the object table, offset table or trailer is complete.
    #[error("truncated binary property list: {0}")]
    TruncatedInput(String),
    /// Offsets, references or markers that do not describe a valid object graph.
    #[error("malformed binary property list: {0}")]
    MalformedStructure(String),
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
    #[error("invalid XML property list: {0}")]
    Xml(String),
}

impl From<nom::Err<nom::error::Error<&str>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        let err = err.map_input(|input| input.chars().take(32).collect::<String>());
        Self::Xml(match err {
            nom::Err::Incomplete(_) => "unexpected end of document".to_string(),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                format!("{:?} near {:?}", e.code, e.input)
            }
        })
    }
}

use std::fmt;

/// Boxed cause carried by render failures (drawer callbacks return these).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug)]
pub enum Error {
    /// A required property is unset or out of range, e.g. a Div without height.
    Configuration(String),
    /// A render pass failed: drawer callback error or invalid geometry.
    Render {
        message: String,
        source: Option<BoxError>,
    },
    /// Operation not valid in the current state (after close, unknown page,
    /// detached container).
    State(String),
    /// A package on disk does not have the expected structure.
    InvalidPackage(String),
    Xml(roxmltree::Error),
    Zip(zip::result::ZipError),
    Io(std::io::Error),
}

impl Error {
    pub(crate) fn render(message: impl Into<String>) -> Self {
        Error::Render {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn render_with(message: impl Into<String>, source: BoxError) -> Self {
        Error::Render {
            message: message.into(),
            source: Some(source),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(message) => write!(f, "configuration error: {message}"),
            Error::Render {
                message,
                source: Some(source),
            } => write!(f, "render error: {message}: {source}"),
            Error::Render {
                message,
                source: None,
            } => write!(f, "render error: {message}"),
            Error::State(message) => write!(f, "invalid state: {message}"),
            Error::InvalidPackage(message) => write!(f, "invalid package: {message}"),
            Error::Xml(err) => write!(f, "xml error: {err}"),
            Error::Zip(err) => write!(f, "zip error: {err}"),
            Error::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Render {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            Error::Xml(err) => Some(err),
            Error::Zip(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<roxmltree::Error> for Error {
    fn from(value: roxmltree::Error) -> Self {
        Error::Xml(value)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(value: zip::result::ZipError) -> Self {
        match value {
            zip::result::ZipError::Io(err) => Error::Io(err),
            other => Error::Zip(other),
        }
    }
}

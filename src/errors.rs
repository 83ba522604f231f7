//
// Error types used throughout the crate.
//
// Backend errors (FsError) are values returned by the node model,
// protocol errors (DavError) are what the dispatcher translates into
// HTTP status codes. Backend errors convert into protocol errors at
// the handler boundary.
//
use std::error::Error;
use std::fmt;
use std::io;

use http::StatusCode;

pub type DavResult<T> = Result<T, DavError>;

/// Errors returned by the storage backends (the node model).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotImplemented,
    GeneralFailure,
    /// A child with that name already exists.
    Exists,
    NotFound,
    Forbidden,
    InsufficientStorage,
}

impl Error for FsError {}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::PermissionDenied => FsError::Forbidden,
            io::ErrorKind::AlreadyExists => FsError::Exists,
            _ => FsError::GeneralFailure,
        }
    }
}

/// Protocol-level errors, translated to a status code and an XML
/// error document at the dispatcher boundary.
#[derive(Debug)]
pub enum DavError {
    NotFound,
    /// Structural conflict: missing or non-collection parent.
    Conflict,
    Forbidden,
    /// A `resourcetype` value the server cannot create.
    InvalidResourceType,
    BadRequest,
    UnsupportedMediaType,
    MethodNotAllowed,
    /// The resource is covered by a lock and no matching token was presented.
    Locked,
    /// A lock token that does not match an active lock on the resource.
    BadLockToken,
    /// HTTP method that is not part of the (Web)DAV surface.
    UnknownDavMethod,
    /// Request path failed to parse or decode.
    InvalidPath,
    /// Request path tried to escape the tree.
    ForbiddenPath,
    Status(StatusCode),
    /// As `Status`, but the connection must be closed afterwards
    /// (an unread request body is still in the pipe).
    StatusClose(StatusCode),
    Fs(FsError),
    Io(io::Error),
}

impl DavError {
    /// HTTP status code this error maps to.
    pub fn statuscode(&self) -> StatusCode {
        match self {
            DavError::NotFound => StatusCode::NOT_FOUND,
            DavError::Conflict => StatusCode::CONFLICT,
            DavError::Forbidden => StatusCode::FORBIDDEN,
            DavError::InvalidResourceType => StatusCode::FORBIDDEN,
            DavError::BadRequest => StatusCode::BAD_REQUEST,
            DavError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DavError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            DavError::Locked => StatusCode::LOCKED,
            DavError::BadLockToken => StatusCode::CONFLICT,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::ForbiddenPath => StatusCode::FORBIDDEN,
            DavError::Status(c) | DavError::StatusClose(c) => *c,
            DavError::Fs(e) => fs_statuscode(*e),
            DavError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// DAV: precondition element to include in the error document, if any.
    pub fn condition(&self) -> Option<&'static str> {
        match self {
            DavError::Locked => Some("lock-token-submitted"),
            DavError::BadLockToken => Some("lock-token-matches-request-uri"),
            DavError::InvalidResourceType => Some("valid-resourcetype"),
            _ => None,
        }
    }

    /// Whether the connection must be closed after sending the response.
    pub fn must_close(&self) -> bool {
        matches!(self, DavError::StatusClose(_) | DavError::Io(_))
    }
}

fn fs_statuscode(e: FsError) -> StatusCode {
    match e {
        FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        FsError::Exists => StatusCode::CONFLICT,
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::Forbidden => StatusCode::FORBIDDEN,
        FsError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
    }
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::Fs(e) => Some(e),
            DavError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for DavError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DavError::Status(c) | DavError::StatusClose(c) => write!(f, "{c}"),
            DavError::Fs(e) => write!(f, "backend error: {e}"),
            DavError::Io(e) => write!(f, "i/o error: {e}"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl From<StatusCode> for DavError {
    fn from(c: StatusCode) -> Self {
        DavError::Status(c)
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::Fs(e)
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::Io(e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        match e {
            xml::writer::Error::Io(e) => DavError::Io(e),
            _ => DavError::Status(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(DavError::Conflict.statuscode(), StatusCode::CONFLICT);
        assert_eq!(DavError::Locked.statuscode(), StatusCode::LOCKED);
        assert_eq!(DavError::BadLockToken.statuscode(), StatusCode::CONFLICT);
        assert_eq!(
            DavError::InvalidResourceType.statuscode(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            DavError::Fs(FsError::NotFound).statuscode(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn conditions() {
        assert_eq!(DavError::Locked.condition(), Some("lock-token-submitted"));
        assert_eq!(DavError::NotFound.condition(), None);
    }
}

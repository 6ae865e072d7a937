use std::error::Error as StdError;

use thiserror::Error;

use crate::model::{
    object::{StoreError, StoreErrorKind},
    response::{self, ErrorResponse},
};

pub type Result<T> = std::result::Result<T, GatewayError>;

type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// Closed set of failure classes reported to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    BucketNotFound,
    Connection,
    Permission,
    SizeExceeded,
    UnsupportedFormat,
    Upload,
    Download,
    Unknown,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "FILE_NOT_FOUND",
            ErrorKind::BucketNotFound => "BUCKET_NOT_FOUND",
            ErrorKind::Connection => "CONNECTION_ERROR",
            ErrorKind::Permission => "PERMISSION_ERROR",
            ErrorKind::SizeExceeded => "FILE_SIZE_EXCEEDED",
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::Upload => "UPLOAD_ERROR",
            ErrorKind::Download => "DOWNLOAD_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// HTTP-equivalent status for the kind.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::NotFound | ErrorKind::BucketNotFound => 404,
            ErrorKind::Connection => 503,
            ErrorKind::Permission => 403,
            ErrorKind::SizeExceeded | ErrorKind::UnsupportedFormat => 400,
            ErrorKind::Upload | ErrorKind::Download | ErrorKind::Unknown => 500,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "file not found",
            ErrorKind::BucketNotFound => "bucket not found",
            ErrorKind::Connection => "object store unreachable",
            ErrorKind::Permission => "permission denied",
            ErrorKind::SizeExceeded => "file size exceeded",
            ErrorKind::UnsupportedFormat => "unsupported file format",
            ErrorKind::Upload => "upload failed",
            ErrorKind::Download => "download failed",
            ErrorKind::Unknown => "internal error",
        }
    }
}

/// Classified failure raised at every component boundary.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    pub detail: String,
    #[source]
    pub source: Option<Cause>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: detail.into(),
            source: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.source = Some(cause.into());
        self
    }

    pub fn upload_failed(name: &str, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::Upload,
            format!("{}: {}", ErrorKind::Upload.default_message(), name),
            format!("error while uploading {} to the object store: {}", name, cause),
        )
        .with_cause(cause)
    }

    pub fn download_failed(name: &str, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::Download,
            format!("{}: {}", ErrorKind::Download.default_message(), name),
            format!("error while downloading {} from the object store: {}", name, cause),
        )
        .with_cause(cause)
    }

    pub fn file_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("{}: {}", ErrorKind::NotFound.default_message(), name),
            format!("object {} was not found in the object store", name),
        )
    }

    pub fn bucket_not_found(bucket: &str, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::BucketNotFound,
            format!("{}: {}", ErrorKind::BucketNotFound.default_message(), bucket),
            format!("could not check or create bucket {}: {}", bucket, cause),
        )
        .with_cause(cause)
    }

    pub fn connection_failed(target: &str, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::Connection,
            format!("{}: {}", ErrorKind::Connection.default_message(), target),
            format!("could not reach the object store for {}: {}", target, cause),
        )
        .with_cause(cause)
    }

    pub fn permission_denied(operation: &str, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::Permission,
            format!("{}: {}", ErrorKind::Permission.default_message(), operation),
            format!("{} was rejected, check the access credentials: {}", operation, cause),
        )
        .with_cause(cause)
    }

    pub fn unsupported_format(name: &str, content_type: &str, allowed: &[String]) -> Self {
        Self::new(
            ErrorKind::UnsupportedFormat,
            format!("{}: {}", ErrorKind::UnsupportedFormat.default_message(), name),
            format!(
                "content type {} of {} is not allowed, allowed types: {}",
                content_type,
                name,
                allowed.join(",")
            ),
        )
    }

    pub fn size_exceeded(name: &str, size: u64, max_size: u64) -> Self {
        Self::new(
            ErrorKind::SizeExceeded,
            format!("{}: {}", ErrorKind::SizeExceeded.default_message(), name),
            format!(
                "{} is {} bytes, exceeds the maximum of {} bytes",
                name, size, max_size
            ),
        )
    }

    pub fn unknown(context: &str, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::Unknown,
            format!("{}: {}", ErrorKind::Unknown.default_message(), context),
            cause.to_string(),
        )
        .with_cause(cause)
    }

    /// Classifies a failed metadata lookup for `target`.
    pub fn from_lookup(target: &str, err: StoreError) -> Self {
        match err.kind {
            StoreErrorKind::NotFound => Self::file_not_found(target).with_cause(err),
            StoreErrorKind::AccessDenied => Self::permission_denied(&format!("stat {}", target), err),
            StoreErrorKind::Unreachable => Self::connection_failed(target, err),
            StoreErrorKind::AlreadyOwned | StoreErrorKind::Other => Self::unknown(target, err),
        }
    }

    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    pub fn to_response(&self) -> (u16, ErrorResponse) {
        (
            self.status(),
            ErrorResponse {
                success: false,
                error_code: self.kind.code().to_string(),
                message: self.message.clone(),
                detail: self.detail.clone(),
                timestamp: response::now_millis(),
            },
        )
    }
}

use std::{io::Read, path::Path};

use tracing::{error, info, span, Level};

use crate::{
    error::Result,
    gateway::{ObjectDownload, ObjectGateway},
    model::response::{
        self, DownloadResponse, HealthResponse, MetadataResponse, UploadResponse,
    },
};

/// Open object body plus everything needed to serve it as an attachment.
pub struct StreamDownload {
    pub stream: ObjectDownload,
    pub content_type: String,
    pub content_length: u64,
    pub suggested_filename: String,
}

impl StreamDownload {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.suggested_filename)
    }
}

pub fn health() -> HealthResponse {
    HealthResponse {
        success: true,
        status: "UP",
        message: "object gateway is running".to_string(),
        timestamp: response::now_millis(),
    }
}

pub fn check_exists(gateway: &ObjectGateway, bucket: &str, key: &str) -> Result<MetadataResponse> {
    let span = span!(Level::INFO, "check_exists", context = "check_exists");
    let _e = span.enter();
    info!(bucket = bucket, key = key, "called");

    let data = gateway.stat(bucket, key).inspect_err(|err| {
        error!(error_message=%err, error_group="stat_object");
    })?;

    Ok(MetadataResponse {
        success: true,
        message: "object exists".to_string(),
        data,
    })
}

pub fn get_file_info(gateway: &ObjectGateway, bucket: &str, key: &str) -> Result<MetadataResponse> {
    let span = span!(Level::INFO, "get_file_info", context = "get_file_info");
    let _e = span.enter();
    info!(bucket = bucket, key = key, "called");

    let data = gateway.stat(bucket, key).inspect_err(|err| {
        error!(error_message=%err, error_group="stat_object");
    })?;

    Ok(MetadataResponse {
        success: true,
        message: "object info retrieved".to_string(),
        data,
    })
}

pub struct UploadRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub source: &'a mut dyn Read,
    pub size_hint: Option<i64>,
    pub content_type: Option<&'a str>,
    /// Name of the local source file, echoed back to the caller.
    pub file_name: Option<String>,
}

pub fn upload(gateway: &ObjectGateway, req: UploadRequest<'_>) -> Result<UploadResponse> {
    let span = span!(Level::INFO, "upload", context = "upload");
    let _e = span.enter();
    info!(
        bucket = req.bucket,
        key = req.key,
        size_hint = req.size_hint,
        content_type = req.content_type,
        "called"
    );

    let result = gateway
        .upload(req.bucket, req.key, req.source, req.size_hint, req.content_type)
        .inspect_err(|err| {
            error!(error_message=%err, error_group="upload", error_code=err.kind.code());
        })?;

    Ok(UploadResponse {
        success: true,
        message: "upload succeeded".to_string(),
        bucket: req.bucket.to_string(),
        key: req.key.to_string(),
        bytes_transferred: result.bytes_transferred,
        file_name: req.file_name,
        file_size: req.size_hint.filter(|n| *n >= 0).map(|n| n as u64),
    })
}

pub fn download_to_local(
    gateway: &ObjectGateway,
    bucket: &str,
    key: &str,
    destination: &Path,
) -> Result<DownloadResponse> {
    let span = span!(Level::INFO, "download_to_local", context = "download_to_local");
    let _e = span.enter();
    info!(bucket = bucket, key = key, destination = %destination.display(), "called");

    let result = gateway
        .download_to_local(bucket, key, destination)
        .inspect_err(|err| {
            error!(error_message=%err, error_group="download", error_code=err.kind.code());
        })?;
    let resolved_path = result
        .final_path
        .unwrap_or_else(|| destination.to_path_buf());

    Ok(DownloadResponse {
        success: true,
        message: format!(
            "download succeeded, {} bytes saved to {}",
            result.bytes_transferred,
            resolved_path.display()
        ),
        bucket: bucket.to_string(),
        key: key.to_string(),
        requested_path: destination.to_path_buf(),
        resolved_path,
        bytes_transferred: result.bytes_transferred,
    })
}

pub fn download_as_stream(gateway: &ObjectGateway, bucket: &str, key: &str) -> Result<StreamDownload> {
    let span = span!(Level::INFO, "download_as_stream", context = "download_as_stream");
    let _e = span.enter();
    info!(bucket = bucket, key = key, "called");

    let stream = gateway.download(bucket, key).inspect_err(|err| {
        error!(error_message=%err, error_group="download", error_code=err.kind.code());
    })?;

    Ok(StreamDownload {
        content_type: stream.metadata.content_type.clone(),
        content_length: stream.metadata.size,
        suggested_filename: stream.suggested_filename().to_string(),
        stream,
    })
}

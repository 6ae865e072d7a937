use std::{
    cmp,
    io::{self, Read},
};

use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{
        BucketLocationConstraint, CompletedMultipartUpload, CompletedPart,
        CreateBucketConfiguration,
    },
};
use bytes::{Buf, Bytes};
use time::OffsetDateTime;
use tracing::{error, info};

use crate::{
    adapters,
    model::object::{ObjectMetadata, StoreError, StoreErrorKind},
    util::runtime::Blocking,
};

/// Upper bound on the bytes held in memory per part. At most two parts are
/// buffered at once during an upload.
pub const PART_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const DEFAULT_REGION: &str = "us-east-1";

pub struct S3Store {
    client: aws_sdk_s3::Client,
    blocking: Blocking,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, blocking: Blocking) -> Self {
        Self { client, blocking }
    }

    fn put_single(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        let len = body.len() as u64;
        let req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .content_length(len as i64)
            .body(ByteStream::from(body));

        self.blocking
            .block_on(req.send())
            .map_err(|err| sdk_error("put_object", key, err))?;

        Ok(len)
    }

    fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        first: Vec<u8>,
        second: Vec<u8>,
        body: &mut dyn Read,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        let req = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type);

        let created = self
            .blocking
            .block_on(req.send())
            .map_err(|err| sdk_error("create_multipart_upload", key, err))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                StoreError::new(
                    StoreErrorKind::Other,
                    format!("missing upload id for multipart upload: {}", key),
                )
            })?
            .to_string();
        info!(bucket = bucket, key = key, upload_id = %upload_id, "multipart upload started");

        let (parts, sent) = match self.upload_parts(bucket, key, &upload_id, first, second, body) {
            Ok(done) => done,
            Err(err) => {
                self.abort(bucket, key, &upload_id);
                return Err(err);
            }
        };

        let req = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            );

        if let Err(err) = self.blocking.block_on(req.send()) {
            self.abort(bucket, key, &upload_id);
            return Err(sdk_error("complete_multipart_upload", key, err));
        }

        Ok(sent)
    }

    fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        mut pending: Vec<u8>,
        mut next: Vec<u8>,
        body: &mut dyn Read,
    ) -> Result<(Vec<CompletedPart>, u64), StoreError> {
        let mut parts = Vec::new();
        let mut sent = 0u64;
        let mut part_number = 1;

        loop {
            let len = pending.len() as u64;
            let req = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(len as i64)
                .body(ByteStream::from(pending));

            let uploaded = self
                .blocking
                .block_on(req.send())
                .map_err(|err| sdk_error("upload_part", key, err))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            sent += len;

            if next.is_empty() {
                break;
            }

            pending = next;
            next = read_part(key, body)?;
            part_number += 1;
        }

        Ok((parts, sent))
    }

    fn abort(&self, bucket: &str, key: &str, upload_id: &str) {
        let req = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id);

        if let Err(err) = self.blocking.block_on(req.send()) {
            error!(error_message=%err, error_group="abort_multipart_upload", key = key);
        }
    }
}

impl adapters::ObjectStore for S3Store {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        let req = self.client.head_bucket().bucket(bucket);

        match self.blocking.block_on(req.send()) {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = sdk_error("head_bucket", bucket, err);
                if err.is_not_found() {
                    return Ok(false);
                }

                Err(err)
            }
        }
    }

    fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let mut req = self.client.create_bucket().bucket(bucket);

        if let Some(region) = self.client.config().region() {
            if region.as_ref() != DEFAULT_REGION {
                req = req.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(region.as_ref()))
                        .build(),
                );
            }
        }

        match self.blocking.block_on(req.send()) {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = sdk_error("create_bucket", bucket, err);
                if matches!(err.kind, StoreErrorKind::AlreadyOwned) {
                    return Ok(());
                }

                Err(err)
            }
        }
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn Read,
        _size_hint: Option<u64>,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        let first = read_part(key, body)?;
        if first.len() < PART_SIZE {
            return self.put_single(bucket, key, first, content_type);
        }

        let second = read_part(key, body)?;
        if second.is_empty() {
            return self.put_single(bucket, key, first, content_type);
        }

        self.put_multipart(bucket, key, first, second, body, content_type)
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let req = self.client.get_object().bucket(bucket).key(key);

        let out = self
            .blocking
            .block_on(req.send())
            .map_err(|err| sdk_error("get_object", key, err))?;

        Ok(Box::new(BodyReader {
            blocking: self.blocking.clone(),
            body: out.body,
            pending: Bytes::new(),
        }))
    }

    fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
        let req = self.client.head_object().bucket(bucket).key(key);

        let ho = self
            .blocking
            .block_on(req.send())
            .map_err(|err| sdk_error("head_object", key, err))?;

        let last_modified = ho
            .last_modified()
            .and_then(|dt| OffsetDateTime::from_unix_timestamp(dt.secs()).ok())
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        Ok(ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: ho.content_length().unwrap_or(0).max(0) as u64,
            last_modified,
            etag: ho.e_tag().unwrap_or_default().trim_matches('"').to_string(),
            content_type: ho
                .content_type()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
        })
    }
}

/// Blocking `Read` over an SDK response body, pulling one chunk at a time.
struct BodyReader {
    blocking: Blocking,
    body: ByteStream,
    pending: Bytes,
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while !self.pending.has_remaining() {
            match self.blocking.block_on(self.body.try_next()) {
                Ok(Some(chunk)) => self.pending = chunk,
                Ok(None) => return Ok(0),
                Err(err) => return Err(io::Error::new(io::ErrorKind::Other, err)),
            }
        }

        let n = cmp::min(buf.len(), self.pending.remaining());
        self.pending.copy_to_slice(&mut buf[..n]);

        Ok(n)
    }
}

fn read_part(key: &str, body: &mut dyn Read) -> Result<Vec<u8>, StoreError> {
    let mut part = Vec::new();
    Read::take(&mut *body, PART_SIZE as u64)
        .read_to_end(&mut part)
        .map_err(|err| {
            StoreError::with_source(
                StoreErrorKind::Other,
                format!("failed to read upload source for: {}", key),
                err,
            )
        })?;

    Ok(part)
}

fn sdk_error<E>(operation: &str, target: &str, err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    StoreError::with_source(
        classify(&err),
        format!("failed to {}: {}", operation, target),
        err,
    )
}

fn classify<E: ProvideErrorMetadata>(err: &SdkError<E, HttpResponse>) -> StoreErrorKind {
    if matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)) {
        return StoreErrorKind::Unreachable;
    }

    let status = err.raw_response().map(|raw| raw.status().as_u16());
    match (err.code(), status) {
        (Some("BucketAlreadyOwnedByYou"), _) => StoreErrorKind::AlreadyOwned,
        (Some("NoSuchKey" | "NoSuchBucket" | "NotFound"), _) | (_, Some(404)) => {
            StoreErrorKind::NotFound
        }
        (Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"), _)
        | (_, Some(401 | 403)) => StoreErrorKind::AccessDenied,
        _ => StoreErrorKind::Other,
    }
}

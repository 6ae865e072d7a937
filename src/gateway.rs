use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
    sync::Arc,
};

use tracing::{error, info};

use crate::{
    adapters::ObjectStore,
    bucket::BucketManager,
    error::{ErrorKind, GatewayError, Result},
    model::object::{ObjectMetadata, StoreErrorKind, TransferResult},
    resolver,
    util::object,
};

pub const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Limits applied to every upload before and while it is streamed.
#[derive(Clone, Debug, Default)]
pub struct UploadPolicy {
    pub max_size: Option<u64>,
    /// Content type prefixes, e.g. `image/`. Empty allows everything.
    pub allowed_types: Vec<String>,
}

impl UploadPolicy {
    pub fn allows(&self, content_type: &str) -> bool {
        let content_type = content_type.to_ascii_lowercase();
        self.allowed_types.is_empty()
            || self
                .allowed_types
                .iter()
                .any(|allowed| content_type.starts_with(&allowed.to_ascii_lowercase()))
    }
}

/// An open object body together with the metadata it was opened against.
/// Dropping it closes the underlying stream.
pub struct ObjectDownload {
    pub metadata: ObjectMetadata,
    reader: Box<dyn Read + Send>,
}

impl ObjectDownload {
    pub fn suggested_filename(&self) -> &str {
        object::basename(&self.metadata.key)
    }
}

impl Read for ObjectDownload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

pub struct ObjectGateway {
    client: Arc<dyn ObjectStore>,
    buckets: BucketManager,
    policy: UploadPolicy,
}

impl ObjectGateway {
    pub fn new(client: Arc<dyn ObjectStore>, policy: UploadPolicy) -> Self {
        Self {
            buckets: BucketManager::new(Arc::clone(&client)),
            client,
            policy,
        }
    }

    pub fn stat(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        self.client.stat_object(bucket, key).map_err(|err| {
            error!(error_message=%err, error_group="stat_object", bucket = bucket, key = key);
            GatewayError::from_lookup(key, err)
        })
    }

    /// Streams `source` into `(bucket, key)`, creating the bucket first if
    /// needed. A negative or absent `size_hint` means unknown length.
    pub fn upload(
        &self,
        bucket: &str,
        key: &str,
        source: &mut dyn Read,
        size_hint: Option<i64>,
        content_type: Option<&str>,
    ) -> Result<TransferResult> {
        let size_hint = size_hint.filter(|n| *n >= 0).map(|n| n as u64);
        let content_type = match content_type {
            Some(content_type) => content_type.to_string(),
            None => mime_guess::from_path(key)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        if !self.policy.allows(&content_type) {
            return Err(GatewayError::unsupported_format(
                key,
                &content_type,
                &self.policy.allowed_types,
            ));
        }

        if let (Some(size), Some(max_size)) = (size_hint, self.policy.max_size) {
            if size > max_size {
                return Err(GatewayError::size_exceeded(key, size, max_size));
            }
        }

        self.buckets.ensure_bucket(bucket)?;

        let mut limited = LimitedReader::new(source, self.policy.max_size);
        let sent = self
            .client
            .put_object(bucket, key, &mut limited, size_hint, &content_type)
            .map_err(|err| {
                error!(error_message=%err, error_group="put_object", bucket = bucket, key = key);
                match (limited.exceeded, self.policy.max_size) {
                    (true, Some(max_size)) => {
                        GatewayError::size_exceeded(key, limited.count, max_size).with_cause(err)
                    }
                    _ => GatewayError::upload_failed(key, err),
                }
            })?;
        info!(bucket = bucket, key = key, bytes = sent, "upload complete");

        Ok(TransferResult {
            bytes_transferred: sent,
            final_path: None,
        })
    }

    /// Fails with `NotFound` before any stream is opened when the object is
    /// absent.
    pub fn download(&self, bucket: &str, key: &str) -> Result<ObjectDownload> {
        let metadata = self.stat(bucket, key)?;
        info!(bucket = bucket, key = key, size = metadata.size, "object found");
        let reader = self.open(bucket, key)?;

        Ok(ObjectDownload { metadata, reader })
    }

    /// The remote stream is opened before the destination is resolved, so a
    /// failed open leaves no new directories behind.
    pub fn download_to_local(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<TransferResult> {
        let metadata = self.stat(bucket, key)?;
        info!(bucket = bucket, key = key, size = metadata.size, "object found");

        let mut reader = self.open(bucket, key)?;
        let final_path = resolver::resolve(destination, key)?;

        let copied = copy_to_file(&mut reader, &final_path).map_err(|err| {
            error!(
                error_message=%err,
                error_group="copy",
                key = key,
                path = %final_path.display()
            );
            GatewayError::download_failed(key, err)
        })?;

        if copied != metadata.size {
            return Err(GatewayError::new(
                ErrorKind::Download,
                format!("{}: {}", ErrorKind::Download.default_message(), key),
                format!(
                    "copied {} bytes of {} to {}, expected {}",
                    copied,
                    key,
                    final_path.display(),
                    metadata.size
                ),
            ));
        }
        info!(key = key, path = %final_path.display(), bytes = copied, "download complete");

        Ok(TransferResult {
            bytes_transferred: copied,
            final_path: Some(final_path),
        })
    }

    fn open(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>> {
        self.client.get_object(bucket, key).map_err(|err| {
            error!(error_message=%err, error_group="get_object", bucket = bucket, key = key);
            match err.kind {
                StoreErrorKind::NotFound => GatewayError::file_not_found(key).with_cause(err),
                _ => GatewayError::download_failed(key, err),
            }
        })
    }
}

/// Copies through a fixed buffer. The file is closed on every exit path.
fn copy_to_file(reader: &mut dyn Read, path: &Path) -> io::Result<u64> {
    let mut file = File::create(path)?;
    let mut buf = [0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        file.write_all(&buf[..n])?;
        total += n as u64;
    }

    file.flush()?;
    Ok(total)
}

/// Counts bytes pulled from an upload source and refuses to go past `limit`.
struct LimitedReader<'a> {
    inner: &'a mut dyn Read,
    limit: Option<u64>,
    count: u64,
    exceeded: bool,
}

impl<'a> LimitedReader<'a> {
    fn new(inner: &'a mut dyn Read, limit: Option<u64>) -> Self {
        Self {
            inner,
            limit,
            count: 0,
            exceeded: false,
        }
    }
}

impl Read for LimitedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;

        if let Some(limit) = self.limit {
            if self.count > limit {
                self.exceeded = true;
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("upload exceeds the maximum of {} bytes", limit),
                ));
            }
        }

        Ok(n)
    }
}

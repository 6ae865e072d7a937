use std::{
    collections::HashMap,
    io::{self, Read},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use time::OffsetDateTime;

use crate::{
    adapters,
    model::object::{ObjectMetadata, StoreError, StoreErrorKind},
};

pub const OP_BUCKET_EXISTS: &str = "bucket_exists";
pub const OP_MAKE_BUCKET: &str = "make_bucket";
pub const OP_PUT_OBJECT: &str = "put_object";
pub const OP_GET_OBJECT: &str = "get_object";
pub const OP_STAT_OBJECT: &str = "stat_object";

struct MockObject {
    data: Vec<u8>,
    content_type: String,
    last_modified: OffsetDateTime,
}

/// In-memory store with failure injection and open-stream accounting.
#[derive(Default)]
pub struct MockClient {
    buckets: Mutex<HashMap<String, HashMap<String, MockObject>>>,
    failures: Mutex<HashMap<&'static str, StoreErrorKind>>,
    break_after: Mutex<Option<usize>>,
    short_by: Mutex<Option<usize>>,
    open_streams: Arc<AtomicUsize>,
    pub make_bucket_calls: AtomicUsize,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.buckets
            .lock()
            .expect("failed to acquire `buckets` guard")
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                MockObject {
                    data: data.to_vec(),
                    content_type: "image/jpeg".to_string(),
                    last_modified: OffsetDateTime::UNIX_EPOCH,
                },
            );
        self
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.buckets
            .lock()
            .expect("failed to acquire `buckets` guard")
            .entry(bucket.to_string())
            .or_default();
        self
    }

    /// Makes every later call to `op` fail with `kind`.
    pub fn fail(&self, op: &'static str, kind: StoreErrorKind) {
        self.failures
            .lock()
            .expect("failed to acquire `failures` guard")
            .insert(op, kind);
    }

    /// Streams returned by `get_object` error after `n` bytes.
    pub fn break_stream_after(&self, n: usize) {
        *self
            .break_after
            .lock()
            .expect("failed to acquire `break_after` guard") = Some(n);
    }

    /// Streams returned by `get_object` end cleanly `n` bytes before the
    /// size reported by `stat_object`.
    pub fn short_stream_by(&self, n: usize) {
        *self
            .short_by
            .lock()
            .expect("failed to acquire `short_by` guard") = Some(n);
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets
            .lock()
            .expect("failed to acquire `buckets` guard")
            .contains_key(bucket)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets
            .lock()
            .expect("failed to acquire `buckets` guard")
            .len()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .expect("failed to acquire `buckets` guard")
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| o.data.clone())
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.buckets
            .lock()
            .expect("failed to acquire `buckets` guard")
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| o.content_type.clone())
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn check(&self, op: &'static str, target: &str) -> Result<(), StoreError> {
        let failures = self
            .failures
            .lock()
            .expect("failed to acquire `failures` guard");

        match failures.get(op) {
            Some(kind) => Err(StoreError::new(
                *kind,
                format!("injected {} failure: {}", op, target),
            )),
            None => Ok(()),
        }
    }
}

impl adapters::ObjectStore for MockClient {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        self.check(OP_BUCKET_EXISTS, bucket)?;
        Ok(self.has_bucket(bucket))
    }

    fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.make_bucket_calls.fetch_add(1, Ordering::SeqCst);
        self.check(OP_MAKE_BUCKET, bucket)?;

        self.buckets
            .lock()
            .expect("failed to acquire `buckets` guard")
            .entry(bucket.to_string())
            .or_default();

        Ok(())
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn Read,
        _size_hint: Option<u64>,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        self.check(OP_PUT_OBJECT, key)?;

        let mut data = Vec::new();
        body.read_to_end(&mut data).map_err(|err| {
            StoreError::with_source(
                StoreErrorKind::Other,
                format!("failed to read upload source for: {}", key),
                err,
            )
        })?;

        let mut buckets = self
            .buckets
            .lock()
            .expect("failed to acquire `buckets` guard");
        let objects = buckets.get_mut(bucket).ok_or_else(|| {
            StoreError::new(StoreErrorKind::NotFound, format!("no such bucket: {}", bucket))
        })?;

        let len = data.len() as u64;
        objects.insert(
            key.to_string(),
            MockObject {
                data,
                content_type: content_type.to_string(),
                last_modified: OffsetDateTime::now_utc(),
            },
        );

        Ok(len)
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        self.check(OP_GET_OBJECT, key)?;

        let mut data = self.object(bucket, key).ok_or_else(|| {
            StoreError::new(StoreErrorKind::NotFound, format!("no such key: {}", key))
        })?;
        let break_after = *self
            .break_after
            .lock()
            .expect("failed to acquire `break_after` guard");
        if let Some(n) = *self
            .short_by
            .lock()
            .expect("failed to acquire `short_by` guard")
        {
            data.truncate(data.len().saturating_sub(n));
        }

        self.open_streams.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockStream {
            data,
            pos: 0,
            break_after,
            open_streams: Arc::clone(&self.open_streams),
        }))
    }

    fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
        self.check(OP_STAT_OBJECT, key)?;

        let buckets = self
            .buckets
            .lock()
            .expect("failed to acquire `buckets` guard");
        let object = buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| {
                StoreError::new(StoreErrorKind::NotFound, format!("no such key: {}", key))
            })?;

        Ok(ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: object.data.len() as u64,
            last_modified: object.last_modified,
            etag: format!("{:x}", object.data.len()),
            content_type: object.content_type.clone(),
        })
    }
}

struct MockStream {
    data: Vec<u8>,
    pos: usize,
    break_after: Option<usize>,
    open_streams: Arc<AtomicUsize>,
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let end = match self.break_after {
            Some(limit) if self.pos >= limit => {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "injected stream failure",
                ));
            }
            Some(limit) => limit.min(self.data.len()),
            None => self.data.len(),
        };

        let n = buf.len().min(end - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;

        Ok(n)
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

use std::io::Read;

use crate::model::object::{ObjectMetadata, StoreError};

#[cfg(test)]
pub mod mock;
pub mod s3;

/// Object store capability shared by every gateway component.
///
/// Implementations must be safe for concurrent use; the gateway adds no
/// locking of its own around them.
pub trait ObjectStore: Send + Sync {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError>;

    /// Creating a bucket the caller already owns is not an error.
    fn make_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Streams `body` into `(bucket, key)` and returns the number of bytes sent.
    /// A `size_hint` of `None` means the length is unknown.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &mut dyn Read,
        size_hint: Option<u64>,
        content_type: &str,
    ) -> Result<u64, StoreError>;

    fn get_object(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>, StoreError>;

    fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError>;
}

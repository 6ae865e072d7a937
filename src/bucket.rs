use std::sync::Arc;

use tracing::{error, info};

use crate::{
    adapters::ObjectStore,
    error::{GatewayError, Result},
};

/// Makes sure a bucket exists before anything is written to it.
pub struct BucketManager {
    client: Arc<dyn ObjectStore>,
}

impl BucketManager {
    pub fn new(client: Arc<dyn ObjectStore>) -> Self {
        Self { client }
    }

    /// Idempotent. Any failure of the existence check or of the creation
    /// call is reported as `BucketNotFound`.
    pub fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        info!(bucket = bucket, "checking bucket");

        let exists = self.client.bucket_exists(bucket).map_err(|err| {
            error!(error_message=%err, error_group="bucket_exists", bucket = bucket);
            GatewayError::bucket_not_found(bucket, err)
        })?;

        if exists {
            info!(bucket = bucket, "bucket exists");
            return Ok(());
        }

        info!(bucket = bucket, "bucket missing, creating");
        self.client.make_bucket(bucket).map_err(|err| {
            error!(error_message=%err, error_group="make_bucket", bucket = bucket);
            GatewayError::bucket_not_found(bucket, err)
        })?;
        info!(bucket = bucket, "bucket created");

        Ok(())
    }
}

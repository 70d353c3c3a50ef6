//! aws-sdk-s3 backed [`ObjectStore`]
//!
//! SDK-level retries are disabled: the backup engine wraps every network
//! call in its own retry policy, so the SDK's standard retry mode would
//! multiply attempts.
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | HeadBucket/CreateBucket | `s3.ensure_bucket` | bucket |
//! | HeadObject | `s3.head_object` | bucket, key, found |
//! | PutObject | `s3.put_object` | bucket, key, source |

use super::{Credentials, ObjectBody, ObjectHead, ObjectStore, StoreError};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::RequestChecksumCalculation;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use std::collections::HashMap;
use std::time::Duration;

/// Region that rejects an explicit location constraint on CreateBucket
const DEFAULT_REGION: &str = "us-east-1";

/// S3 object store bound to one bucket
///
/// The underlying SDK client is cheap to clone and safe to share across
/// concurrent uploads.
#[derive(Clone, Debug)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl S3Store {
    /// Build a client for `bucket` from the S3 configuration
    ///
    /// A custom `endpoint` switches to path-style addressing, which is what
    /// MinIO, RustFS and most other S3-compatible stores expect.
    pub async fn connect(
        config: &S3Config,
        bucket: &str,
        credentials: Credentials,
    ) -> Result<Self, StoreError> {
        if bucket.trim().is_empty() {
            return Err(StoreError::Rejected("bucket name cannot be empty".into()));
        }

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials.into_sdk())
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                    .build(),
            )
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);

        if let Some(ref endpoint) = config.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(StoreError::Rejected(format!(
                    "Invalid S3 endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            region: config.region.clone(),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.region
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[tracing::instrument(name = "s3.ensure_bucket", skip(self), fields(s3.bucket = %self.bucket), err)]
    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                tracing::debug!("Bucket exists");
                return Ok(());
            }
            Err(err) => {
                tracing::debug!(error = %DisplayErrorContext(&err), "HeadBucket failed, creating bucket");
            }
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, region = %self.region, "Created bucket");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you())
                    .unwrap_or(false) =>
            {
                Ok(())
            }
            Err(err) => Err(StoreError::BucketCreate {
                bucket: self.bucket.clone(),
                reason: DisplayErrorContext(&err).to_string(),
            }),
        }
    }

    #[tracing::instrument(
        name = "s3.head_object",
        skip(self),
        fields(s3.bucket = %self.bucket, s3.key = %key, found = tracing::field::Empty),
        err
    )]
    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                tracing::Span::current().record("found", true);
                Ok(Some(ObjectHead {
                    metadata: output.metadata().cloned().unwrap_or_default(),
                    content_length: output.content_length().and_then(|l| u64::try_from(l).ok()),
                }))
            }
            Err(err) if is_not_found(&err) => {
                tracing::Span::current().record("found", false);
                Ok(None)
            }
            Err(err) => Err(classify("HeadObject", err)),
        }
    }

    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, body, metadata),
        fields(s3.bucket = %self.bucket, s3.key = %key, source = tracing::field::Empty),
        err
    )]
    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        metadata: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let stream = match body {
            ObjectBody::Bytes(bytes) => {
                tracing::Span::current().record("source", "memory");
                ByteStream::from(bytes)
            }
            ObjectBody::File(path) => {
                tracing::Span::current().record("source", "file");
                ByteStream::from_path(&path).await.map_err(|e| {
                    StoreError::LocalFile(format!("{}: {}", path.display(), e))
                })?
            }
        };

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_metadata(Some(metadata))
            .body(stream);

        if key.ends_with(".gz") {
            request = request.content_type("application/gzip");
        }

        request
            .send()
            .await
            .map_err(|err| classify("PutObject", err))?;

        Ok(())
    }
}

fn is_not_found(err: &SdkError<aws_sdk_s3::operation::head_object::HeadObjectError, HttpResponse>) -> bool {
    err.as_service_error()
        .map(|e| e.is_not_found())
        .unwrap_or(false)
        || err
            .raw_response()
            .map(|r| r.status().as_u16() == 404)
            .unwrap_or(false)
}

/// Map an SDK failure onto the transient/rejected split the retry wrapper
/// understands. Throttling (429) and server errors (5xx) are transient, as
/// is anything that failed before a response was parsed.
fn classify<E>(operation: &str, err: SdkError<E, HttpResponse>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = format!("{}: {}", operation, DisplayErrorContext(&err));

    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StoreError::Transient(message)
        }
        SdkError::ServiceError(_) if matches!(status, Some(code) if code == 429 || code >= 500) => {
            StoreError::Transient(message)
        }
        _ => StoreError::Rejected(message),
    }
}

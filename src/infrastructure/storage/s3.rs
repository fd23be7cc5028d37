use super::{ObjectStore, PutObjectRequest, StorageError};
use crate::config::settings::StorageConfig;
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use tracing::info;

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
}

impl StorageService {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "static",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            // MinIO and friends only speak path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, region = %config.region, "✅ S3 client configured");

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn put_object(&self, request: PutObjectRequest) -> Result<String, StorageError> {
        let content_length = request.content_length();
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(&request.content_type)
            .content_length(content_length)
            .body(ByteStream::from(request.body))
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(format!("{output:?}"))
    }
}

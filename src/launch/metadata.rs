//! Token metadata publication
//!
//! The image goes up first; its URI is embedded in the JSON metadata, whose
//! own URI ends up in the mint parameters. Both endpoints answer with a
//! plain-text URI.

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{MetadataConfig, TokenConfig};
use crate::errors::{LaunchError, LaunchResult};

/// JSON document published for the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub created_on: String,
    pub platform_id: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl TokenMetadata {
    pub fn new(token: &TokenConfig, metadata: &MetadataConfig, image: String) -> Self {
        Self {
            name: token.name.clone(),
            symbol: token.symbol.clone(),
            description: token.description.clone(),
            created_on: metadata.created_on.clone(),
            platform_id: metadata.platform_id.clone(),
            image,
            twitter: token.twitter.clone(),
            telegram: token.telegram.clone(),
            website: token.website.clone(),
        }
    }
}

#[async_trait]
pub trait MetadataUploader: Send + Sync {
    /// Upload image bytes, returning the hosted URI
    async fn upload_image(&self, file_name: &str, bytes: Vec<u8>) -> LaunchResult<String>;

    /// Upload the metadata document, returning its URI
    async fn upload_metadata(&self, metadata: &TokenMetadata) -> LaunchResult<String>;
}

/// Read the configured image, upload it, then upload the metadata
pub async fn publish_metadata(
    uploader: &dyn MetadataUploader,
    token: &TokenConfig,
    metadata: &MetadataConfig,
) -> LaunchResult<String> {
    let bytes = tokio::fs::read(&token.image_path)
        .await
        .map_err(|e| LaunchError::Upload(format!("reading {}: {}", token.image_path, e)))?;
    let file_name = Path::new(&token.image_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image.png")
        .to_string();

    let image_uri = uploader.upload_image(&file_name, bytes).await?;
    info!(uri = %image_uri, "Token image uploaded");

    let document = TokenMetadata::new(token, metadata, image_uri);
    let uri = uploader.upload_metadata(&document).await?;
    info!(uri = %uri, "Token metadata uploaded");
    Ok(uri)
}

pub struct HttpMetadataUploader {
    http: Client,
    image_endpoint: String,
    metadata_endpoint: String,
}

impl HttpMetadataUploader {
    pub fn new(config: &MetadataConfig, timeout: Duration) -> LaunchResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LaunchError::Upload(e.to_string()))?;
        Ok(Self {
            http,
            image_endpoint: config.image_endpoint.clone(),
            metadata_endpoint: config.metadata_endpoint.clone(),
        })
    }

    async fn read_uri(response: reqwest::Response, what: &str) -> LaunchResult<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LaunchError::Upload(format!("{} response: {}", what, e)))?;
        if !status.is_success() {
            return Err(LaunchError::Upload(format!("{} upload returned {}: {}", what, status, body)));
        }
        let uri = body.trim();
        if uri.is_empty() {
            return Err(LaunchError::Upload(format!("{} upload returned an empty URI", what)));
        }
        Ok(uri.to_string())
    }
}

#[async_trait]
impl MetadataUploader for HttpMetadataUploader {
    async fn upload_image(&self, file_name: &str, bytes: Vec<u8>) -> LaunchResult<String> {
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("image", part);
        let response = self
            .http
            .post(&self.image_endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| LaunchError::Upload(format!("image: {}", e)))?;
        Self::read_uri(response, "image").await
    }

    async fn upload_metadata(&self, metadata: &TokenMetadata) -> LaunchResult<String> {
        let response = self
            .http
            .post(&self.metadata_endpoint)
            .json(metadata)
            .send()
            .await
            .map_err(|e| LaunchError::Upload(format!("metadata: {}", e)))?;
        Self::read_uri(response, "metadata").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn uploader(server: &mockito::ServerGuard) -> HttpMetadataUploader {
        let config = MetadataConfig {
            image_endpoint: format!("{}/upload/img", server.url()),
            metadata_endpoint: format!("{}/upload/meta", server.url()),
            ..MetadataConfig::default()
        };
        HttpMetadataUploader::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_optional_links_are_omitted() {
        let doc = TokenMetadata::new(
            &TokenConfig::default(),
            &MetadataConfig::default(),
            "ipfs://img".to_string(),
        );
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["image"], "ipfs://img");
        assert!(json.get("createdOn").is_some());
        assert!(json.get("twitter").is_none());
    }

    #[tokio::test]
    async fn test_image_upload_returns_plain_text_uri() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload/img")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data.*".to_string()),
            )
            .with_body("https://ipfs.io/ipfs/abc\n")
            .create_async()
            .await;

        let uri = uploader(&server)
            .upload_image("logo.png", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(uri, "https://ipfs.io/ipfs/abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_metadata_upload_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload/meta")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "symbol": TokenConfig::default().symbol,
                "image": "ipfs://img"
            })))
            .with_body("https://ipfs.io/ipfs/meta")
            .create_async()
            .await;

        let doc = TokenMetadata::new(
            &TokenConfig::default(),
            &MetadataConfig::default(),
            "ipfs://img".to_string(),
        );
        let uri = uploader(&server).upload_metadata(&doc).await.unwrap();
        assert_eq!(uri, "https://ipfs.io/ipfs/meta");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_uri_is_an_upload_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload/img")
            .with_body("  ")
            .create_async()
            .await;

        let err = uploader(&server)
            .upload_image("logo.png", vec![0])
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Upload(_)));
    }
}

//! Object storage and media retrieval used after a call confirms.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use auction_config::StorageConfig;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::error::StoreError;

/// Attributes attached to a stored object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectHeader {
    pub attributes: Vec<(String, String)>,
}

impl ObjectHeader {
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Where a stored object ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectAddress {
    pub container: String,
    pub object_id: String,
}

impl fmt::Display for ObjectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.object_id)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `payload` in `container` under a store-generated id.
    async fn put_object(
        &self,
        container: String,
        header: ObjectHeader,
        payload: Vec<u8>,
    ) -> Result<ObjectAddress, StoreError>;
}

/// Source of the media attached to a minted token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, token_name: &str) -> Result<Vec<u8>, StoreError>;
}

/// Fetches token media over HTTP from `<base_url>/<token_name>`.
#[derive(Clone, Debug)]
pub struct HttpMediaSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMediaSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        Self::new(
            config.media_base_url.clone(),
            Duration::from_millis(config.fetch_timeout_ms),
        )
    }

    /// Token names come from untrusted scripts and must stay a single path
    /// segment.
    pub fn media_url(&self, token_name: &str) -> Result<String, StoreError> {
        if !is_path_segment(token_name) {
            return Err(StoreError::InvalidTokenName(token_name.to_owned()));
        }
        Ok(format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            token_name
        ))
    }
}

fn is_path_segment(s: &str) -> bool {
    !(s.is_empty()
        || s == "."
        || s == ".."
        || s.chars()
            .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control()))
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn fetch(&self, token_name: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.media_url(token_name)?;
        debug!(%url, "fetching token media");
        let resp = self.client.get(&url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Header prefix under which the gateway turns request headers into object
/// attributes.
const ATTRIBUTE_HEADER_PREFIX: &str = "X-Attribute-";

/// Uploads objects through an HTTP gateway that accepts a multipart `POST`
/// at `<gateway_url>/upload/<container>`.
#[derive(Clone, Debug)]
pub struct HttpGatewayStore {
    client: reqwest::Client,
    gateway_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    object_id: String,
    container_id: String,
}

impl HttpGatewayStore {
    pub fn new(gateway_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            gateway_url: gateway_url.into(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        Self::new(
            config.gateway_url.clone(),
            Duration::from_millis(config.fetch_timeout_ms),
        )
    }

    fn upload_request(
        &self,
        container: &str,
        header: &ObjectHeader,
        payload: Vec<u8>,
    ) -> Result<reqwest::Request, StoreError> {
        if !is_path_segment(container) {
            return Err(StoreError::Store(format!("invalid container id '{container}'")));
        }
        let url = format!(
            "{}/upload/{}",
            self.gateway_url.trim_end_matches('/'),
            container
        );
        let form = Form::new().part("file", Part::bytes(payload).file_name("object"));

        let mut req = self.client.post(url).multipart(form);
        for (key, value) in &header.attributes {
            req = req.header(format!("{ATTRIBUTE_HEADER_PREFIX}{key}"), value);
        }
        Ok(req.build()?)
    }
}

#[async_trait]
impl ObjectStore for HttpGatewayStore {
    async fn put_object(
        &self,
        container: String,
        header: ObjectHeader,
        payload: Vec<u8>,
    ) -> Result<ObjectAddress, StoreError> {
        let req = self.upload_request(&container, &header, payload)?;
        debug!(url = %req.url(), "uploading object");
        let resp: UploadResponse = self
            .client
            .execute(req)
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(ObjectAddress {
            container: resp.container_id,
            object_id: resp.object_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> HttpMediaSource {
        HttpMediaSource::new("https://media.example/cats/", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_media_url_joins_single_segment() {
        assert_eq!(
            source().media_url("nyan-42").unwrap(),
            "https://media.example/cats/nyan-42"
        );
    }

    #[test]
    fn test_media_url_rejects_path_tricks() {
        for name in ["", "..", "a/b", "a?x=1", "a#frag", "%2e%2e", "a\nb"] {
            assert!(
                matches!(source().media_url(name), Err(StoreError::InvalidTokenName(_))),
                "accepted {name:?}"
            );
        }
    }

    #[test]
    fn test_header_attribute_lookup() {
        let header = ObjectHeader::default()
            .with_attribute("token", "nyan")
            .with_attribute("owner", "0x01");
        assert_eq!(header.attribute("token"), Some("nyan"));
        assert_eq!(header.attribute("missing"), None);
    }

    #[test]
    fn test_object_address_display() {
        let addr = ObjectAddress {
            container: "cnr".into(),
            object_id: "obj".into(),
        };
        assert_eq!(addr.to_string(), "cnr/obj");
    }

    fn gateway() -> HttpGatewayStore {
        HttpGatewayStore::new("http://gate.example:8081/", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_upload_request_carries_attributes() {
        let header = ObjectHeader::default()
            .with_attribute("FileName", "nyan.gif")
            .with_attribute("Owner", "0x01");
        let req = gateway()
            .upload_request("cnr", &header, b"gif".to_vec())
            .unwrap();

        assert_eq!(req.method(), "POST");
        assert_eq!(req.url().as_str(), "http://gate.example:8081/upload/cnr");
        assert_eq!(req.headers()["x-attribute-filename"], "nyan.gif");
        assert_eq!(req.headers()["x-attribute-owner"], "0x01");
        let content_type = req.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
    }

    #[test]
    fn test_upload_request_rejects_bad_container() {
        let err = gateway()
            .upload_request("../x", &ObjectHeader::default(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::Store(_)));
    }

    #[test]
    fn test_upload_response_shape() {
        let resp: UploadResponse = serde_json::from_str(
            r#"{"object_id":"8N3o7Dt","container_id":"BzCkeFZ","file_name":"nyan.gif"}"#,
        )
        .unwrap();
        assert_eq!(resp.object_id, "8N3o7Dt");
        assert_eq!(resp.container_id, "BzCkeFZ");
    }
}

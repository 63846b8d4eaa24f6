//! Image API (Glance v1)

use super::{versioned_url, ServiceClient, Session};
use crate::domain::ports::{DiskFormat, Image, ImageCatalog};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

#[derive(Deserialize)]
struct ImageList {
    images: Vec<Image>,
}

#[derive(Deserialize)]
struct ImageEnvelope {
    image: Image,
}

/// Glance client bound to a session token
#[derive(Clone)]
pub struct GlanceClient {
    client: ServiceClient,
}

impl GlanceClient {
    pub fn new(session: &Session, endpoint: &str) -> Self {
        Self {
            client: ServiceClient::new(
                "glance",
                &versioned_url(endpoint, "v1"),
                session.token(),
                session.http().clone(),
            ),
        }
    }
}

#[async_trait]
impl ImageCatalog for GlanceClient {
    async fn find_image(&self, name: &str, disk_format: DiskFormat) -> Result<Option<Image>> {
        let path = "/images/detail";
        let request = self
            .client
            .request(Method::GET, path)
            .query(&[("name", name.to_string()), ("disk_format", disk_format.to_string())]);
        let response = self.client.send(path, request).await?;
        Ok(response
            .json::<ImageList>()
            .await?
            .images
            .into_iter()
            .find(|image| image.name == name))
    }

    async fn create_image(&self, name: &str, disk_format: DiskFormat, data: Vec<u8>) -> Result<Image> {
        let path = "/images";
        let request = self
            .client
            .request(Method::POST, path)
            .header("x-image-meta-name", name)
            .header("x-image-meta-disk-format", disk_format.to_string())
            .header("x-image-meta-container-format", disk_format.to_string())
            .header("x-image-meta-is-public", "true")
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data);
        let response = self.client.send(path, request).await?;
        Ok(response.json::<ImageEnvelope>().await?.image)
    }
}

//! Deploy kernel and ramdisk images

use crate::domain::ports::{DiskFormat, ImageCatalog};
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, info};

/// Image ids of a deploy kernel and ramdisk; `None` when skipped as missing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelRamdisk {
    pub kernel: Option<String>,
    pub ramdisk: Option<String>,
}

async fn find_or_create(
    catalog: &dyn ImageCatalog,
    name: &str,
    disk_format: DiskFormat,
    path: Option<&Path>,
    skip_missing: bool,
) -> Result<Option<String>> {
    if let Some(image) = catalog.find_image(name, disk_format).await? {
        debug!(image = %name, id = %image.id, "Found existing image");
        return Ok(Some(image.id));
    }

    match path {
        Some(path) => {
            let data = tokio::fs::read(path).await?;
            let image = catalog.create_image(name, disk_format, data).await?;
            info!(image = %name, id = %image.id, format = %disk_format, "Uploaded image");
            Ok(Some(image.id))
        }
        None if skip_missing => Ok(None),
        None => Err(Error::NotFound {
            kind: format!("image ({disk_format})"),
            name: name.to_string(),
        }),
    }
}

/// Find the named kernel and ramdisk, uploading them from disk when a path is
/// given and the image does not exist yet
pub async fn create_or_find_kernel_and_ramdisk(
    catalog: &dyn ImageCatalog,
    kernel_name: Option<&str>,
    ramdisk_name: Option<&str>,
    kernel_path: Option<&Path>,
    ramdisk_path: Option<&Path>,
    skip_missing: bool,
) -> Result<KernelRamdisk> {
    let kernel = match kernel_name {
        Some(name) => find_or_create(catalog, name, DiskFormat::Aki, kernel_path, skip_missing).await?,
        None => None,
    };
    let ramdisk = match ramdisk_name {
        Some(name) => find_or_create(catalog, name, DiskFormat::Ari, ramdisk_path, skip_missing).await?,
        None => None,
    };
    Ok(KernelRamdisk { kernel, ramdisk })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Image;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::io::Write;

    #[derive(Default)]
    struct MemoryCatalog {
        images: Mutex<Vec<(Image, DiskFormat, Vec<u8>)>>,
    }

    #[async_trait]
    impl ImageCatalog for MemoryCatalog {
        async fn find_image(&self, name: &str, disk_format: DiskFormat) -> Result<Option<Image>> {
            Ok(self
                .images
                .lock()
                .iter()
                .find(|(image, format, _)| image.name == name && *format == disk_format)
                .map(|(image, _, _)| image.clone()))
        }

        async fn create_image(&self, name: &str, disk_format: DiskFormat, data: Vec<u8>) -> Result<Image> {
            let mut images = self.images.lock();
            let image = Image {
                id: format!("img-{}", images.len() + 1),
                name: name.to_string(),
            };
            images.push((image.clone(), disk_format, data));
            Ok(image)
        }
    }

    #[tokio::test]
    async fn test_uploads_missing_images() {
        let catalog = MemoryCatalog::default();
        let mut kernel = tempfile::NamedTempFile::new().unwrap();
        kernel.write_all(b"kernel-bytes").unwrap();
        let mut ramdisk = tempfile::NamedTempFile::new().unwrap();
        ramdisk.write_all(b"ramdisk-bytes").unwrap();

        let ids = create_or_find_kernel_and_ramdisk(
            &catalog,
            Some("bm-deploy-kernel"),
            Some("bm-deploy-ramdisk"),
            Some(kernel.path()),
            Some(ramdisk.path()),
            false,
        )
        .await
        .unwrap();

        assert_eq!(ids.kernel.as_deref(), Some("img-1"));
        assert_eq!(ids.ramdisk.as_deref(), Some("img-2"));
        let images = catalog.images.lock();
        assert_eq!(images[0].1, DiskFormat::Aki);
        assert_eq!(images[0].2, b"kernel-bytes");
        assert_eq!(images[1].1, DiskFormat::Ari);
    }

    #[tokio::test]
    async fn test_finds_existing_images_without_upload() {
        let catalog = MemoryCatalog::default();
        catalog.create_image("k", DiskFormat::Aki, vec![]).await.unwrap();
        catalog.create_image("r", DiskFormat::Ari, vec![]).await.unwrap();

        let ids = create_or_find_kernel_and_ramdisk(&catalog, Some("k"), Some("r"), None, None, false)
            .await
            .unwrap();

        assert_eq!(ids.kernel.as_deref(), Some("img-1"));
        assert_eq!(ids.ramdisk.as_deref(), Some("img-2"));
        assert_eq!(catalog.images.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_image_without_path() {
        let catalog = MemoryCatalog::default();
        let err = create_or_find_kernel_and_ramdisk(&catalog, Some("k"), Some("r"), None, None, false)
            .await
            .unwrap_err();
        assert_matches!(err, Error::NotFound { .. });

        let ids = create_or_find_kernel_and_ramdisk(&catalog, Some("k"), Some("r"), None, None, true)
            .await
            .unwrap();
        assert_eq!(ids, KernelRamdisk::default());
    }

    #[tokio::test]
    async fn test_format_must_match() {
        let catalog = MemoryCatalog::default();
        catalog.create_image("deploy", DiskFormat::Ari, vec![]).await.unwrap();

        let ids = create_or_find_kernel_and_ramdisk(&catalog, Some("deploy"), None, None, None, true)
            .await
            .unwrap();
        assert_eq!(ids.kernel, None);
    }
}

use anyhow::Context;
use bytes::Bytes;
use rand::Rng;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::storage::StorageClient;

pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
pub const ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

const RANDOM_ID_LEN: usize = 13;
const RANDOM_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validation {
    fn ok() -> Self {
        Self { valid: true, error: None }
    }

    fn rejected(msg: &str) -> Self {
        Self { valid: false, error: Some(msg.to_string()) }
    }
}

pub struct UploadItem<'a> {
    pub body: Bytes,
    pub file_name: &'a str,
    pub content_type: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedPhoto {
    pub url: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoEntry {
    pub name: String,
    pub path: String,
    pub url: String,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub fn validate(size: usize, content_type: &str) -> Validation {
    if size == 0 {
        return Validation::rejected("No file provided");
    }
    if size > MAX_FILE_SIZE {
        return Validation::rejected("File size must be less than 5MB");
    }
    if !ALLOWED_TYPES.contains(&content_type) {
        return Validation::rejected("File type not supported. Please use JPEG, PNG, WebP, or GIF");
    }
    Validation::ok()
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

fn extension(original_name: &str) -> Option<String> {
    let (_, ext) = original_name.rsplit_once('.')?;
    let ext = ext.trim().to_lowercase();
    (!ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())).then_some(ext)
}

fn random_id() -> String {
    let mut rng = rand::thread_rng();
    (0..RANDOM_ID_LEN)
        .map(|_| RANDOM_ID_CHARSET[rng.gen_range(0..RANDOM_ID_CHARSET.len())] as char)
        .collect()
}

/// `user-<id>-<millis>-<random>.<ext>`, or `photo-...` without a user.
pub fn generate_file_name(original_name: &str, user_id: Option<&str>) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let ext = extension(original_name).unwrap_or_else(|| "jpg".to_string());
    let prefix = match user_id {
        Some(id) => format!("user-{id}"),
        None => "photo".to_string(),
    };
    format!("{prefix}-{millis}-{}.{ext}", random_id())
}

pub fn user_prefix(user_id: &str) -> String {
    format!("users/{user_id}/")
}

/// Validates and stores a single photo. No retries on storage failure.
pub async fn upload(
    storage: &dyn StorageClient,
    item: UploadItem<'_>,
    user_id: Option<&str>,
) -> Result<UploadedPhoto, UploadError> {
    let check = validate(item.body.len(), item.content_type);
    if let Some(err) = check.error {
        warn!(size = item.body.len(), content_type = %item.content_type, %err, "photo rejected");
        return Err(UploadError::Rejected(err));
    }

    // Names without a usable extension fall back to the declared type.
    let file_name = if extension(item.file_name).is_some() {
        generate_file_name(item.file_name, user_id)
    } else {
        let ext = ext_from_mime(item.content_type).unwrap_or("jpg");
        generate_file_name(&format!("upload.{ext}"), user_id)
    };
    let path = match user_id {
        Some(id) => format!("{}{file_name}", user_prefix(id)),
        None => format!("public/{file_name}"),
    };

    storage
        .put_object(&path, item.body, item.content_type)
        .await
        .with_context(|| format!("put_object {}", path))?;

    info!(%path, "photo stored");
    Ok(UploadedPhoto { url: storage.public_url(&path), path })
}

pub async fn list_user_photos(storage: &dyn StorageClient, user_id: &str) -> anyhow::Result<Vec<PhotoEntry>> {
    let prefix = user_prefix(user_id);
    let objects = storage
        .list_objects(&prefix)
        .await
        .with_context(|| format!("list photos under {}", prefix))?;
    Ok(objects
        .into_iter()
        .map(|o| PhotoEntry {
            name: o.key.trim_start_matches(&prefix).to_string(),
            url: storage.public_url(&o.key),
            path: o.key,
            size: o.size,
        })
        .collect())
}

pub async fn delete(storage: &dyn StorageClient, path: &str) -> anyhow::Result<()> {
    storage
        .delete_object(path)
        .await
        .with_context(|| format!("delete photo {}", path))?;
    info!(%path, "photo deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn size_limit_is_five_mebibytes() {
        assert!(validate(4 * 1024 * 1024, "image/jpeg").valid);
        assert!(validate(MAX_FILE_SIZE, "image/png").valid);

        let too_big = validate(6 * 1024 * 1024, "image/jpeg");
        assert!(!too_big.valid);
        assert_eq!(too_big.error.as_deref(), Some("File size must be less than 5MB"));
    }

    #[test]
    fn only_web_image_types_pass() {
        for ct in ALLOWED_TYPES {
            assert!(validate(1024, ct).valid, "{ct}");
        }
        let bmp = validate(1024 * 1024, "image/bmp");
        assert!(!bmp.valid);
        assert!(bmp.error.unwrap().starts_with("File type not supported"));
        assert_eq!(validate(0, "image/png").error.as_deref(), Some("No file provided"));
    }

    #[test]
    fn file_names_carry_owner_and_extension() {
        let name = generate_file_name("Graduation.PNG", Some("user-1"));
        assert!(name.starts_with("user-user-1-"), "{name}");
        assert!(name.ends_with(".png"));

        let parts: Vec<&str> = name.trim_end_matches(".png").rsplitn(3, '-').collect();
        assert_eq!(parts[0].len(), 13);
        assert!(parts[0].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(parts[1].parse::<i128>().is_ok());

        let anon = generate_file_name("snapshot", None);
        assert!(anon.starts_with("photo-"));
        assert!(anon.ends_with(".jpg"));
    }

    #[test]
    fn ext_from_mime_known_types() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/gif"), Some("gif"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn upload_stores_under_owner_prefix_and_lists() {
        let storage = MemoryStorage::new("http://localhost:8080/storage");
        let photo = upload(
            &storage,
            UploadItem {
                body: Bytes::from(vec![0u8; 4 * 1024 * 1024]),
                file_name: "reunion.jpeg",
                content_type: "image/jpeg",
            },
            Some("user-1"),
        )
        .await
        .unwrap();

        assert!(photo.path.starts_with("users/user-1/user-user-1-"));
        assert_eq!(photo.url, format!("http://localhost:8080/storage/{}", photo.path));

        let listed = list_user_photos(&storage, "user-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, photo.path);
        assert_eq!(listed[0].size, 4 * 1024 * 1024);

        delete(&storage, &photo.path).await.unwrap();
        assert!(list_user_photos(&storage, "user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn anonymous_upload_goes_to_public_and_bad_files_are_not_stored() {
        let storage = MemoryStorage::new("http://localhost/storage");
        let photo = upload(
            &storage,
            UploadItem { body: Bytes::from_static(b"GIF89a"), file_name: "", content_type: "image/gif" },
            None,
        )
        .await
        .unwrap();
        assert!(photo.path.starts_with("public/photo-"));
        assert!(photo.path.ends_with(".gif"));

        let err = upload(
            &storage,
            UploadItem {
                body: Bytes::from(vec![0u8; 1024 * 1024]),
                file_name: "scan.bmp",
                content_type: "image/bmp",
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UploadError::Rejected(_)));
        assert_eq!(storage.list_objects("public/").await.unwrap().len(), 1);
    }
}

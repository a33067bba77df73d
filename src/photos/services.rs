use anyhow::Context;
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::state::AppState;

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

fn ext_from_filename(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "webp" => Some("webp"),
        "heic" => Some("heic"),
        _ => None,
    }
}

fn photo_ext(content_type: &str, filename: Option<&str>) -> &'static str {
    ext_from_mime(content_type)
        .or_else(|| filename.and_then(ext_from_filename))
        .unwrap_or("bin")
}

/// Object key behind a public photo URL, if the URL points into our bucket.
fn key_from_url<'a>(public_url: &str, url: &'a str) -> Option<&'a str> {
    url.strip_prefix(public_url.trim_end_matches('/'))
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|key| !key.is_empty())
}

async fn release_object(st: &AppState, url: &str) -> Result<(), ServiceError> {
    let Some(key) = key_from_url(&st.config.minio.public_url, url) else {
        warn!(%url, "photo url outside bucket; leaving object alone");
        return Ok(());
    };
    st.storage
        .delete_object(key)
        .await
        .with_context(|| format!("delete_object {key}"))
        .map_err(ServiceError::ObjectStorage)
}

/// Uploads a new profile photo, releases the previous one and returns the public URL.
#[instrument(skip(st, body))]
pub async fn upload_profile_photo(
    st: &AppState,
    user_id: Uuid,
    body: Bytes,
    content_type: &str,
    filename: Option<&str>,
) -> Result<String, ServiceError> {
    let previous = st.accounts.profile(user_id).await?.photo;

    let key = format!("photos/{}.{}", Uuid::new_v4(), photo_ext(content_type, filename));
    st.storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {key}"))
        .map_err(ServiceError::ObjectStorage)?;

    if let Some(old) = previous {
        if let Err(e) = release_object(st, &old).await {
            // the new object has no reference yet; don't leave it behind
            if let Err(cleanup) = st.storage.delete_object(&key).await {
                warn!(error = ?cleanup, %key, "failed to discard unreferenced photo");
            }
            return Err(e);
        }
        st.accounts.dissociate_photo(user_id).await?;
    }

    let url = format!("{}/{}", st.config.minio.public_url.trim_end_matches('/'), key);
    st.accounts.associate_photo(user_id, &url).await?;
    info!(%key, "profile photo uploaded");
    Ok(url)
}

/// Deletes the stored object, if any, and clears the reference. Safe to repeat.
#[instrument(skip(st))]
pub async fn remove_profile_photo(st: &AppState, user_id: Uuid) -> Result<(), ServiceError> {
    if let Some(url) = st.accounts.profile(user_id).await?.photo {
        release_object(st, &url).await?;
    }
    st.accounts.dissociate_photo(user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fakes;
    use crate::users::service::Registration;

    async fn seeded() -> (Fakes, AppState, Uuid) {
        let fakes = Fakes::default();
        let st = AppState::fake_with(&fakes);
        let token = st
            .accounts
            .register(Registration {
                email: "p@x.com".into(),
                password: "secret1".into(),
                name: None,
                surname: None,
                phone_number: None,
                birth_date: "01-01-2000".into(),
                gender: None,
            })
            .await
            .unwrap();
        let id = Fakes::jwt().verify(&token).unwrap().user_id;
        (fakes, st, id)
    }

    #[test]
    fn extension_prefers_mime_then_filename() {
        assert_eq!(photo_ext("image/png", Some("a.jpg")), "png");
        assert_eq!(photo_ext("application/octet-stream", Some("A.JPEG")), "jpg");
        assert_eq!(photo_ext("application/octet-stream", Some("notes.txt")), "bin");
        assert_eq!(photo_ext("", None), "bin");
    }

    #[test]
    fn key_is_recovered_from_public_url() {
        let base = "https://cdn.local/photos/";
        assert_eq!(
            key_from_url(base, "https://cdn.local/photos/photos/a.jpg"),
            Some("photos/a.jpg")
        );
        assert_eq!(key_from_url(base, "https://elsewhere/a.jpg"), None);
        assert_eq!(key_from_url(base, "https://cdn.local/photos/"), None);
    }

    #[tokio::test]
    async fn upload_replaces_previous_object() {
        let (fakes, st, id) = seeded().await;

        let first = upload_profile_photo(&st, id, Bytes::from_static(b"one"), "image/jpeg", None)
            .await
            .unwrap();
        assert!(first.starts_with("https://fake.local/photos/photos/"));
        assert!(first.ends_with(".jpg"));
        assert_eq!(fakes.storage.len(), 1);

        let second = upload_profile_photo(&st, id, Bytes::from_static(b"two"), "image/png", None)
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(fakes.storage.len(), 1);
        let key = key_from_url(&st.config.minio.public_url, &second).unwrap();
        assert!(fakes.storage.contains(key));
        assert_eq!(
            st.accounts.profile(id).await.unwrap().photo.as_deref(),
            Some(second.as_str())
        );
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (fakes, st, id) = seeded().await;
        upload_profile_photo(&st, id, Bytes::from_static(b"one"), "image/webp", None)
            .await
            .unwrap();

        remove_profile_photo(&st, id).await.unwrap();
        remove_profile_photo(&st, id).await.unwrap();

        assert!(fakes.storage.is_empty());
        assert_eq!(st.accounts.profile(id).await.unwrap().photo, None);
    }

    #[tokio::test]
    async fn failed_release_discards_new_object() {
        let (fakes, st, id) = seeded().await;
        let first = upload_profile_photo(&st, id, Bytes::from_static(b"one"), "image/jpeg", None)
            .await
            .unwrap();
        let first_key = key_from_url(&st.config.minio.public_url, &first).unwrap();
        fakes.storage.fail_deletes_of(first_key);

        let err = upload_profile_photo(&st, id, Bytes::from_static(b"two"), "image/png", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ObjectStorage(_)));

        assert_eq!(fakes.storage.len(), 1);
        assert!(fakes.storage.contains(first_key));
        assert_eq!(
            st.accounts.profile(id).await.unwrap().photo.as_deref(),
            Some(first.as_str())
        );
    }

    #[tokio::test]
    async fn upload_for_unknown_user_stores_nothing() {
        let (fakes, st, _) = seeded().await;
        let err = upload_profile_photo(&st, Uuid::new_v4(), Bytes::new(), "image/png", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
        assert_eq!(fakes.storage.len(), 0);
    }
}

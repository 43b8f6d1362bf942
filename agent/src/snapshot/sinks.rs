use std::path::Path;

use aws_sdk_s3::primitives::ByteStream;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::config::Config;
use crate::util::Error;

const GCS_OBJECT_NAME: &AsciiSet = &CONTROLS.add(b' ').add(b'?').add(b'#').add(b'%');

/// Uploads `local_path` to `remote_key` using the configured sink type.
/// Unknown sink types are a warning, not an error — the local snapshot is
/// still a success even if nothing gets shipped off-box.
pub async fn upload(config: &Config, local_path: &Path, remote_key: &str) -> Result<(), Error> {
    match config.backup_store_type.as_str() {
        "s3" => upload_s3(config, local_path, remote_key).await,
        "gcs" => upload_gcs(config, local_path, remote_key).await,
        other => {
            tracing::warn!(sink_type = other, "unknown backup store type, skipping upload");
            Ok(())
        }
    }
}

async fn upload_s3(config: &Config, local_path: &Path, remote_key: &str) -> Result<(), Error> {
    let bucket = config
        .backup_store_bucket
        .as_deref()
        .ok_or_else(|| Error::Upload("BACKUP_STORE_BUCKET is not set".to_string()))?;

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(endpoint) = config.backup_store_endpoint.as_deref() {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;
    let client = aws_sdk_s3::Client::new(&sdk_config);

    let body = ByteStream::from_path(local_path)
        .await
        .map_err(|e| Error::Upload(format!("failed to read {}: {e}", local_path.display())))?;

    client
        .put_object()
        .bucket(bucket)
        .key(remote_key)
        .body(body)
        .send()
        .await
        .map_err(|e| Error::Upload(format!("S3 upload failed: {e}")))?;

    tracing::info!(bucket, key = remote_key, "uploaded snapshot to S3");
    Ok(())
}

async fn upload_gcs(config: &Config, local_path: &Path, remote_key: &str) -> Result<(), Error> {
    let bucket = config
        .backup_store_bucket
        .as_deref()
        .ok_or_else(|| Error::Upload("BACKUP_STORE_BUCKET is not set".to_string()))?;

    let bytes = tokio::fs::read(local_path)
        .await
        .map_err(|e| Error::Upload(format!("failed to read {}: {e}", local_path.display())))?;

    let url = format!(
        "https://storage.googleapis.com/upload/storage/v1/b/{bucket}/o?uploadType=media&name={}",
        utf8_percent_encode(remote_key, GCS_OBJECT_NAME)
    );

    let response = reqwest::Client::new()
        .post(&url)
        .header("Content-Type", "application/octet-stream")
        .bearer_auth(gcs_access_token().await?)
        .body(bytes)
        .send()
        .await
        .map_err(|e| Error::Upload(format!("GCS upload request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Upload(format!(
            "GCS upload rejected with status {}",
            response.status()
        )));
    }

    tracing::info!(bucket, key = remote_key, "uploaded snapshot to GCS");
    Ok(())
}

/// Reads the access token handed to every pod by GKE's metadata server /
/// workload identity. There is no first-class GCS crate in this workspace's
/// dependency stack, so the sink speaks the JSON upload API directly instead
/// of pulling in an unrelated cloud SDK for one call.
async fn gcs_access_token() -> Result<String, Error> {
    #[derive(serde::Deserialize)]
    struct TokenResponse {
        access_token: String,
    }

    let response = reqwest::Client::new()
        .get("http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token")
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| Error::Upload(format!("failed to reach metadata server for GCS token: {e}")))?;

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::Upload(format!("malformed GCS token response: {e}")))?;

    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encodes_spaces_but_not_path_separators() {
        assert_eq!(
            utf8_percent_encode("etcd-snapshots/op1.db", GCS_OBJECT_NAME).to_string(),
            "etcd-snapshots/op1.db"
        );
        assert_eq!(utf8_percent_encode("a b", GCS_OBJECT_NAME).to_string(), "a%20b");
    }
}

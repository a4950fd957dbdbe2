#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Identifier list acquisition.
//!
//! The run's NPI list comes from a dated local file when one exists
//! (e.g., a previous run already downloaded it), otherwise it is fetched
//! anonymously from a public S3 bucket and saved locally so the run has a
//! record of exactly which identifiers it started from.
//!
//! The list format is whitespace-separated identifiers with a single
//! header token first, which is skipped during parsing.

use std::path::Path;

use aws_config::{BehaviorVersion, Region};

/// Errors that can occur while acquiring the identifier list.
///
/// Unlike lookup failures, these are run-fatal: without an identifier
/// list there is nothing to do.
#[derive(Debug, thiserror::Error)]
pub enum SourceListError {
    /// S3 `GetObject` failed.
    #[error("Failed to download s3://{bucket}/{key}: {source}")]
    Download {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Reading the object body failed.
    #[error("Failed to read body of s3://{bucket}/{key}: {source}")]
    Body {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error reading or writing the local list file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses an identifier list: whitespace-separated tokens, first token is
/// the header and is dropped. Order is preserved; deduplication is the
/// scheduler's job.
#[must_use]
pub fn parse_identifier_list(text: &str) -> Vec<String> {
    text.split_whitespace().skip(1).map(str::to_owned).collect()
}

/// Loads the identifier list, preferring the local file at `local_path`
/// and falling back to an anonymous S3 download.
///
/// On a download, the raw list is also written to `local_path` before
/// parsing, so later runs on the same date reuse it.
///
/// # Errors
///
/// Returns [`SourceListError`] if neither the local file nor the S3
/// object can be read.
pub async fn load_identifiers(
    local_path: &Path,
    bucket: &str,
    key: &str,
    region: &str,
) -> Result<Vec<String>, SourceListError> {
    if local_path.exists() {
        log::info!("Reading identifier list from {}", local_path.display());
        let text = tokio::fs::read_to_string(local_path).await?;
        return Ok(parse_identifier_list(&text));
    }

    log::info!(
        "{} not found, downloading identifier list from s3://{bucket}/{key}...",
        local_path.display()
    );
    let text = download_list(bucket, key, region).await?;

    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(local_path, &text).await?;
    log::info!("Saved identifier list to {}", local_path.display());

    Ok(parse_identifier_list(&text))
}

/// Downloads the list object from a public bucket without credentials.
async fn download_list(bucket: &str, key: &str, region: &str) -> Result<String, SourceListError> {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_owned()))
        .no_credentials()
        .load()
        .await;
    let client = aws_sdk_s3::Client::new(&config);

    let object = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| SourceListError::Download {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            source: Box::new(e),
        })?;

    let bytes = object
        .body
        .collect()
        .await
        .map_err(|e| SourceListError::Body {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            source: Box::new(e),
        })?
        .into_bytes();

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_header_token() {
        let text = "npi\n1234567890\n9876543210\n";
        assert_eq!(
            parse_identifier_list(text),
            vec!["1234567890".to_owned(), "9876543210".to_owned()]
        );
    }

    #[test]
    fn parse_preserves_order_and_duplicates() {
        let text = "npi 1 2 1 3";
        assert_eq!(parse_identifier_list(text), vec!["1", "2", "1", "3"]);
    }

    #[test]
    fn parse_of_header_only_is_empty() {
        assert!(parse_identifier_list("npi\n").is_empty());
        assert!(parse_identifier_list("").is_empty());
    }

    #[tokio::test]
    async fn load_prefers_existing_local_file() {
        let dir = std::env::temp_dir().join("npi_s3_local_list");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("01-01-2026-npi_list.txt");
        std::fs::write(&path, "npi\n111\n222\n").unwrap();

        // Bucket/key are never touched when the local file exists.
        let identifiers = load_identifiers(&path, "no-such-bucket", "no-such-key", "us-east-2")
            .await
            .unwrap();
        assert_eq!(identifiers, vec!["111", "222"]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! S3-backed [`ObjectStore`].
//!
//! Reads and writes objects through the S3 REST API with AWS Signature V4
//! authentication. Supports custom endpoints for S3-compatible services
//! (MinIO, LocalStack).
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for signing, so no C
//! library such as `aws-lc-sys` is needed.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! backend = "s3"
//!
//! [storage.s3]
//! bucket = "bulletin-ingest"
//! prefix = "harti/page1/"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / IAM roles)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::S3StorageConfig;
use crate::storage::ObjectStore;

type HmacSha256 = Hmac<Sha256>;

pub struct S3Store {
    config: S3StorageConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3Store {
    pub fn from_env(config: S3StorageConfig) -> Result<Self> {
        Ok(Self {
            config,
            creds: AwsCredentials::from_env()?,
            client: reqwest::Client::new(),
        })
    }

    fn object_key(&self, key: &str) -> String {
        if self.config.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.config.prefix.trim_end_matches('/'), key)
        }
    }

    /// Builds a signed request for `key`. `payload` is hashed into the signature.
    fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        payload: &[u8],
    ) -> reqwest::RequestBuilder {
        let host = s3_host(&self.config);
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = canonical_uri(&self.config, &encoded_key);
        let url = format!("{}://{}{}", scheme(&self.config), host, canonical_uri);

        let headers = SignedHeaders::build(
            method.as_str(),
            &canonical_uri,
            &host,
            payload,
            Utc::now(),
            &self.config.region,
            &self.creds,
        );

        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", &headers.authorization)
            .header("x-amz-content-sha256", &headers.payload_hash)
            .header("x-amz-date", &headers.amz_date);
        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        req
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full_key = self.object_key(key);
        let resp = self
            .signed_request(reqwest::Method::GET, &full_key, b"")
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.config.bucket, full_key))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", status, full_key);
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let full_key = self.object_key(key);
        let resp = self
            .signed_request(reqwest::Method::PUT, &full_key, &bytes)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("Failed to put s3://{}/{}", self.config.bucket, full_key))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                full_key,
                body.chars().take(500).collect::<String>()
            );
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.config.bucket, self.config.prefix)
    }
}

// ============ AWS Credentials ============

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ AWS SigV4 ============

struct SignedHeaders {
    authorization: String,
    payload_hash: String,
    amz_date: String,
}

impl SignedHeaders {
    fn build(
        method: &str,
        canonical_uri: &str,
        host: &str,
        payload: &[u8],
        now: DateTime<Utc>,
        region: &str,
        creds: &AwsCredentials,
    ) -> Self {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(payload);

        let mut headers = vec![
            ("host".to_string(), host.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        );

        Self {
            authorization,
            payload_hash,
            amz_date,
        }
    }
}

/// Virtual-hosted style for AWS, path style for custom endpoints.
fn s3_host(config: &S3StorageConfig) -> String {
    match config.endpoint_url {
        Some(ref endpoint) => endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string(),
        None => format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
    }
}

fn canonical_uri(config: &S3StorageConfig, encoded_key: &str) -> String {
    if config.endpoint_url.is_some() {
        format!("/{}/{}", uri_encode(&config.bucket), encoded_key)
    } else {
        format!("/{}", encoded_key)
    }
}

fn scheme(config: &S3StorageConfig) -> &'static str {
    match config.endpoint_url {
        Some(ref e) if e.starts_with("http://") => "http",
        _ => "https",
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything except `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg(endpoint: Option<&str>) -> S3StorageConfig {
        S3StorageConfig {
            bucket: "examplebucket".to_string(),
            prefix: "harti/".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: endpoint.map(str::to_string),
        }
    }

    #[test]
    fn uri_encode_keeps_unreserved() {
        assert_eq!(uri_encode("bulletin_2024-02-24.csv"), "bulletin_2024-02-24.csv");
        assert_eq!(uri_encode("a b+c"), "a%20b%2Bc");
    }

    #[test]
    fn host_and_uri_follow_endpoint_style() {
        let aws = cfg(None);
        assert_eq!(s3_host(&aws), "examplebucket.s3.us-east-1.amazonaws.com");
        assert_eq!(canonical_uri(&aws, "k.txt"), "/k.txt");
        assert_eq!(scheme(&aws), "https");

        let minio = cfg(Some("http://localhost:9000/"));
        assert_eq!(s3_host(&minio), "localhost:9000");
        assert_eq!(canonical_uri(&minio, "k.txt"), "/examplebucket/k.txt");
        assert_eq!(scheme(&minio), "http");
    }

    #[test]
    fn signing_key_matches_aws_reference() {
        // Reference vector from the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn signature_covers_payload_hash() {
        let creds = AwsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        };
        let now = Utc.with_ymd_and_hms(2024, 2, 24, 0, 0, 0).unwrap();
        let a = SignedHeaders::build("PUT", "/k", "h", b"one", now, "us-east-1", &creds);
        let b = SignedHeaders::build("PUT", "/k", "h", b"two", now, "us-east-1", &creds);
        assert_ne!(a.authorization, b.authorization);
        assert_eq!(a.amz_date, "20240224T000000Z");
        assert!(a
            .authorization
            .starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240224/us-east-1/s3/aws4_request"));
    }

    #[test]
    fn prefix_is_joined_once() {
        let store = S3Store {
            config: cfg(None),
            creds: AwsCredentials {
                access_key_id: String::new(),
                secret_access_key: String::new(),
                session_token: None,
            },
            client: reqwest::Client::new(),
        };
        assert_eq!(store.object_key("processed_pdfs.txt"), "harti/processed_pdfs.txt");
    }
}

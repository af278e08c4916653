//! Time-limited download links for recording audio.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;

use crate::RecordingsError;
use crate::config::Config;
use crate::sigv4::{self, ALGORITHM, CanonicalRequest, Credentials, Scope, UNSIGNED_PAYLOAD};

/// SigV4 presigned URLs may live at most seven days.
const MAX_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[async_trait]
pub trait LinkPresigner: Send + Sync + 'static {
    /// A link to the object behind `filepath`, `None` when the path names no object.
    async fn presign(&self, filepath: &str, ttl: Duration) -> Result<Option<String>, RecordingsError>;
}

/// Where a stored `filepath` points.
#[derive(Debug, PartialEq, Eq)]
pub enum ObjectLocation<'a> {
    /// Already a usable URL.
    Url(&'a str),
    /// Key inside the configured bucket.
    Key(&'a str),
}

/// Resolve a stored `filepath`.
///
/// `http(s)://` paths are links already. `s3://bucket/key` contributes its
/// key only (the configured bucket wins). A leading `/` is dropped. An empty
/// key resolves to nothing.
pub fn resolve_filepath(filepath: &str) -> Option<ObjectLocation<'_>> {
    if filepath.starts_with("https://") || filepath.starts_with("http://") {
        return Some(ObjectLocation::Url(filepath));
    }
    let key = match filepath.strip_prefix("s3://") {
        Some(rest) => match rest.find('/') {
            Some(slash) if slash > 0 => &rest[slash + 1..],
            _ => "",
        },
        None => filepath,
    };
    let key = key.strip_prefix('/').unwrap_or(key);
    if key.is_empty() {
        None
    } else {
        Some(ObjectLocation::Key(key))
    }
}

#[derive(Clone, Debug)]
pub struct S3Presigner {
    bucket: String,
    region: String,
    /// Path-style endpoint override (object storage emulators); virtual-hosted AWS otherwise.
    endpoint: Option<String>,
    credentials: Credentials,
}

impl S3Presigner {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            credentials,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    /// `None` when no bucket is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let bucket = config.bucket.clone()?;
        let presigner = Self::new(bucket, config.region.clone(), config.credentials.clone());
        Some(match &config.s3_endpoint {
            Some(endpoint) => presigner.with_endpoint(endpoint.clone()),
            None => presigner,
        })
    }

    /// URL parsers resolve `.` and `..` segments (encoded or not), so such a
    /// key would be signed and fetched as a different object.
    fn object_url(&self, key: &str) -> Result<(reqwest::Url, String), RecordingsError> {
        if key.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(RecordingsError::Config(format!(
                "object key {key} contains a dot segment and cannot be linked"
            )));
        }
        let encoded_key = sigv4::uri_encode(key, true);
        let base = match &self.endpoint {
            Some(endpoint) => format!("{endpoint}/{}", self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        };
        let url = reqwest::Url::parse(&format!("{base}/{encoded_key}"))
            .map_err(|e| RecordingsError::Config(format!("invalid object URL for {key}: {e}")))?;
        let path = url.path().to_string();
        Ok((url, path))
    }

    /// Presign a GET for `key` as of `now`.
    pub fn presign_key_at(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, RecordingsError> {
        let (mut url, path) = self.object_url(key)?;
        let host = sigv4::host_header(&url)
            .ok_or_else(|| RecordingsError::Config(format!("object URL {url} has no host")))?;
        let scope = Scope {
            region: &self.region,
            service: "s3",
            time: now,
        };

        let mut query = vec![
            ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
            (
                "X-Amz-Credential".to_string(),
                format!(
                    "{}/{}",
                    self.credentials.access_key_id,
                    scope.credential_scope()
                ),
            ),
            ("X-Amz-Date".to_string(), scope.amz_date()),
            (
                "X-Amz-Expires".to_string(),
                ttl.as_secs().clamp(1, MAX_TTL_SECS).to_string(),
            ),
            ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
        ];
        if let Some(token) = &self.credentials.session_token {
            query.push((
                "X-Amz-Security-Token".to_string(),
                token.expose_secret().to_string(),
            ));
        }
        let headers = [("host".to_string(), host)];
        let canonical = CanonicalRequest {
            method: "GET",
            path: &path,
            query: &query,
            headers: &headers,
            payload_hash: UNSIGNED_PAYLOAD,
        };
        let signature = sigv4::signature(&self.credentials, &scope, &canonical);

        url.set_query(Some(&format!(
            "{}&X-Amz-Signature={signature}",
            canonical.canonical_query()
        )));
        Ok(url.to_string())
    }
}

#[async_trait]
impl LinkPresigner for S3Presigner {
    async fn presign(&self, filepath: &str, ttl: Duration) -> Result<Option<String>, RecordingsError> {
        match resolve_filepath(filepath) {
            None => {
                tracing::warn!(filepath, "empty object key after parsing");
                Ok(None)
            }
            Some(ObjectLocation::Url(url)) => Ok(Some(url.to_string())),
            Some(ObjectLocation::Key(key)) => self.presign_key_at(key, ttl, Utc::now()).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use secrecy::SecretString;

    fn presigner() -> S3Presigner {
        S3Presigner::new(
            "call-audio",
            "ap-southeast-2",
            Credentials {
                access_key_id: "AKIDEXAMPLE".into(),
                secret_access_key: SecretString::new("secret".into()),
                session_token: None,
            },
        )
    }

    #[test]
    fn filepath_resolution() {
        assert_eq!(
            resolve_filepath("https://cdn.example.com/a.wav"),
            Some(ObjectLocation::Url("https://cdn.example.com/a.wav"))
        );
        assert_eq!(
            resolve_filepath("s3://other-bucket/calls/a.wav"),
            Some(ObjectLocation::Key("calls/a.wav"))
        );
        assert_eq!(resolve_filepath("/calls/a.wav"), Some(ObjectLocation::Key("calls/a.wav")));
        assert_eq!(resolve_filepath("calls/a.wav"), Some(ObjectLocation::Key("calls/a.wav")));
        assert_eq!(resolve_filepath("s3://bucket-only"), None);
        assert_eq!(resolve_filepath(""), None);
    }

    #[test]
    fn presigned_url_has_sigv4_query() {
        let now = Utc.with_ymd_and_hms(2019, 1, 7, 11, 0, 0).unwrap();
        let url = presigner()
            .presign_key_at("calls/2019 01/a.wav", Duration::from_secs(3600), now)
            .unwrap();
        assert!(url.starts_with(
            "https://call-audio.s3.ap-southeast-2.amazonaws.com/calls/2019%2001/a.wav?"
        ));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains(
            "X-Amz-Credential=AKIDEXAMPLE%2F20190107%2Fap-southeast-2%2Fs3%2Faws4_request"
        ));
        assert!(url.contains("X-Amz-Date=20190107T110000Z"));
        assert!(url.contains("X-Amz-Expires=3600"));
        let signature = url.rsplit("X-Amz-Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn presigning_is_deterministic_for_fixed_time() {
        let now = Utc.with_ymd_and_hms(2019, 1, 7, 11, 0, 0).unwrap();
        let p = presigner();
        let a = p.presign_key_at("a.wav", Duration::from_secs(60), now).unwrap();
        let b = p.presign_key_at("a.wav", Duration::from_secs(60), now).unwrap();
        assert_eq!(a, b);
        let c = p.presign_key_at("b.wav", Duration::from_secs(60), now).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn endpoint_override_uses_path_style() {
        let now = Utc.with_ymd_and_hms(2019, 1, 7, 11, 0, 0).unwrap();
        let url = presigner()
            .with_endpoint("http://localhost:9000/")
            .presign_key_at("a.wav", Duration::from_secs(60), now)
            .unwrap();
        assert!(url.starts_with("http://localhost:9000/call-audio/a.wav?"));
    }

    #[test]
    fn dot_segment_keys_are_refused() {
        let now = Utc.with_ymd_and_hms(2019, 1, 7, 11, 0, 0).unwrap();
        let p = presigner();
        let ttl = Duration::from_secs(60);
        for key in ["calls/../a.wav", "./a.wav", "calls/.."] {
            let err = p.presign_key_at(key, ttl, now).unwrap_err();
            assert!(err.to_string().contains("dot segment"), "{key}: {err}");
        }
        let url = p.presign_key_at("calls/a..b/.wav", ttl, now).unwrap();
        assert!(url.starts_with(
            "https://call-audio.s3.ap-southeast-2.amazonaws.com/calls/a..b/.wav?"
        ));
    }

    #[tokio::test]
    async fn presign_passes_urls_through_and_skips_empty_keys() {
        let p = presigner();
        let ttl = Duration::from_secs(60);
        assert_eq!(
            p.presign("http://example.com/x.wav", ttl).await.unwrap().as_deref(),
            Some("http://example.com/x.wav")
        );
        assert_eq!(p.presign("s3://bucket", ttl).await.unwrap(), None);
        let link = p.presign("s3://bucket/x.wav", ttl).await.unwrap().unwrap();
        assert!(link.contains("/x.wav?X-Amz-Algorithm="));
    }
}

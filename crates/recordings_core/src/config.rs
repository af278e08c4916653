use std::net::SocketAddr;
use std::time::Duration;

use crate::RecordingsError;
use crate::sigv4::Credentials;
use secrecy::SecretString;

const DEFAULT_REGION: &str = "ap-southeast-2";
const DEFAULT_PAGE_LIMIT: u32 = 50;
const DEFAULT_PRESIGN_TTL_SECS: u64 = 3600;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct Config {
    pub table_name: String,
    pub region: String,
    pub credentials: Credentials,
    pub dynamodb_endpoint: String,
    pub bucket: Option<String>,
    pub s3_endpoint: Option<String>,
    pub presign_ttl: Duration,
    pub default_page_limit: u32,
    pub address: SocketAddr,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, RecordingsError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, RecordingsError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |k: &str| get(k).filter(|v| !v.trim().is_empty());

        let table_name = get("RECORDINGS_TABLE_NAME")
            .ok_or_else(|| RecordingsError::Config("RECORDINGS_TABLE_NAME missing".into()))?;
        let access_key_id = get("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| RecordingsError::Config("AWS_ACCESS_KEY_ID missing".into()))?;
        let secret_access_key = get("AWS_SECRET_ACCESS_KEY")
            .ok_or_else(|| RecordingsError::Config("AWS_SECRET_ACCESS_KEY missing".into()))?;
        let region = get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.into());
        let dynamodb_endpoint = get("DYNAMODB_ENDPOINT")
            .unwrap_or_else(|| format!("https://dynamodb.{region}.amazonaws.com"));

        let credentials = Credentials {
            access_key_id,
            secret_access_key: SecretString::new(secret_access_key.into()),
            session_token: get("AWS_SESSION_TOKEN").map(|t| SecretString::new(t.into())),
        };

        let presign_ttl = Duration::from_secs(parse_or(
            get("PRESIGN_TTL_SECS"),
            "PRESIGN_TTL_SECS",
            DEFAULT_PRESIGN_TTL_SECS,
        )?);
        let default_page_limit = parse_or(
            get("DEFAULT_PAGE_LIMIT"),
            "DEFAULT_PAGE_LIMIT",
            DEFAULT_PAGE_LIMIT,
        )?;
        let request_timeout = Duration::from_secs(parse_or(
            get("REQUEST_TIMEOUT_SECS"),
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        let address = parse_or(
            get("ADDRESS"),
            "ADDRESS",
            SocketAddr::from(([127, 0, 0, 1], 3000)),
        )?;

        Ok(Self {
            table_name,
            region,
            credentials,
            dynamodb_endpoint: dynamodb_endpoint.trim_end_matches('/').to_string(),
            bucket: get("RECORDINGS_BUCKET"),
            s3_endpoint: get("S3_ENDPOINT").map(|e| e.trim_end_matches('/').to_string()),
            presign_ttl,
            default_page_limit,
            address,
            request_timeout,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    key: &str,
    default: T,
) -> Result<T, RecordingsError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| RecordingsError::Config(format!("{key} has invalid value {v:?}"))),
    }
}

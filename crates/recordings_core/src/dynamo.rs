//! [`ScanClient`] over the DynamoDB JSON protocol.
//!
//! Requests are `POST /` with an `X-Amz-Target` naming the operation and a
//! SigV4 `Authorization` header. Works against AWS and DynamoDB Local.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::config::Config;
use crate::filter::FilterExpression;
use crate::retry::RetryPolicy;
use crate::sigv4::{self, CanonicalRequest, Credentials, Scope};
use crate::{Record, RecordingsError, ScanClient, ScanPage, ScanRequest};

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const SCAN_TARGET: &str = "DynamoDB_20120810.Scan";
const SERVICE: &str = "dynamodb";

const THROTTLING_KINDS: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
];

#[derive(Clone, Debug)]
pub struct DynamoScanClient {
    endpoint: reqwest::Url,
    region: String,
    credentials: Credentials,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScanOutput {
    #[serde(default)]
    items: Vec<Map<String, Value>>,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    scanned_count: u64,
    last_evaluated_key: Option<Value>,
}

impl DynamoScanClient {
    /// Create a client for `endpoint` (e.g. `https://dynamodb.ap-southeast-2.amazonaws.com`
    /// or `http://localhost:8000`).
    pub fn new(
        endpoint: &str,
        region: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self, RecordingsError> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| {
            RecordingsError::Config(format!("invalid DynamoDB endpoint {endpoint}: {e}"))
        })?;
        if endpoint.host_str().is_none() {
            return Err(RecordingsError::Config(format!(
                "DynamoDB endpoint {endpoint} has no host"
            )));
        }
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            endpoint,
            region: region.into(),
            credentials,
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, RecordingsError> {
        Self::new(
            &config.dynamodb_endpoint,
            config.region.clone(),
            config.credentials.clone(),
        )
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The JSON request body for a scan. `limit == 0` omits `Limit`.
    fn scan_body(request: &ScanRequest, select_count: bool) -> Value {
        let mut body = json!({ "TableName": request.table });
        if request.limit > 0 {
            body["Limit"] = json!(request.limit);
        }
        if let Some(key) = &request.exclusive_start_key {
            body["ExclusiveStartKey"] = key.clone();
        }
        if select_count {
            body["Select"] = json!("COUNT");
        }
        if let Some(expression) = request.filter.expression() {
            body["FilterExpression"] = json!(expression);
            body["ExpressionAttributeNames"] = json!(request.filter.names());
            let values: Map<String, Value> = request
                .filter
                .values()
                .into_iter()
                .map(|(placeholder, value)| (placeholder, json!({ "S": value })))
                .collect();
            body["ExpressionAttributeValues"] = Value::Object(values);
        }
        body
    }

    async fn scan(&self, body: &Value) -> Result<ScanOutput, RecordingsError> {
        self.retry.retry_async(|| self.send_scan(body)).await
    }

    /// One signed attempt.
    async fn send_scan(&self, body: &Value) -> Result<ScanOutput, RecordingsError> {
        let payload = serde_json::to_vec(body).map_err(|e| RecordingsError::Decode(e.to_string()))?;
        let host = sigv4::host_header(&self.endpoint).ok_or_else(|| {
            RecordingsError::Config(format!("DynamoDB endpoint {} has no host", self.endpoint))
        })?;
        let scope = Scope {
            region: &self.region,
            service: SERVICE,
            time: Utc::now(),
        };

        let mut headers = vec![
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            ("host".to_string(), host),
            ("x-amz-date".to_string(), scope.amz_date()),
            ("x-amz-target".to_string(), SCAN_TARGET.to_string()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push((
                "x-amz-security-token".to_string(),
                token.expose_secret().to_string(),
            ));
        }
        let payload_hash = sigv4::sha256_hex(&payload);
        let canonical = CanonicalRequest {
            method: "POST",
            path: self.endpoint.path(),
            query: &[],
            headers: &headers,
            payload_hash: &payload_hash,
        };
        let authorization = sigv4::authorization_header(&self.credentials, &scope, &canonical);

        // reqwest derives `host` from the URL itself.
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("authorization", authorization);
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            request = request.header(name.as_str(), value.as_str());
        }

        let resp = request.body(payload).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &text));
        }
        serde_json::from_str::<ScanOutput>(&text).map_err(|e| {
            let body_snippet: String = text.chars().take(256).collect();
            RecordingsError::Decode(format!("decoding scan output: {e} - body: {body_snippet}"))
        })
    }
}

#[async_trait]
impl ScanClient for DynamoScanClient {
    async fn scan_page(&self, request: &ScanRequest) -> Result<ScanPage, RecordingsError> {
        let output = self.scan(&Self::scan_body(request, false)).await?;
        let items = output
            .items
            .iter()
            .map(item_from_attributes)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            table = %request.table,
            count = output.count,
            scanned = output.scanned_count,
            more = output.last_evaluated_key.is_some(),
            "scan page"
        );
        Ok(ScanPage {
            items,
            last_evaluated_key: output.last_evaluated_key,
            count: output.count,
            scanned_count: output.scanned_count,
        })
    }

    async fn count_matching(
        &self,
        table: &str,
        filter: &FilterExpression,
    ) -> Result<u64, RecordingsError> {
        let mut total = 0u64;
        let mut start_key = None;
        let mut pages = 0u32;
        loop {
            let request = ScanRequest::new(table, 0)
                .with_filter(filter.clone())
                .with_start_key(start_key.take());
            let output = self.scan(&Self::scan_body(&request, true)).await?;
            total += output.count;
            pages += 1;
            match output.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }
        tracing::debug!(table, total, pages, "counted matching records");
        Ok(total)
    }
}

/// Map an error response (`{"__type": "...#Kind", "message": "..."}`) to an error.
fn error_from_body(status: u16, body: &str) -> RecordingsError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let kind = parsed
        .get("__type")
        .and_then(Value::as_str)
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let message = parsed
        .get("message")
        .or_else(|| parsed.get("Message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(256).collect());

    if THROTTLING_KINDS.contains(&kind.as_str()) {
        return RecordingsError::Throttled(message);
    }
    RecordingsError::Service {
        status,
        kind,
        message,
    }
}

/// Convert a typed attribute map (`{"ani": {"S": "0412"}}`) to plain JSON.
pub fn item_from_attributes(item: &Map<String, Value>) -> Result<Record, RecordingsError> {
    item.iter()
        .map(|(name, av)| Ok((name.clone(), from_attribute_value(av)?)))
        .collect()
}

/// Convert one typed attribute value to plain JSON. Binary values stay base64.
pub fn from_attribute_value(av: &Value) -> Result<Value, RecordingsError> {
    let invalid = || RecordingsError::Decode(format!("unsupported attribute value {av}"));
    let obj = av.as_object().filter(|o| o.len() == 1).ok_or_else(invalid)?;
    let Some((tag, inner)) = obj.iter().next() else {
        return Err(invalid());
    };
    match (tag.as_str(), inner) {
        ("S", Value::String(s)) | ("B", Value::String(s)) => Ok(Value::String(s.clone())),
        ("N", Value::String(n)) => Ok(parse_number(n)),
        ("BOOL", Value::Bool(b)) => Ok(Value::Bool(*b)),
        ("NULL", _) => Ok(Value::Null),
        ("M", Value::Object(map)) => item_from_attributes(map).map(Value::Object),
        ("L", Value::Array(items)) => items
            .iter()
            .map(from_attribute_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ("SS", Value::Array(items)) | ("BS", Value::Array(items)) => Ok(Value::Array(items.clone())),
        ("NS", Value::Array(items)) => Ok(Value::Array(
            items
                .iter()
                .map(|n| n.as_str().map(parse_number).unwrap_or_else(|| n.clone()))
                .collect(),
        )),
        _ => Err(invalid()),
    }
}

fn parse_number(n: &str) -> Value {
    n.parse::<serde_json::Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(n.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{build_date_filter_fragment, build_text_filter_fragment};

    #[test]
    fn scan_body_carries_filter_and_placeholders() {
        let filter = FilterExpression::new()
            .with(build_text_filter_fragment("ani", "ani", "0412"))
            .with(build_date_filter_fragment(
                "local_start_time",
                "local_start_time",
                "01/07/2019",
            ));
        let request = ScanRequest::new("recordings", 50)
            .with_filter(filter)
            .with_start_key(Some(json!({"id": {"S": "r9"}})));
        let body = DynamoScanClient::scan_body(&request, false);
        assert_eq!(body["TableName"], "recordings");
        assert_eq!(body["Limit"], 50);
        assert_eq!(body["ExclusiveStartKey"], json!({"id": {"S": "r9"}}));
        assert_eq!(
            body["FilterExpression"],
            "contains(#ani, :ani) AND begins_with(#local_start_time, :local_start_time)"
        );
        assert_eq!(body["ExpressionAttributeNames"]["#local_start_time"], "local_start_time");
        assert_eq!(
            body["ExpressionAttributeValues"][":local_start_time"],
            json!({"S": "2019-01-07"})
        );
        assert!(body.get("Select").is_none());
    }

    #[test]
    fn unfiltered_count_body_is_minimal() {
        let body = DynamoScanClient::scan_body(&ScanRequest::new("recordings", 0), true);
        assert_eq!(body, json!({"TableName": "recordings", "Select": "COUNT"}));
    }

    #[test]
    fn attribute_values_flatten_to_plain_json() {
        let item = json!({
            "id": {"S": "r1"},
            "duration": {"N": "42"},
            "rate": {"N": "1.5"},
            "archived": {"BOOL": false},
            "notes": {"NULL": true},
            "meta": {"M": {"agent": {"S": "kim"}}},
            "tags": {"L": [{"S": "a"}, {"N": "2"}]},
            "codes": {"NS": ["1", "2"]}
        });
        let plain = item_from_attributes(item.as_object().unwrap()).unwrap();
        assert_eq!(
            Value::Object(plain),
            json!({
                "id": "r1",
                "duration": 42,
                "rate": 1.5,
                "archived": false,
                "notes": null,
                "meta": {"agent": "kim"},
                "tags": ["a", 2],
                "codes": [1, 2]
            })
        );
    }

    #[test]
    fn malformed_attribute_value_is_a_decode_error() {
        assert!(matches!(
            from_attribute_value(&json!({"S": 1})),
            Err(RecordingsError::Decode(_))
        ));
        assert!(from_attribute_value(&json!({"S": "a", "N": "1"})).is_err());
    }

    #[test]
    fn error_bodies_are_classified() {
        let throttled = error_from_body(
            400,
            r#"{"__type":"com.amazonaws.dynamodb.v20120810#ProvisionedThroughputExceededException","message":"slow down"}"#,
        );
        assert!(matches!(throttled, RecordingsError::Throttled(ref m) if m == "slow down"));

        let missing = error_from_body(
            400,
            r#"{"__type":"com.amazonaws.dynamodb.v20120810#ResourceNotFoundException","Message":"no table"}"#,
        );
        assert!(matches!(
            missing,
            RecordingsError::Service { status: 400, ref kind, .. } if kind == "ResourceNotFoundException"
        ));

        let opaque = error_from_body(500, "boom");
        assert!(matches!(opaque, RecordingsError::Service { status: 500, ref message, .. } if message == "boom"));
    }

    #[test]
    fn rejects_endpoint_without_host() {
        let creds = Credentials {
            access_key_id: "AKID".into(),
            secret_access_key: secrecy::SecretString::new("s".into()),
            session_token: None,
        };
        assert!(DynamoScanClient::new("not a url", "us-east-1", creds).is_err());
    }
}

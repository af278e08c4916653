//! In-memory [`ScanClient`] for tests, demos and local development.
//!
//! Mirrors the paging behaviour of a DynamoDB scan: `limit` caps how many
//! records are *examined* per call, the filter is applied afterwards, and the
//! continuation key is the key of the last examined record.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::filter::FilterExpression;
use crate::{Record, RecordingsError, ScanClient, ScanPage, ScanRequest};

pub struct InMemoryScanClient {
    key_attribute: String,
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl InMemoryScanClient {
    /// `key_attribute` names the attribute used for continuation keys.
    pub fn new(key_attribute: impl Into<String>) -> Self {
        Self {
            key_attribute: key_attribute.into(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Create `table` (empty) if it does not exist yet.
    pub async fn create_table(&self, table: &str) {
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default();
    }

    /// Append a record. Non-object values are ignored.
    pub async fn insert(&self, table: &str, record: Value) {
        let Value::Object(record) = record else {
            tracing::warn!(table, "ignoring non-object record");
            return;
        };
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub async fn insert_all(&self, table: &str, records: impl IntoIterator<Item = Value>) {
        for record in records {
            self.insert(table, record).await;
        }
    }

    fn start_index(&self, rows: &[Record], start_key: Option<&Value>) -> Result<usize, RecordingsError> {
        let Some(start_key) = start_key else {
            return Ok(0);
        };
        let wanted = start_key.get(&self.key_attribute).ok_or_else(|| {
            RecordingsError::InvalidCursor(format!("cursor lacks {}", self.key_attribute))
        })?;
        rows.iter()
            .position(|r| r.get(&self.key_attribute) == Some(wanted))
            .map(|pos| pos + 1)
            .ok_or_else(|| RecordingsError::InvalidCursor("cursor does not match any record".into()))
    }
}

fn missing_table(table: &str) -> RecordingsError {
    RecordingsError::Service {
        status: 400,
        kind: "ResourceNotFoundException".into(),
        message: format!("table {table} not found"),
    }
}

#[async_trait]
impl ScanClient for InMemoryScanClient {
    async fn scan_page(&self, request: &ScanRequest) -> Result<ScanPage, RecordingsError> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(&request.table)
            .ok_or_else(|| missing_table(&request.table))?;
        let start = self.start_index(rows, request.exclusive_start_key.as_ref())?;
        let remaining = rows.get(start..).unwrap_or_default();
        let examined = match request.limit {
            0 => remaining,
            limit => &remaining[..remaining.len().min(limit as usize)],
        };

        let items: Vec<Record> = examined
            .iter()
            .filter(|r| request.filter.matches(r))
            .cloned()
            .collect();
        let last_evaluated_key = if start + examined.len() < rows.len() {
            examined.last().map(|r| {
                let mut key = Record::new();
                key.insert(
                    self.key_attribute.clone(),
                    r.get(&self.key_attribute).cloned().unwrap_or(Value::Null),
                );
                Value::Object(key)
            })
        } else {
            None
        };

        tracing::trace!(
            table = %request.table,
            start,
            examined = examined.len(),
            matched = items.len(),
            "in-memory scan"
        );
        Ok(ScanPage {
            count: items.len() as u64,
            scanned_count: examined.len() as u64,
            items,
            last_evaluated_key,
        })
    }

    async fn count_matching(
        &self,
        table: &str,
        filter: &FilterExpression,
    ) -> Result<u64, RecordingsError> {
        let tables = self.tables.read().await;
        let rows = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(rows.iter().filter(|r| filter.matches(r)).count() as u64)
    }
}

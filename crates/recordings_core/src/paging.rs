//! Page-numbered access on top of cursor-based scans.

use serde::Serialize;

use crate::cursor::encode_cursor;
use crate::{RecordingsError, ScanClient, ScanPage, ScanRequest};

/// Pagination block returned alongside a page of recordings.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u32,
    pub limit: u32,
    pub has_more: bool,
    pub last_evaluated_key: Option<String>,
    pub total_pages: u32,
    pub count: u64,
    pub scanned_count: u64,
}

impl PageInfo {
    pub fn new(page: u32, limit: u32, scan: &ScanPage) -> Self {
        let has_more = scan.has_more();
        Self {
            current_page: page,
            limit,
            has_more,
            last_evaluated_key: scan.last_evaluated_key.as_ref().map(encode_cursor),
            // Only a lower bound: a full count would need another walk.
            total_pages: if has_more { page + 1 } else { page },
            count: scan.count,
            scanned_count: scan.scanned_count,
        }
    }
}

/// Scan page number `page` (1-based) of `request`.
///
/// A request that already carries a cursor is scanned as-is. Otherwise
/// `page - 1` pages are walked first. Running out of pages before reaching
/// `page` yields an empty page.
pub async fn fetch_page<C>(
    client: &C,
    request: &ScanRequest,
    page: u32,
) -> Result<ScanPage, RecordingsError>
where
    C: ScanClient + ?Sized,
{
    if page <= 1 || request.exclusive_start_key.is_some() {
        return client.scan_page(request).await;
    }

    let mut cursor = None;
    for skipped in 1..page {
        let walk = request.clone().with_start_key(cursor.take());
        let scanned = client.scan_page(&walk).await?;
        match scanned.last_evaluated_key {
            Some(key) => cursor = Some(key),
            None => {
                tracing::debug!(page, skipped, "scan exhausted before requested page");
                return Ok(ScanPage::default());
            }
        }
    }

    client
        .scan_page(&request.clone().with_start_key(cursor))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryScanClient;
    use serde_json::json;

    async fn client_with(n: usize) -> InMemoryScanClient {
        let client = InMemoryScanClient::new("id");
        client.create_table("recordings").await;
        client
            .insert_all(
                "recordings",
                (1..=n).map(|i| json!({"id": format!("r{i:02}")})),
            )
            .await;
        client
    }

    #[tokio::test]
    async fn walks_forward_to_requested_page() {
        let client = client_with(7).await;
        let page = fetch_page(&client, &ScanRequest::new("recordings", 3), 2)
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("r04"), json!("r05"), json!("r06")]);
        assert!(page.has_more());

        let last = fetch_page(&client, &ScanRequest::new("recordings", 3), 3)
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more());
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let client = client_with(3).await;
        let page = fetch_page(&client, &ScanRequest::new("recordings", 3), 5)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more());
    }

    #[tokio::test]
    async fn supplied_cursor_skips_the_walk() {
        let client = client_with(5).await;
        let request =
            ScanRequest::new("recordings", 2).with_start_key(Some(json!({"id": "r01"})));
        let page = fetch_page(&client, &request, 9).await.unwrap();
        assert_eq!(page.items[0]["id"], "r02");
    }

    #[test]
    fn page_info_serializes_camel_case() {
        let scan = ScanPage {
            items: vec![],
            last_evaluated_key: Some(json!({"id": "r03"})),
            count: 2,
            scanned_count: 3,
        };
        let info = serde_json::to_value(PageInfo::new(1, 3, &scan)).unwrap();
        assert_eq!(info["currentPage"], 1);
        assert_eq!(info["hasMore"], true);
        assert_eq!(info["totalPages"], 2);
        assert_eq!(info["scannedCount"], 3);
        assert!(info["lastEvaluatedKey"].is_string());

        let done = PageInfo::new(4, 3, &ScanPage::default());
        assert_eq!(done.total_pages, 4);
        assert_eq!(done.last_evaluated_key, None);
    }
}

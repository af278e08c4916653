//! One page of a live search: `cargo run --example search_dynamo -- 0412 "January 7, 2019"`.

use recordings_core::config::Config;
use recordings_core::dynamo::DynamoScanClient;
use recordings_core::{
    FilterExpression, ScanClient, ScanRequest, build_date_filter_fragment,
    build_text_filter_fragment,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            return Ok(());
        }
    };
    let mut args = std::env::args().skip(1);
    let ani = args.next().unwrap_or_default();
    let start = args.next().unwrap_or_default();

    let filter = FilterExpression::new()
        .with(build_text_filter_fragment("ani", "ani", &ani))
        .with(build_date_filter_fragment("local_start_time", "local_start_time", &start));
    println!("filter: {}", filter.expression().unwrap_or_else(|| "(none)".into()));

    let client = DynamoScanClient::from_config(&cfg)?;
    let request = ScanRequest::new(cfg.table_name.clone(), cfg.default_page_limit).with_filter(filter);
    let page = client.scan_page(&request).await?;
    for item in &page.items {
        println!("{}", serde_json::Value::Object(item.clone()));
    }
    println!(
        "{} matched of {} scanned, more: {}",
        page.count,
        page.scanned_count,
        page.has_more()
    );
    Ok(())
}

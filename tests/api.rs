use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{App, test, web};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};

use cur_rates::http::{self, AppState, IngestAuth};
use cur_rates::store::StorageResult;
use cur_rates::{
    CurrencyCode, FeedSource, IngestGate, IngestionCoordinator, LatestRatesView,
    MemoryRateStore, RateStore, RatesError, Result, SchemaRegistry, SeriesView, StorageError,
    StoredRow,
};

const TOKEN: &str = "QmFzaWMgeHh4";

fn feed_xml(items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(date, rates)| {
            format!(
                "<item><title>x</title><description><![CDATA[{rates}]]></description>\
                 <pubDate>{date}</pubDate></item>"
            )
        })
        .collect();
    format!(r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel>{items}</channel></rss>"#)
}

fn three_months() -> String {
    feed_xml(&[
        ("Sun, 01 Jan 2023 03:00:00 +0300", "USD 1.0 GBP 0.8"),
        ("Wed, 01 Mar 2023 03:00:00 +0300", "USD 1.2 GBP 0.9"),
        ("Wed, 01 Feb 2023 03:00:00 +0300", "USD 1.1"),
    ])
}

struct StaticFeed {
    body: Option<String>,
    calls: AtomicUsize,
}

impl StaticFeed {
    fn serving(body: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            body: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(&self) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.body {
            Some(body) => Ok(body.clone().into_bytes()),
            None => Err(RatesError::transport("connection refused")),
        }
    }
}

fn app_state(store: Arc<dyn RateStore>, feed: Arc<StaticFeed>) -> web::Data<AppState> {
    let registry = SchemaRegistry::new(store.clone());
    web::Data::new(AppState {
        latest: LatestRatesView::new(store.clone()),
        series: SeriesView::new(store.clone(), registry.clone()),
        ingest: IngestionCoordinator::new(store, registry, feed, IngestGate::Row),
        auth: IngestAuth::new("HTTP_AUTH", TOKEN),
    })
}

fn set_request() -> test::TestRequest {
    test::TestRequest::put()
        .uri("/currencies/set/")
        .insert_header(("HTTP_AUTH", TOKEN))
}

#[actix_web::test]
async fn ping_answers_ok() {
    let store = Arc::new(MemoryRateStore::new());
    let app = test::init_service(
        App::new()
            .app_data(app_state(store, StaticFeed::unreachable()))
            .configure(http::configure),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(CONTENT_TYPE).unwrap(),
        "application/json; charset=utf-8"
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"ping:": "OK"}));
}

#[actix_web::test]
async fn set_then_read_back() {
    let store = Arc::new(MemoryRateStore::new());
    let feed = StaticFeed::serving(three_months());
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), feed.clone()))
            .configure(http::configure),
    )
    .await;

    let resp = test::call_service(&app, set_request().to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report["inserted"], 3);
    assert_eq!(report["columns_added"], json!(["usd", "gbp"]));

    let req = test::TestRequest::get().uri("/currencies/latest/").to_request();
    let latest: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        latest,
        json!({"date": "2023-03-01T00:00:00Z", "rates": {"gbp": 0.9, "usd": 1.2}})
    );

    let req = test::TestRequest::get()
        .uri("/currencies/one/usd/asc/")
        .to_request();
    let asc: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        asc,
        json!([
            {"date": "2023-01-01T00:00:00Z", "rate": 1.0},
            {"date": "2023-02-01T00:00:00Z", "rate": 1.1},
            {"date": "2023-03-01T00:00:00Z", "rate": 1.2},
        ])
    );

    let req = test::TestRequest::get()
        .uri("/currencies/one/USD/desc/")
        .to_request();
    let desc: Value = test::call_and_read_body_json(&app, req).await;
    let dates: Vec<&str> = desc
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["date"].as_str().unwrap())
        .collect();
    assert_eq!(
        dates,
        ["2023-03-01T00:00:00Z", "2023-02-01T00:00:00Z", "2023-01-01T00:00:00Z"]
    );

    // gbp was missing on 2023-02-01 and is left out rather than reported as zero
    let req = test::TestRequest::get()
        .uri("/currencies/one/gbp/asc/")
        .to_request();
    let gbp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(gbp.as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn repeated_set_is_idempotent() {
    let store = Arc::new(MemoryRateStore::new());
    let feed = StaticFeed::serving(three_months());
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), feed.clone()))
            .configure(http::configure),
    )
    .await;

    let first = test::call_service(&app, set_request().to_request()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let columns_after_first = store.columns().await.unwrap();

    let resp = test::call_service(&app, set_request().to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report["inserted"], 0);
    assert_eq!(report["skipped"], 3);

    assert_eq!(store.row_count().await, 3);
    assert_eq!(store.columns().await.unwrap(), columns_after_first);
    assert_eq!(feed.calls(), 2);
}

#[actix_web::test]
async fn new_currency_grows_the_schema() {
    let store = Arc::new(MemoryRateStore::new());
    let first = StaticFeed::serving(feed_xml(&[(
        "Sun, 01 Jan 2023 03:00:00 +0300",
        "USD 1.0",
    )]));
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), first))
            .configure(http::configure),
    )
    .await;
    test::call_service(&app, set_request().to_request()).await;

    let second = StaticFeed::serving(feed_xml(&[(
        "Mon, 02 Jan 2023 03:00:00 +0300",
        "USD 1.01 ISK 150.1",
    )]));
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), second))
            .configure(http::configure),
    )
    .await;
    let resp = test::call_service(&app, set_request().to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let columns: Vec<String> = store
        .columns()
        .await
        .unwrap()
        .iter()
        .map(|c| c.to_string())
        .collect();
    assert_eq!(columns, ["isk", "usd"]);
}

#[actix_web::test]
async fn set_without_auth_never_fetches() {
    let store = Arc::new(MemoryRateStore::new());
    let feed = StaticFeed::serving(three_months());
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), feed.clone()))
            .configure(http::configure),
    )
    .await;

    let missing = test::TestRequest::put().uri("/currencies/set/").to_request();
    assert_eq!(
        test::call_service(&app, missing).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let wrong = test::TestRequest::put()
        .uri("/currencies/set/")
        .insert_header(("HTTP_AUTH", "QmFzaWMgeHh5"))
        .to_request();
    let resp = test::call_service(&app, wrong).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());

    assert_eq!(feed.calls(), 0);
    assert_eq!(store.row_count().await, 0);
}

#[actix_web::test]
async fn set_reports_feed_failures() {
    let store = Arc::new(MemoryRateStore::new());
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), StaticFeed::unreachable()))
            .configure(http::configure),
    )
    .await;
    let resp = test::call_service(&app, set_request().to_request()).await;
    assert_eq!(resp.status(), StatusCode::FAILED_DEPENDENCY);

    let bad_date = StaticFeed::serving(feed_xml(&[("2023-01-01 00:00", "USD 1.0")]));
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), bad_date))
            .configure(http::configure),
    )
    .await;
    let resp = test::call_service(&app, set_request().to_request()).await;
    assert_eq!(resp.status(), StatusCode::FAILED_DEPENDENCY);

    let not_rss = StaticFeed::serving("<html><body>maintenance</body></html>");
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), not_rss))
            .configure(http::configure),
    )
    .await;
    let resp = test::call_service(&app, set_request().to_request()).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    assert_eq!(store.row_count().await, 0);
}

#[actix_web::test]
async fn set_rejects_odd_rate_line() {
    let store = Arc::new(MemoryRateStore::new());
    let feed = StaticFeed::serving(feed_xml(&[(
        "Sun, 01 Jan 2023 03:00:00 +0300",
        "USD 1.12 GBP",
    )]));
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), feed))
            .configure(http::configure),
    )
    .await;

    let resp = test::call_service(&app, set_request().to_request()).await;

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(store.row_count().await, 0);
    assert!(store.columns().await.unwrap().is_empty());
}

#[actix_web::test]
async fn read_errors_map_to_statuses() {
    let store = Arc::new(MemoryRateStore::new());
    let chf = CurrencyCode::parse("chf").unwrap();
    store.add_column(&chf).await.unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(store.clone(), StaticFeed::unreachable()))
            .configure(http::configure),
    )
    .await;

    let cases = [
        ("/currencies/latest/", StatusCode::NOT_FOUND),
        ("/currencies/one/usd/asc/", StatusCode::NOT_FOUND),
        ("/currencies/one/usd/up/", StatusCode::NOT_IMPLEMENTED),
        ("/currencies/one/u5d/asc/", StatusCode::NOT_IMPLEMENTED),
        ("/currencies/one/chf/desc/", StatusCode::NO_CONTENT),
        ("/currencies/unknown/", StatusCode::NOT_FOUND),
    ];
    for (uri, expected) in cases {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected, "GET {uri}");
    }

    store
        .insert_row(Default::default(), "chf 0.95")
        .await
        .unwrap();
    store
        .write_value(Default::default(), &chf, Decimal::new(95, 2))
        .await
        .unwrap();
    let req = test::TestRequest::get()
        .uri("/currencies/one/chf/desc/")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

/// A store whose every call runs past its deadline.
struct ExpiredStore;

fn expired<T>() -> StorageResult<T> {
    Err(StorageError::Timeout(Duration::from_secs(10)))
}

#[async_trait]
impl RateStore for ExpiredStore {
    async fn ensure_table(&self) -> StorageResult<()> {
        expired()
    }

    async fn find_row(
        &self,
        _published: DateTime<Utc>,
    ) -> StorageResult<Option<StoredRow>> {
        expired()
    }

    async fn insert_row(
        &self,
        _published: DateTime<Utc>,
        _raw_rates: &str,
    ) -> StorageResult<bool> {
        expired()
    }

    async fn has_column(&self, _code: &CurrencyCode) -> StorageResult<bool> {
        expired()
    }

    async fn add_column(&self, _code: &CurrencyCode) -> StorageResult<()> {
        expired()
    }

    async fn columns(&self) -> StorageResult<Vec<CurrencyCode>> {
        expired()
    }

    async fn read_value(
        &self,
        _published: DateTime<Utc>,
        _code: &CurrencyCode,
    ) -> StorageResult<Option<Decimal>> {
        expired()
    }

    async fn write_value(
        &self,
        _published: DateTime<Utc>,
        _code: &CurrencyCode,
        _value: Decimal,
    ) -> StorageResult<()> {
        expired()
    }

    async fn latest_row(&self) -> StorageResult<Option<StoredRow>> {
        expired()
    }

    async fn column_values(
        &self,
        _code: &CurrencyCode,
    ) -> StorageResult<Vec<(DateTime<Utc>, Option<Decimal>)>> {
        expired()
    }
}

#[actix_web::test]
async fn storage_timeouts_are_a_failed_dependency() {
    let feed = StaticFeed::serving(three_months());
    let app = test::init_service(
        App::new()
            .app_data(app_state(Arc::new(ExpiredStore), feed.clone()))
            .configure(http::configure),
    )
    .await;

    let resp = test::call_service(&app, set_request().to_request()).await;
    assert_eq!(resp.status(), StatusCode::FAILED_DEPENDENCY);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("timed out"));
    assert_eq!(feed.calls(), 1);

    let req = test::TestRequest::get()
        .uri("/currencies/latest/")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FAILED_DEPENDENCY);
}

// tests/test_cache_coordination.rs
//! Cache behavior seen from the query facade: shared loads, freshness,
//! stale-while-revalidate and eviction. Time is paused so freshness windows
//! can be crossed instantly.

mod common;

use common::{class, teacher, FakeSite, TimetablePage};
use futures::future::join_all;
use school_timetable::{FetchError, QueryError, TimetableConfig, TimetableService};
use std::sync::Arc;
use std::time::Duration;

const FRESHNESS: Duration = Duration::from_secs(60);

fn site() -> FakeSite {
    FakeSite::new()
        .with_latency(Duration::from_millis(50))
        .page(
            class("101"),
            &TimetablePage::new()
                .lesson(1, 1, "數學", "王大明")
                .lesson(2, 2, "國文", "林小華"),
        )
        .page(
            class("102"),
            &TimetablePage::new().lesson(4, 5, "數學", "王大明"),
        )
        .page(
            teacher("王大明"),
            &TimetablePage::new()
                .lesson(1, 1, "數學", "101")
                .lesson(4, 5, "數學", "102"),
        )
        .page(
            teacher("林小華"),
            &TimetablePage::new().lesson(2, 2, "國文", "101"),
        )
}

fn config() -> TimetableConfig {
    TimetableConfig {
        freshness_window: FRESHNESS,
        ..TimetableConfig::default()
    }
}

fn service_with(site: FakeSite, config: TimetableConfig) -> (Arc<FakeSite>, TimetableService) {
    let site = Arc::new(site);
    let service = TimetableService::new(site.clone(), &config).unwrap();
    (site, service)
}

/// Lets background refreshes run to completion.
async fn settle(service: &TimetableService) {
    for _ in 0..1_000 {
        if service.schedule_cache().in_flight() == 0 && service.view_cache().in_flight() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background loads never finished");
}

#[tokio::test(start_paused = true)]
async fn concurrent_cold_queries_fetch_each_page_once() {
    let (site, service) = service_with(site(), config());
    let target = class("101");

    let results = join_all((0..20).map(|_| service.schedule(&target, false))).await;

    let first = results[0].as_ref().unwrap();
    for result in &results {
        let response = result.as_ref().unwrap();
        assert!(Arc::ptr_eq(&response.schedule, &first.schedule));
    }
    assert_eq!(site.fetches(&class("101")), 1);
    assert_eq!(site.fetches(&teacher("王大明")), 1);
    assert_eq!(site.fetches(&teacher("林小華")), 1);
}

#[tokio::test(start_paused = true)]
async fn shared_counterpart_is_fetched_once_across_queries() {
    let (site, service) = service_with(site(), config());

    let (first, second) = (class("101"), class("102"));
    let (a, b) = tokio::join!(
        service.schedule(&first, false),
        service.schedule(&second, false),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(site.fetches(&teacher("王大明")), 1);
    assert_eq!(site.total_fetches(), 4);
}

#[tokio::test(start_paused = true)]
async fn repeated_query_is_served_from_cache() {
    let (site, service) = service_with(site(), config());

    let first = service.schedule(&class("101"), false).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    let second = service.schedule(&class("101"), false).await.unwrap();

    assert!(Arc::ptr_eq(&first.schedule, &second.schedule));
    assert_eq!(first.fetched_at, second.fetched_at);
    assert!(!second.stale);
    assert_eq!(site.total_fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn stale_schedule_is_served_while_refreshing() {
    let (site, service) = service_with(site(), config());

    let first = service.schedule(&class("101"), false).await.unwrap();
    assert_eq!(first.schedule.entries.len(), 2);

    // The school republishes the page; the cached copy ages out.
    site.set_page(
        class("101"),
        &TimetablePage::new().lesson(1, 1, "數學", "王大明"),
    );
    tokio::time::advance(FRESHNESS + Duration::from_secs(1)).await;

    let stale = service.schedule(&class("101"), false).await.unwrap();
    assert!(stale.stale);
    assert!(Arc::ptr_eq(&stale.schedule, &first.schedule));

    settle(&service).await;
    assert_eq!(site.fetches(&class("101")), 2);

    let fresh = service.schedule(&class("101"), false).await.unwrap();
    assert!(!fresh.stale);
    assert!(!Arc::ptr_eq(&fresh.schedule, &first.schedule));
    assert_eq!(fresh.schedule.entries.len(), 1);
    // 林小華 is no longer linked from the page, so that page is not consulted.
    assert!(fresh.schedule.is_clean());
}

#[tokio::test(start_paused = true)]
async fn concurrent_stale_reads_start_one_refresh() {
    let (site, service) = service_with(site(), config());

    service.schedule(&class("101"), false).await.unwrap();
    tokio::time::advance(FRESHNESS + Duration::from_secs(1)).await;

    let target = class("101");
    let responses = join_all((0..10).map(|_| service.schedule(&target, false))).await;
    assert!(responses.iter().all(|r| r.as_ref().unwrap().stale));

    settle(&service).await;
    assert_eq!(site.fetches(&class("101")), 2);
    assert_eq!(site.fetches(&teacher("王大明")), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_refetches_the_requested_page() {
    let (site, service) = service_with(site(), config());

    let first = service.schedule(&class("101"), false).await.unwrap();
    let refreshed = service.schedule(&class("101"), true).await.unwrap();

    assert!(!refreshed.stale);
    assert!(!Arc::ptr_eq(&first.schedule, &refreshed.schedule));
    assert_eq!(first.schedule, refreshed.schedule);
    assert_eq!(site.fetches(&class("101")), 2);
    // Counterpart views were still fresh.
    assert_eq!(site.fetches(&teacher("王大明")), 1);
}

#[tokio::test(start_paused = true)]
async fn only_explicit_refresh_reloads_the_page_index() {
    let (site, service) = service_with(site(), config());

    service.schedule(&class("101"), false).await.unwrap();
    tokio::time::advance(FRESHNESS * 2).await;
    service.schedule(&class("101"), false).await.unwrap();
    settle(&service).await;
    assert_eq!(site.index_refreshes(), 0);

    service.schedule(&class("101"), true).await.unwrap();
    assert_eq!(site.index_refreshes(), 1);
}

#[tokio::test(start_paused = true)]
async fn evicted_schedule_is_rebuilt_from_the_source() {
    let config = TimetableConfig {
        cache_max_entries: 1,
        view_cache_max_entries: 1,
        ..config()
    };
    let (site, service) = service_with(site(), config);

    service.schedule(&class("101"), false).await.unwrap();
    service.schedule(&class("102"), false).await.unwrap();
    assert!(!service.schedule_cache().contains(&class("101")));
    assert_eq!(service.schedule_cache().len(), 1);

    service.schedule(&class("101"), false).await.unwrap();
    assert_eq!(site.fetches(&class("101")), 2);
}

#[tokio::test(start_paused = true)]
async fn failures_are_shared_but_not_cached() {
    let site = site().failing(
        class("105"),
        FetchError::Timeout {
            url: "http://example.test/course/C105.html".to_string(),
        },
    );
    let (site, service) = service_with(site, config());

    let target = class("105");
    let results = join_all((0..5).map(|_| service.schedule(&target, false))).await;
    for result in results {
        assert!(matches!(result, Err(QueryError::Timeout { .. })));
    }
    assert_eq!(site.fetches(&class("105")), 1);

    let err = service.schedule(&class("105"), false).await.unwrap_err();
    assert_eq!(err.code(), "timeout");
    assert_eq!(site.fetches(&class("105")), 2);
    assert!(!service.schedule_cache().contains(&class("105")));
}

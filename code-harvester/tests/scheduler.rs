//! Scheduler lifecycle over real (short) intervals.
//!
//! Time is not paused here: the harvest path runs blocking SQLite and file IO,
//! and an auto-advancing paused clock would fire the client timeouts while
//! that work is in flight. Tests wait on observable effects instead.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use code_harvester::config::AppConfig;

use common::{GOOD_CODE, Harness, OWNER, PHONE, wait_until};

#[tokio::test]
async fn test_harvest_timeline_runs_until_stopped() {
    let config = AppConfig {
        scheduler_interval: Duration::from_millis(50),
        ..AppConfig::default()
    };
    let h = Harness::with_config(config).await;
    h.upstream.register(PHONE, GOOD_CODE, None);
    let service = &h.container.account_service;
    service.send_verification_code(PHONE).await.unwrap();
    let account = service
        .complete_login(OWNER, PHONE, GOOD_CODE, None)
        .await
        .unwrap();
    h.upstream.deliver(
        PHONE,
        "Your code is 482913",
        Utc::now() - ChronoDuration::minutes(2),
    );

    let upstream = &h.upstream;
    let connects_before = upstream.connects();
    let scheduler = &h.container.scheduler;
    assert!(scheduler.start());
    assert!(!scheduler.start(), "second start is a no-op");
    assert!(scheduler.is_running());

    wait_until("three harvest cycles", || async move {
        upstream.connects() - connects_before >= 3
    })
    .await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());

    // Several cycles ran, but the code was recorded once.
    assert_eq!(
        h.container
            .codes
            .count_for_account(&account.id)
            .await
            .unwrap(),
        1
    );

    // Stop waits for in-flight work, so nothing starts afterwards.
    let connects = upstream.connects();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(upstream.connects(), connects, "no runs after stop");
}

#[tokio::test]
async fn test_failing_cycles_do_not_stop_the_scheduler() {
    let config = AppConfig {
        scheduler_interval: Duration::from_millis(40),
        ..AppConfig::default()
    };
    let h = Harness::with_config(config).await;
    h.upstream.register(PHONE, GOOD_CODE, None);
    let service = &h.container.account_service;
    service.send_verification_code(PHONE).await.unwrap();
    let account = service
        .complete_login(OWNER, PHONE, GOOD_CODE, None)
        .await
        .unwrap();

    let upstream = &h.upstream;
    upstream.set_broken(true);
    h.container.scheduler.start();
    wait_until("two failed cycles", || async move {
        upstream.failures.load(Ordering::SeqCst) >= 2
    })
    .await;

    upstream.set_broken(false);
    upstream.deliver(
        PHONE,
        "Your code is 482913",
        Utc::now() - ChronoDuration::minutes(1),
    );
    let codes = &h.container.codes;
    let account_id = account.id.as_str();
    wait_until("the code to be harvested", || async move {
        codes.count_for_account(account_id).await.unwrap() == 1
    })
    .await;

    assert!(h.container.accounts.get(&account.id).await.unwrap().is_active);
    h.container.shutdown().await;
    assert!(h.container.is_shutting_down());
    assert!(!h.container.scheduler.is_running());
}

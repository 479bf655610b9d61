//! Panel-on dimming after `post_enable`.
//!
//! Run with: cargo test -p panel --test dimming

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use common::enabled_panel;
use embassy_futures::select::select;
use embassy_time::Timer;
use platform::mocks::HwEvent;
use platform::CommandSetKind;

const DIMMING_ON: HwEvent = HwEvent::Send(CommandSetKind::DimmingOn);

/// Run the dimming worker for `ms` of wall time.
async fn run_worker_for(panel: &common::TestPanel, ms: u64) {
    let _ = tokio::time::timeout(Duration::from_millis(ms), panel.run_deferred_dimming()).await;
}

#[tokio::test]
async fn dimming_sent_after_delay() {
    let (panel, hw) = enabled_panel().await;
    panel.post_enable().await.unwrap();
    assert_eq!(hw.log.count(DIMMING_ON), 0);

    let sent = async {
        while hw.log.count(DIMMING_ON) == 0 {
            Timer::after_millis(5).await;
        }
    };
    tokio::time::timeout(
        Duration::from_secs(2),
        select(panel.run_deferred_dimming(), sent),
    )
    .await
    .unwrap();
    assert_eq!(hw.log.count(DIMMING_ON), 1);
}

#[tokio::test]
async fn pre_disable_cancels_dimming() {
    let (panel, hw) = enabled_panel().await;
    panel.post_enable().await.unwrap();
    panel.pre_disable().await.unwrap();

    run_worker_for(&panel, 150).await;
    assert_eq!(hw.log.count(DIMMING_ON), 0);
}

#[tokio::test]
async fn disable_cancels_while_waiting() {
    let (panel, hw) = enabled_panel().await;
    panel.post_enable().await.unwrap();

    let disable_soon = async {
        Timer::after_millis(5).await;
        panel.disable().await.unwrap();
        Timer::after_millis(150).await;
    };
    select(panel.run_deferred_dimming(), disable_soon).await;
    assert_eq!(hw.log.count(DIMMING_ON), 0);
}

#[tokio::test]
async fn dimming_skipped_once_dozing() {
    let (panel, hw) = enabled_panel().await;
    panel.post_enable().await.unwrap();
    panel.set_lp1().await.unwrap();

    run_worker_for(&panel, 150).await;
    assert_eq!(hw.log.count(DIMMING_ON), 0);
}

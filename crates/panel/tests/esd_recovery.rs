//! ESD detection and recovery
//!
//! Status reads, request coalescing, the power-cycle recovery path and the
//! error-line interrupt.
//!
//! Run with: cargo test -p panel --test esd_recovery

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use common::{build, enabled_panel, sample_config, TestPanel};
use embassy_futures::select::{select, Either};
use embassy_futures::yield_now;
use embassy_time::Timer;
use embedded_hal_mock::eh1::digital::{Edge, Mock as PinMock, Transaction as PinTransaction};
use embedded_hal_mock::eh1::MockError;
use panel::config::PanelKind;
use panel::{EsdVerdict, PanelError, PanelState};
use platform::mocks::HwEvent;
use platform::{CommandSetKind, GpioLine, RailId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Drive `run_recovery` until the pending flag clears.
async fn serve_one_recovery(panel: &TestPanel) {
    let done = async {
        while panel.esd_recovery_pending() {
            yield_now().await;
        }
    };
    let _ = select(panel.run_recovery(), done).await;
}

fn edge_then_disconnect() -> PinMock {
    PinMock::new(&[
        PinTransaction::wait_for_edge(Edge::Rising),
        PinTransaction::wait_for_edge(Edge::Rising)
            .with_error(MockError::Io(std::io::ErrorKind::NotConnected)),
    ])
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthy_panel_passes() {
    let (panel, hw) = enabled_panel().await;
    assert_eq!(panel.check_esd().await, EsdVerdict::Healthy);
    assert!(!panel.esd_recovery_pending());
    assert_eq!(hw.log.events(), [HwEvent::Read(CommandSetKind::EsdStatus)]);
}

#[tokio::test]
async fn disabled_panel_is_not_checked() {
    let (panel, hw) = build(sample_config());
    assert_eq!(panel.check_esd().await, EsdVerdict::Skipped);
    assert!(hw.log.events().is_empty());
}

#[tokio::test]
async fn failures_coalesce_into_one_recovery() {
    let (panel, hw) = enabled_panel().await;
    hw.channel.set_default_read(&[0x00, 0x00]);

    assert_eq!(panel.check_esd().await, EsdVerdict::Failed);
    assert!(panel.esd_recovery_pending());
    // further failures are absorbed until the recovery completes
    assert_eq!(panel.check_esd().await, EsdVerdict::Skipped);
    assert!(!panel.request_recovery());

    hw.log.clear();
    serve_one_recovery(&panel).await;

    assert_eq!(panel.state().await, PanelState::Enabled);
    assert_eq!(hw.log.count(HwEvent::Send(CommandSetKind::On)), 1);
    // the OFF set is never sent to a panel being recovered
    assert_eq!(hw.log.count(HwEvent::Send(CommandSetKind::Off)), 0);
    // pre-power lines stay up across the cycle
    assert_eq!(
        hw.log.count(HwEvent::Gpio(GpioLine::PrePower(0), false)),
        0
    );
    assert_eq!(hw.log.count(HwEvent::RailOff(RailId(0))), 1);
    assert_eq!(hw.log.count(HwEvent::RailOn(RailId(0))), 1);
}

#[tokio::test]
async fn recovery_restores_brightness() {
    let (panel, hw) = enabled_panel().await;
    panel.set_backlight(255).await.unwrap();
    assert!(panel.request_recovery());
    let before = hw.channel.payloads().len();

    assert!(panel.recover().await.unwrap());

    let payloads = hw.channel.payloads();
    assert_eq!(
        payloads.get(before..).unwrap(),
        [
            (CommandSetKind::On, vec![0x29]),
            (CommandSetKind::Brightness, vec![0x51, 0x07, 0xff]),
        ]
    );
}

#[tokio::test]
async fn failed_recovery_keeps_request_pending() {
    let (panel, hw) = enabled_panel().await;
    hw.power.fail_enable(RailId(2));
    assert!(panel.request_recovery());

    let err = panel.recover().await.unwrap_err();
    assert!(matches!(err, PanelError::Power(_)));
    assert!(panel.esd_recovery_pending());
    assert_eq!(panel.state().await, PanelState::PrePrepared);
    assert!(hw.power.enabled().is_empty());
    assert_eq!(panel.check_esd().await, EsdVerdict::Skipped);

    // the panel is no longer on, so the next attempt drops the request
    assert!(!panel.recover().await.unwrap());
    assert!(!panel.esd_recovery_pending());
}

#[tokio::test]
async fn request_dropped_after_power_down() {
    let (panel, _hw) = enabled_panel().await;
    assert!(panel.request_recovery());
    panel.disable().await.unwrap();

    assert!(!panel.recover().await.unwrap());
    assert!(!panel.esd_recovery_pending());
    assert_eq!(panel.state().await, PanelState::Disabled);
}

#[tokio::test]
async fn dozing_panel_recovers_to_enabled() {
    let (panel, hw) = enabled_panel().await;
    panel.set_lp1().await.unwrap();
    assert!(panel.request_recovery());
    hw.log.clear();

    assert!(panel.recover().await.unwrap());
    assert_eq!(panel.state().await, PanelState::Enabled);
    assert_eq!(hw.log.count(HwEvent::Send(CommandSetKind::Off)), 0);
}

// ---------------------------------------------------------------------------
// Forced failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn esd_attack_pulls_reset_and_requests_recovery() {
    let (panel, hw) = enabled_panel().await;
    panel.trigger_esd_attack().await.unwrap();

    assert_eq!(
        hw.log.events(),
        [HwEvent::Gpio(GpioLine::Reset, false)]
    );
    assert!(panel.esd_recovery_pending());

    assert!(panel.recover().await.unwrap());
    assert_eq!(hw.gpio.level(GpioLine::Reset), Some(true));
}

#[tokio::test]
async fn esd_attack_unavailable_without_support() {
    let mut cfg = sample_config();
    if let PanelKind::Dsi(dsi) = &mut cfg.kind {
        dsi.esd = None;
    }
    let (panel, hw) = build(cfg);
    assert!(matches!(
        panel.trigger_esd_attack().await,
        Err(PanelError::EsdUnavailable)
    ));

    let mut bridge = sample_config();
    bridge.kind = PanelKind::ExtBridge;
    let (bridge, _) = build(bridge);
    assert!(matches!(
        bridge.trigger_esd_attack().await,
        Err(PanelError::EsdUnavailable)
    ));
    assert!(hw.log.events().is_empty());
    assert!(!panel.esd_recovery_pending());
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitor_polls_until_failure() {
    let (panel, hw) = enabled_panel().await;
    hw.channel.set_default_read(&[0x00, 0x00]);

    let failed = async {
        while !panel.esd_recovery_pending() {
            Timer::after_millis(5).await;
        }
    };
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        select(panel.run_esd_monitor(), failed),
    )
    .await
    .unwrap();
    assert!(matches!(outcome, Either::Second(())));
    assert!(hw.log.count(HwEvent::Read(CommandSetKind::EsdStatus)) >= 1);
}

#[tokio::test]
async fn monitor_returns_without_esd_support() {
    let mut cfg = sample_config();
    if let PanelKind::Dsi(dsi) = &mut cfg.kind {
        dsi.esd = None;
    }
    let (panel, _hw) = build(cfg);
    let finished = tokio::time::timeout(Duration::from_millis(200), panel.run_esd_monitor()).await;
    assert!(finished.is_ok());
}

#[tokio::test]
async fn error_line_edge_requests_recovery() {
    let (panel, _hw) = enabled_panel().await;
    let mut pin = edge_then_disconnect();

    let err = panel.run_esd_irq(&mut pin).await.unwrap_err();
    assert!(matches!(
        err,
        MockError::Io(std::io::ErrorKind::NotConnected)
    ));
    assert!(panel.esd_recovery_pending());
    pin.done();
}

#[tokio::test]
async fn error_line_ignored_while_off() {
    let (panel, _hw) = build(sample_config());
    let mut pin = edge_then_disconnect();

    assert!(panel.run_esd_irq(&mut pin).await.is_err());
    assert!(!panel.esd_recovery_pending());
    pin.done();
}

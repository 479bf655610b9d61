//! Drive a panel description through a full power cycle against the
//! recording mocks and print the hardware log, phase by phase.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use panel::config::{EsdConfig, EsdExpect, EsdMode, PanelKind};
use panel::{EsdVerdict, Panel, PanelConfig, PanelHardware};
use platform::mocks::{
    HwEvent, MockBacklight, MockChannel, MockDelay, MockGpio, MockHardware, MockPower,
};
use platform::{CommandSetKind, GpioLine, LinkMode, PinctrlState, TransportError};

use crate::validate;

type SimPanel =
    Panel<CriticalSectionRawMutex, MockChannel, MockPower, MockGpio, MockBacklight, MockDelay>;

/// What to do once the panel is on.
pub struct Scenario {
    pub brightness: u32,
    pub esd_failure: bool,
    pub fps: Option<u32>,
}

/// Hardware events seen during one named step.
pub struct Phase {
    pub name: &'static str,
    pub events: Vec<HwEvent>,
    pub note: Option<String>,
}

pub fn run(path: &Path, scenario: &Scenario) -> Result<()> {
    let cfg = validate::load(path)?;
    let name = cfg.name.clone();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start runtime")?;
    let phases = rt.block_on(simulate(cfg, scenario))?;

    println!();
    println!(
        "{}",
        format!("▶ Simulating {}", name.as_str()).cyan().bold()
    );
    for phase in &phases {
        println!();
        match &phase.note {
            Some(note) => println!("  {} {}", phase.name.bold(), note.dimmed()),
            None => println!("  {}", phase.name.bold()),
        }
        if phase.events.is_empty() {
            println!("    {}", "(no hardware access)".dimmed());
        }
        for event in &phase.events {
            println!("    {}", describe(event));
        }
    }
    println!();
    println!(
        "{}",
        format!(
            "✓ Simulation complete, {} command sets on the link",
            sent_kinds(&phases).len()
        )
        .green()
        .bold()
    );
    println!();
    Ok(())
}

/// A status reply the configured ESD check accepts.
fn healthy_reply(esd: &EsdConfig) -> Vec<u8> {
    let EsdMode::RegisterRead(check) = &esd.mode else {
        return Vec::new();
    };
    let mut reply = vec![0u8; check.read_len];
    for group in &check.groups {
        if let EsdExpect::Valid(bytes) = &group.expect {
            for (i, b) in bytes.iter().enumerate() {
                if let Some(slot) = reply.get_mut(group.offset.saturating_add(i)) {
                    *slot = *b;
                }
            }
        }
    }
    reply
}

fn break_esd(hw: &MockHardware, esd: &EsdConfig) {
    match &esd.mode {
        EsdMode::RegisterRead(check) => hw.channel.fail_on(check.status_cmd.kind),
        EsdMode::BusTurnaround => hw.channel.set_bta(Err(TransportError::Timeout)),
        EsdMode::PanelTe { .. } => hw.channel.set_te(Err(TransportError::Timeout)),
    }
}

fn heal_esd(hw: &MockHardware) {
    hw.channel.clear_failures();
    hw.channel.set_bta(Ok(()));
    hw.channel.set_te(Ok(()));
}

/// Run the scenario and collect the hardware log per phase.
pub async fn simulate(cfg: PanelConfig, scenario: &Scenario) -> Result<Vec<Phase>> {
    let esd = match &cfg.kind {
        PanelKind::Dsi(dsi) => dsi.esd.clone(),
        PanelKind::ExtBridge => None,
    };
    let hw = MockHardware::new();
    if let Some(esd) = &esd {
        hw.channel.set_default_read(&healthy_reply(esd));
    }
    let panel: SimPanel = Panel::new(
        cfg,
        PanelHardware {
            channel: hw.channel.clone(),
            power: hw.power.clone(),
            gpio: hw.gpio.clone(),
            backlight: hw.backlight.clone(),
            delay: hw.delay.clone(),
        },
    )
    .context("Panel rejected the description")?;

    let mut phases = Vec::new();
    let mut record = |name: &'static str, note: Option<String>| {
        phases.push(Phase {
            name,
            events: hw.log.events(),
            note,
        });
        hw.log.clear();
    };

    panel.pre_prepare().await.context("pre_prepare")?;
    record("pre_prepare", None);
    panel.prepare().await.context("prepare")?;
    record("prepare", None);
    panel.enable().await.context("enable")?;
    record("enable", None);
    panel.post_enable().await.context("post_enable")?;
    record("post_enable", None);

    let out = panel
        .set_backlight(scenario.brightness)
        .await
        .context("set_backlight")?;
    record(
        "set_backlight",
        Some(format!(
            "brightness {} -> level {}, alpha {}",
            scenario.brightness, out.level, out.alpha
        )),
    );

    if let Some(fps) = scenario.fps {
        let plan = panel
            .request_refresh_rate(fps)
            .await
            .with_context(|| format!("request_refresh_rate({fps})"))?;
        let host = panel.host_config().await;
        record(
            "request_refresh_rate",
            Some(format!(
                "{fps} Hz: {}, pclk {} Hz",
                describe_plan(plan),
                host.pixel_clock_hz
            )),
        );
    }

    if scenario.esd_failure {
        match &esd {
            Some(esd) => break_esd(&hw, esd),
            None => anyhow::bail!("Panel has no ESD check to fail"),
        }
    }
    let verdict = panel.check_esd().await;
    record("check_esd", Some(describe_verdict(verdict).to_string()));

    if panel.esd_recovery_pending() {
        heal_esd(&hw);
        panel.recover().await.context("recover")?;
        record("recover", None);
    }

    panel.pre_disable().await.context("pre_disable")?;
    record("pre_disable", None);
    panel.disable().await.context("disable")?;
    record("disable", None);
    panel.unprepare().await.context("unprepare")?;
    record("unprepare", None);
    panel.post_unprepare().await.context("post_unprepare")?;
    record("post_unprepare", None);

    let counters = panel.telemetry().await;
    record(
        "telemetry",
        Some(format!(
            "active {} ms, backlight on {} ms, fingerprint overlay {} ms",
            counters.panel_active_ms, counters.bl_duration_ms, counters.hbm_duration_ms
        )),
    );

    Ok(phases)
}

fn describe_plan(plan: panel::RefreshPlan) -> String {
    match plan {
        panel::RefreshPlan::Unchanged => "unchanged".to_string(),
        panel::RefreshPlan::SwitchMode(i) => format!("switch to mode {i}"),
        panel::RefreshPlan::Adjust(t) => format!("vfp {} hfp {}", t.v_front_porch, t.h_front_porch),
    }
}

fn describe_verdict(verdict: EsdVerdict) -> &'static str {
    match verdict {
        EsdVerdict::Healthy => "healthy",
        EsdVerdict::Failed => "failed, recovery requested",
        EsdVerdict::Skipped => "skipped",
    }
}

fn describe_line(line: GpioLine) -> String {
    match line {
        GpioLine::Reset => "reset".to_string(),
        GpioLine::DisplayEnable => "display-enable".to_string(),
        GpioLine::ModeSelect => "mode-select".to_string(),
        GpioLine::PrePower(n) => format!("pre-power[{n}]"),
    }
}

/// One log line per hardware event.
pub fn describe(event: &HwEvent) -> String {
    match *event {
        HwEvent::Send(kind) => format!("send  {}", kind.name()),
        HwEvent::Read(kind) => format!("read  {}", kind.name()),
        HwEvent::BusTurnaround => "bta".to_string(),
        HwEvent::WaitTe => "wait  te".to_string(),
        HwEvent::Link(LinkMode::LowPower) => "link  low-power".to_string(),
        HwEvent::Link(LinkMode::HighSpeed) => "link  high-speed".to_string(),
        HwEvent::RailOn(rail) => format!("rail  {rail} on"),
        HwEvent::RailOff(rail) => format!("rail  {rail} off"),
        HwEvent::Gpio(line, high) => {
            format!("gpio  {} {}", describe_line(line), if high { "high" } else { "low" })
        }
        HwEvent::Pinctrl(PinctrlState::Active) => "pins  active".to_string(),
        HwEvent::Pinctrl(PinctrlState::Suspend) => "pins  suspend".to_string(),
        HwEvent::Backlight(level) => format!("bl    {level}"),
        HwEvent::Delay(ms) => format!("wait  {ms} ms"),
    }
}

/// Kind of every command set sent, in order.
pub fn sent_kinds(phases: &[Phase]) -> Vec<CommandSetKind> {
    phases
        .iter()
        .flat_map(|p| &p.events)
        .filter_map(|e| match e {
            HwEvent::Send(k) | HwEvent::Read(k) => Some(*k),
            _ => None,
        })
        .collect()
}

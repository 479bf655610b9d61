//! Shared fixtures for the panel integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;
use panel::config::{
    BacklightConfig, BacklightTransport, DfpsCaps, DfpsType, DimPair, DisplayMode, DsiPanelConfig,
    DynClkCaps, EsdCheckGroup, EsdConfig, EsdExpect, EsdMode, ModeSelect, ModeTiming, OpMode,
    PanelConfig, PanelFeatures, PanelKind, PowerConfig, PrePowerConfig, Rail, RegReadCheck,
    ResetConfig, ResetStep,
};
use panel::{Panel, PanelHardware};
use platform::mocks::{MockBacklight, MockChannel, MockDelay, MockGpio, MockHardware, MockPower};
use platform::{CommandSet, CommandSetKind, RailId};

pub type TestPanel =
    Panel<CriticalSectionRawMutex, MockChannel, MockPower, MockGpio, MockBacklight, MockDelay>;

/// Status byte the sample panel reports when healthy.
pub const HEALTHY_STATUS: [u8; 2] = [0x9c, 0x00];

pub fn set(kind: CommandSetKind, bytes: &[u8]) -> CommandSet {
    CommandSet::new(kind).with_command(bytes, 0).unwrap()
}

fn timing(refresh_rate: u32, v_front_porch: u32) -> ModeTiming {
    ModeTiming {
        h_active: 1080,
        h_front_porch: 16,
        h_back_porch: 16,
        h_sync_width: 8,
        h_skew: 0,
        v_active: 2400,
        v_front_porch,
        v_back_porch: 8,
        v_sync_width: 4,
        refresh_rate,
    }
}

fn mode(name: &str, timing: ModeTiming, sets: &[CommandSet]) -> DisplayMode {
    DisplayMode {
        name: name.try_into().unwrap(),
        timing,
        op_mode: OpMode::Video,
        dsc: None,
        bit_clk_hz: 1_000_000_000,
        command_sets: sets.iter().cloned().collect(),
    }
}

/// Three rails, reset `[(1,10),(0,5),(1,0)]`, DCS backlight, register-read
/// ESD and two 1080x2400 modes at 60 and 90 Hz.
pub fn sample_config() -> PanelConfig {
    let kinds: [(CommandSetKind, &[u8]); 10] = [
        (CommandSetKind::On, &[0x29]),
        (CommandSetKind::PostOn, &[0xb0, 0x01]),
        (CommandSetKind::PreOff, &[0xb0, 0x00]),
        (CommandSetKind::Off, &[0x28]),
        (CommandSetKind::Lp1, &[0x39]),
        (CommandSetKind::Lp2, &[0x39, 0x01]),
        (CommandSetKind::Nolp, &[0x38]),
        (CommandSetKind::DozeLbm, &[0x53, 0x23]),
        (CommandSetKind::DozeHbm, &[0x53, 0x22]),
        (CommandSetKind::DimmingOn, &[0x53, 0x28]),
    ];
    let rail = |id: u8, name: &str| Rail {
        id: RailId(id),
        name: name.try_into().unwrap(),
        pre_on_ms: 0,
        post_on_ms: 1,
        pre_off_ms: 0,
        post_off_ms: 1,
    };
    let dsi = DsiPanelConfig {
        power: PowerConfig {
            rails: [rail(0, "vddio"), rail(1, "vci"), rail(2, "vdd")]
                .into_iter()
                .collect(),
        },
        pre_power: PrePowerConfig {
            lines: Vec::from_slice(&[0]).unwrap(),
        },
        reset: ResetConfig {
            steps: Vec::from_slice(&[
                ResetStep::new(1, 10),
                ResetStep::new(0, 5),
                ResetStep::new(1, 0),
            ])
            .unwrap(),
            display_enable: false,
            mode_select: Some(ModeSelect::DualPort),
            skip_reset: false,
        },
        backlight: BacklightConfig {
            transport: BacklightTransport::Dcs { byte_swap: false },
            bl_min_level: 1,
            bl_max_level: 2047,
            brightness_max_level: 255,
            bl_doze_lbm: 20,
            bl_doze_hbm: 200,
            dim_lut: [(1, 0), (1000, 128), (2047, 255)]
                .into_iter()
                .map(|(b, a)| DimPair::new(b, a))
                .collect(),
            ..BacklightConfig::default()
        },
        esd: Some(EsdConfig {
            mode: EsdMode::RegisterRead(RegReadCheck {
                status_cmd: set(CommandSetKind::EsdStatus, &[0x0a]),
                read_len: 2,
                groups: [EsdCheckGroup {
                    offset: 0,
                    mask: Vec::from_slice(&[0xff]).unwrap(),
                    expect: EsdExpect::Valid(Vec::from_slice(&[0x9c]).unwrap()),
                }]
                .into_iter()
                .collect(),
            }),
            use_cmd_channel: false,
            check_interval_ms: 20,
        }),
        command_sets: kinds.iter().map(|(k, b)| set(*k, b)).collect(),
        features: PanelFeatures {
            doze_backlight_threshold: 100,
            panel_on_dimming_delay_ms: 30,
            ..PanelFeatures::default()
        },
    };
    PanelConfig {
        name: "integration".try_into().unwrap(),
        kind: PanelKind::Dsi(dsi),
        host: Default::default(),
        modes: [
            mode("60", timing(60, 2448), &[]),
            mode(
                "90",
                timing(90, 828),
                &[set(CommandSetKind::TimingSwitch, &[0x2f, 0x02])],
            ),
        ]
        .into_iter()
        .collect(),
        default_mode: 0,
        dfps: DfpsCaps {
            dfps_type: DfpsType::ImmediateVfp,
            min_refresh_rate: 60,
            max_refresh_rate: 120,
            dfps_list: Vec::from_slice(&[60, 90, 120]).unwrap(),
            dfps_support: true,
        },
        dyn_clk: DynClkCaps::default(),
        dms: Default::default(),
        phy: Default::default(),
    }
}

pub fn build(cfg: PanelConfig) -> (TestPanel, MockHardware) {
    let hw = MockHardware::new();
    let panel = Panel::new(
        cfg,
        PanelHardware {
            channel: hw.channel.clone(),
            power: hw.power.clone(),
            gpio: hw.gpio.clone(),
            backlight: hw.backlight.clone(),
            delay: hw.delay.clone(),
        },
    )
    .unwrap();
    (panel, hw)
}

/// Panel taken to `Enabled`, log cleared, healthy status answer.
pub async fn enabled_panel() -> (TestPanel, MockHardware) {
    let (panel, hw) = build(sample_config());
    panel.pre_prepare().await.unwrap();
    panel.prepare().await.unwrap();
    panel.enable().await.unwrap();
    hw.channel.set_default_read(&HEALTHY_STATUS);
    hw.log.clear();
    (panel, hw)
}

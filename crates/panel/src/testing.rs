//! Shared fixtures for unit tests.

#![allow(clippy::unwrap_used)]

use heapless::Vec;
use platform::{CommandSet, CommandSetKind, RailId};

use crate::config::{
    BacklightConfig, BacklightTransport, DeltaOrder, DfpsCaps, DfpsType, DimPair, DisplayMode,
    DmsMode, DsiPanelConfig, DynClkCaps, EsdCheckGroup, EsdConfig, EsdExpect, EsdMode,
    HostConfigCommon, ModeSelect, ModeTiming, OpMode, PanelConfig, PanelFeatures, PanelKind,
    PhyProps, PowerConfig, PrePowerConfig, Rail, RegReadCheck, ResetConfig, ResetStep, Rotation,
};

pub(crate) fn set(kind: CommandSetKind, bytes: &[u8]) -> CommandSet {
    CommandSet::new(kind).with_command(bytes, 0).unwrap()
}

fn rail(id: u8, name: &str, post_on_ms: u32) -> Rail {
    Rail {
        id: RailId(id),
        name: name.try_into().unwrap(),
        pre_on_ms: 0,
        post_on_ms,
        pre_off_ms: 0,
        post_off_ms: 1,
    }
}

/// 1080x2400 at 60 Hz; the vertical blanking leaves room for VFP stretching to 120 Hz.
pub(crate) fn timing(refresh_rate: u32, v_front_porch: u32) -> ModeTiming {
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

/// A command-mode OLED with three rails, DCS backlight, register-read ESD
/// and two modes sharing one resolution.
pub(crate) fn sample_config() -> PanelConfig {
    let panel_sets: [(CommandSetKind, &[u8]); 15] = [
        (CommandSetKind::Lp11Init, &[0x01]),
        (CommandSetKind::On, &[0x29]),
        (CommandSetKind::PostOn, &[0xb0, 0x01]),
        (CommandSetKind::PreOff, &[0xb0, 0x00]),
        (CommandSetKind::Off, &[0x28]),
        (CommandSetKind::Lp1, &[0x39]),
        (CommandSetKind::Lp2, &[0x39, 0x01]),
        (CommandSetKind::Nolp, &[0x38]),
        (CommandSetKind::DozeHbm, &[0x53, 0x22]),
        (CommandSetKind::DozeLbm, &[0x53, 0x23]),
        (CommandSetKind::TimingSwitch, &[0x2f, 0x00]),
        (CommandSetKind::PostTimingSwitch, &[0x2f, 0x10]),
        (CommandSetKind::HbmFodOn, &[0x53, 0xe0]),
        (CommandSetKind::HbmFodOff, &[0x53, 0x20]),
        (CommandSetKind::DimmingOn, &[0x53, 0x28]),
    ];
    let mut command_sets = Vec::new();
    for (kind, bytes) in panel_sets {
        command_sets.push(set(kind, bytes)).unwrap();
    }

    let mut fast_sets = Vec::new();
    fast_sets
        .push(set(CommandSetKind::TimingSwitch, &[0x2f, 0x02]))
        .unwrap();

    let mut modes = Vec::new();
    modes
        .push(DisplayMode {
            name: "1080x2400@60".try_into().unwrap(),
            timing: timing(60, 2448),
            op_mode: OpMode::Command,
            dsc: None,
            bit_clk_hz: 1_100_000_000,
            command_sets: Vec::new(),
        })
        .unwrap();
    modes
        .push(DisplayMode {
            name: "1080x2400@90".try_into().unwrap(),
            timing: timing(90, 828),
            op_mode: OpMode::Command,
            dsc: None,
            bit_clk_hz: 1_100_000_000,
            command_sets: fast_sets,
        })
        .unwrap();

    let dsi = DsiPanelConfig {
        power: PowerConfig {
            rails: [rail(0, "vddio", 2), rail(1, "vci", 5), rail(2, "vdd", 10)]
                .into_iter()
                .collect(),
        },
        pre_power: PrePowerConfig {
            lines: Vec::from_slice(&[0, 1]).unwrap(),
        },
        reset: ResetConfig {
            steps: Vec::from_slice(&[
                ResetStep::new(1, 10),
                ResetStep::new(0, 5),
                ResetStep::new(1, 0),
            ])
            .unwrap(),
            display_enable: true,
            mode_select: Some(ModeSelect::SinglePort),
            skip_reset: false,
        },
        backlight: BacklightConfig {
            transport: BacklightTransport::Dcs { byte_swap: false },
            bl_min_level: 1,
            bl_max_level: 2047,
            brightness_max_level: 255,
            bl_doze_lbm: 20,
            bl_doze_hbm: 200,
            delta_order: DeltaOrder::AfterScale,
            dim_lut: [(1, 0), (100, 50), (500, 150), (2047, 255)]
                .into_iter()
                .map(|(b, a)| DimPair::new(b, a))
                .collect(),
            fod_dim_lut: [(1, 10), (1000, 200), (2047, 250)]
                .into_iter()
                .map(|(b, a)| DimPair::new(b, a))
                .collect(),
            dc_threshold: 300,
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
            use_cmd_channel: true,
            check_interval_ms: 5000,
        }),
        command_sets,
        features: PanelFeatures {
            lp11_init: true,
            doze_backlight_threshold: 100,
            ..PanelFeatures::default()
        },
    };

    PanelConfig {
        name: "sample-amoled".try_into().unwrap(),
        kind: PanelKind::Dsi(dsi),
        host: HostConfigCommon::default(),
        modes,
        default_mode: 0,
        dfps: DfpsCaps {
            dfps_type: DfpsType::ImmediateVfp,
            min_refresh_rate: 60,
            max_refresh_rate: 120,
            dfps_list: Vec::from_slice(&[60, 90, 120]).unwrap(),
            dfps_support: true,
        },
        dyn_clk: DynClkCaps {
            support: true,
            bit_clk_list: Vec::from_slice(&[1_100_000_000, 1_200_000_000]).unwrap(),
        },
        dms: DmsMode::Disabled,
        phy: PhyProps {
            width_mm: 69,
            height_mm: 154,
            rotation: Rotation::None,
        },
    }
}

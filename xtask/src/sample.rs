//! Sample panel description, the starting point for a new panel JSON.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use heapless::Vec;
use panel::config::{
    BacklightConfig, BacklightTransport, DfpsCaps, DfpsType, DimPair, DisplayMode, DmsMode,
    DscConfig, DsiPanelConfig, DynClkCaps, ElvssDimming, EsdCheckGroup, EsdConfig, EsdExpect,
    EsdMode, HostConfigCommon, ModeSelect, ModeTiming, OpMode, PanelConfig, PanelFeatures,
    PanelKind, PhyProps, PowerConfig, PrePowerConfig, Rail, RegReadCheck, ResetConfig, ResetStep,
    Rotation,
};
use platform::{CommandSet, CommandSetKind, RailId};

fn set(kind: CommandSetKind, commands: &[&[u8]]) -> CommandSet {
    commands
        .iter()
        .try_fold(CommandSet::new(kind), |set, bytes| set.with_command(bytes, 0))
        .expect("sample command set fits")
}

fn rail(id: u8, name: &str, post_on_ms: u32) -> Rail {
    Rail {
        id: RailId(id),
        name: name.try_into().expect("rail name fits"),
        pre_on_ms: 0,
        post_on_ms,
        pre_off_ms: 0,
        post_off_ms: 2,
    }
}

fn timing(refresh_rate: u32, v_front_porch: u32) -> ModeTiming {
    ModeTiming {
        h_active: 1080,
        h_front_porch: 16,
        h_back_porch: 16,
        h_sync_width: 8,
        h_skew: 0,
        v_active: 2340,
        v_front_porch,
        v_back_porch: 8,
        v_sync_width: 4,
        refresh_rate,
    }
}

fn mode(refresh_rate: u32, v_front_porch: u32, switch: &[u8]) -> DisplayMode {
    let mut command_sets = Vec::new();
    command_sets
        .push(set(CommandSetKind::TimingSwitch, &[switch]))
        .expect("mode set fits");
    DisplayMode {
        name: format!("1080x2340@{refresh_rate}")
            .as_str()
            .try_into()
            .expect("mode name fits"),
        timing: timing(refresh_rate, v_front_porch),
        op_mode: OpMode::Command,
        dsc: Some(DscConfig {
            slice_width: 540,
            slice_height: 30,
            slice_per_pkt: 2,
            bpp: 8,
            bpc: 8,
        }),
        bit_clk_hz: 1_100_000_000,
        command_sets,
    }
}

/// A command-mode AMOLED with DSC, three rails, DCS backlight and
/// register-read ESD checking.
pub fn sample_config() -> PanelConfig {
    let sets: [(CommandSetKind, &[&[u8]]); 14] = [
        (CommandSetKind::On, &[&[0x11], &[0x29]]),
        (CommandSetKind::PostOn, &[&[0xf0, 0x5a, 0x5a], &[0xb0, 0x01]]),
        (CommandSetKind::PreOff, &[&[0xb0, 0x00]]),
        (CommandSetKind::Off, &[&[0x28], &[0x10]]),
        (CommandSetKind::Lp1, &[&[0x39]]),
        (CommandSetKind::Lp2, &[&[0x39], &[0x53, 0x02]]),
        (CommandSetKind::Nolp, &[&[0x38]]),
        (CommandSetKind::DozeHbm, &[&[0x53, 0x22]]),
        (CommandSetKind::DozeLbm, &[&[0x53, 0x23]]),
        (CommandSetKind::HbmFodOn, &[&[0x53, 0xe0]]),
        (CommandSetKind::HbmFodOff, &[&[0x53, 0x20]]),
        (CommandSetKind::DimmingOn, &[&[0x53, 0x28]]),
        (CommandSetKind::ElvssDimmingRead, &[&[0xb7]]),
        (CommandSetKind::ElvssDimmingOffset, &[&[0xb7, 0x00, 0x00]]),
    ];
    let command_sets = sets.iter().map(|(kind, cmds)| set(*kind, cmds)).collect();

    let dsi = DsiPanelConfig {
        power: PowerConfig {
            rails: [rail(0, "vddio", 2), rail(1, "vci", 5), rail(2, "vdd", 10)]
                .into_iter()
                .collect(),
        },
        pre_power: PrePowerConfig {
            lines: Vec::from_slice(&[0]).expect("one line"),
        },
        reset: ResetConfig {
            steps: Vec::from_slice(&[
                ResetStep::new(1, 10),
                ResetStep::new(0, 5),
                ResetStep::new(1, 20),
            ])
            .expect("three steps"),
            display_enable: false,
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
            dim_lut: [(1, 0), (100, 50), (500, 150), (2047, 255)]
                .into_iter()
                .map(|(b, a)| DimPair::new(b, a))
                .collect(),
            dc_threshold: 440,
            ..BacklightConfig::default()
        },
        esd: Some(EsdConfig {
            mode: EsdMode::RegisterRead(RegReadCheck {
                status_cmd: set(CommandSetKind::EsdStatus, &[&[0x0a]]),
                read_len: 1,
                groups: [EsdCheckGroup {
                    offset: 0,
                    mask: Vec::from_slice(&[0xff]).expect("one byte"),
                    expect: EsdExpect::Valid(Vec::from_slice(&[0x9c]).expect("one byte")),
                }]
                .into_iter()
                .collect(),
            }),
            use_cmd_channel: true,
            check_interval_ms: 5000,
        }),
        command_sets,
        features: PanelFeatures {
            doze_backlight_threshold: 100,
            panel_on_dimming_delay_ms: 60,
            elvss_dimming: Some(ElvssDimming { valid_bits: 0x3f }),
            ..PanelFeatures::default()
        },
    };

    PanelConfig {
        name: "sample-amoled".try_into().expect("name fits"),
        kind: PanelKind::Dsi(dsi),
        host: HostConfigCommon::default(),
        modes: [mode(60, 2388, &[0x2f, 0x00]), mode(90, 808, &[0x2f, 0x02])]
            .into_iter()
            .collect(),
        default_mode: 0,
        dfps: DfpsCaps {
            dfps_type: DfpsType::ImmediateVfp,
            min_refresh_rate: 60,
            max_refresh_rate: 120,
            dfps_list: Vec::from_slice(&[60, 90, 120]).expect("three rates"),
            dfps_support: true,
        },
        dyn_clk: DynClkCaps {
            support: true,
            bit_clk_list: Vec::from_slice(&[1_100_000_000, 1_150_000_000]).expect("two clocks"),
        },
        dms: DmsMode::Disabled,
        phy: PhyProps {
            width_mm: 68,
            height_mm: 147,
            rotation: Rotation::None,
        },
    }
}

pub fn run(out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(&sample_config()).context("Failed to encode sample")?;
    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{}",
                format!("✓ Sample panel written to {}", path.display()).green()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_valid() {
        sample_config().validate().unwrap();
    }

    #[test]
    fn sample_modes_share_pixel_clock() {
        let cfg = sample_config();
        let clocks: std::vec::Vec<u64> =
            cfg.modes.iter().map(|m| m.timing.pixel_clock_hz()).collect();
        assert_eq!(clocks.first(), clocks.last());
    }
}

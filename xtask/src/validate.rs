//! Load a JSON panel description and report what the runtime would do
//! with it.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use panel::config::PanelKind;
use panel::{dsc_pclk_params, PanelConfig};

/// Parse and validate a panel description.
pub fn load(path: &Path) -> Result<PanelConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg: PanelConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("{} is not a usable panel", path.display()))?;
    Ok(cfg)
}

pub fn run(path: &Path) -> Result<()> {
    let cfg = load(path)?;

    println!();
    println!(
        "{}",
        format!("✓ {} is valid", cfg.name.as_str()).green().bold()
    );
    println!();

    match &cfg.kind {
        PanelKind::Dsi(dsi) => {
            println!("  rails:          {}", dsi.power.rails.len());
            println!("  reset steps:    {}", dsi.reset.steps.len());
            println!("  command sets:   {}", dsi.command_sets.len());
            println!(
                "  backlight:      {}..={} (brightness max {})",
                dsi.backlight.bl_min_level,
                dsi.backlight.bl_max_level,
                dsi.backlight.brightness_max_level
            );
            match &dsi.esd {
                Some(esd) => println!("  esd:            every {} ms", esd.check_interval_ms),
                None => println!("  esd:            {}", "not supported".yellow()),
            }
        }
        PanelKind::ExtBridge => println!("  {}", "external bridge".yellow()),
    }
    println!();

    for (i, mode) in cfg.modes.iter().enumerate() {
        let t = &mode.timing;
        let marker = if i == cfg.default_mode { "*" } else { " " };
        println!(
            "  {marker} [{i}] {:<20} {}x{} @ {} Hz, {} x {} total, pclk {} Hz",
            mode.name.as_str(),
            t.h_active,
            t.v_active,
            t.refresh_rate,
            t.h_total(),
            t.v_total(),
            t.pixel_clock_hz()
        );
        if let Some(dsc) = &mode.dsc {
            match dsc_pclk_params(t.h_active, dsc) {
                Some(p) => println!(
                    "        dsc: {} slices, {} bytes/slice, {} pclk/line",
                    p.slice_per_intf, p.bytes_in_slice, p.pclk_per_line
                ),
                None => println!("        dsc: {}", "parameters out of range".red()),
            }
        }
    }
    if cfg.dfps.dfps_support {
        println!();
        let rates: Vec<String> = cfg.dfps.dfps_list.iter().map(u32::to_string).collect();
        println!(
            "  refresh rates:  {} Hz ({} to {})",
            rates.join(", "),
            cfg.dfps.min_refresh_rate,
            cfg.dfps.max_refresh_rate
        );
    }
    println!();
    Ok(())
}

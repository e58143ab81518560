use anyhow::Result;
use colored::{ColoredString, Colorize};

use crate::engine::{BootMode, SystemInfo};
use crate::execution::swap::swap_size_for;
use crate::ui::nerd_font::NerdFont;

pub fn ensure_root() -> Result<()> {
    if let sudo::RunningAs::User = sudo::check() {
        sudo::with_env(&["RUST_BACKTRACE", "RUST_LOG"])
            .map_err(|e| anyhow::anyhow!("Failed to escalate privileges: {}", e))?;
    }
    Ok(())
}

pub fn format_bytes(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let value = bytes as f64;
    if value >= GIB {
        format!("{:.1} GiB", value / GIB)
    } else {
        format!("{:.0} MiB", value / MIB)
    }
}

pub fn print_system_info(info: &SystemInfo) {
    let print_row = |icon: ColoredString, label: &str, value: &dyn std::fmt::Display| {
        println!("  {}   {:<20} {}", icon, label, value);
    };

    println!();
    println!(
        "  {} {}",
        NerdFont::Desktop.to_string().bright_cyan(),
        "System Information".bright_white().bold()
    );
    println!("  {}", "─".repeat(50).bright_black());

    let boot_mode_str = match info.boot_mode {
        BootMode::UEFI64 => "UEFI 64-bit",
        BootMode::UEFI32 => "UEFI 32-bit",
        BootMode::BIOS => "BIOS",
    };
    print_row(
        NerdFont::PowerOff.to_string().bright_green(),
        "Boot Mode:",
        &boot_mode_str.bright_green(),
    );

    print_row(
        NerdFont::Cpu.to_string().bright_magenta(),
        "Architecture:",
        &info.architecture.bright_magenta(),
    );

    match info.total_ram_bytes {
        Some(ram) => {
            let ram_str = format_bytes(ram);
            let gib = ram / (1024 * 1024 * 1024);
            let colored = if gib >= 4 {
                ram_str.bright_green()
            } else if gib >= 1 {
                ram_str.bright_yellow()
            } else {
                ram_str.bright_red()
            };
            print_row(
                NerdFont::Memory.to_string().bright_cyan(),
                "Memory:",
                &colored,
            );
            print_row(
                NerdFont::Swap.to_string().bright_cyan(),
                "Swap file:",
                &format!("{} ({} bytes)", format_bytes(swap_size_for(ram)), swap_size_for(ram)),
            );
        }
        None => print_row(
            NerdFont::Memory.to_string().bright_red(),
            "Memory:",
            &"Unknown".bright_red(),
        ),
    }

    print_row(
        NerdFont::Cpu.to_string().bright_blue(),
        "CPU:",
        &info.cpu.to_colored_string(),
    );

    if info.gpus.is_empty() {
        print_row(
            NerdFont::Gpu.to_string().bright_black(),
            "GPU:",
            &"None detected".bright_black(),
        );
    } else {
        let colored_gpu_str = if info.gpus.len() == 1 {
            info.gpus[0].to_colored_string()
        } else {
            let gpu_strs: Vec<String> = info.gpus.iter().map(|gpu| gpu.to_string()).collect();
            gpu_strs.join(", ").normal()
        };
        print_row(
            NerdFont::Gpu.to_string().bright_cyan(),
            "GPU:",
            &colored_gpu_str,
        );
    }

    if let Some(vm_type) = &info.vm_type {
        println!(
            "  {}   {:<20} {} ({})",
            NerdFont::Server.to_string().bright_yellow(),
            "Virtualization:",
            vm_type.bright_yellow(),
            "Virtual Machine".bright_black()
        );
    } else {
        print_row(
            NerdFont::Server.to_string().bright_green(),
            "Virtualization:",
            &"Bare Metal".bright_green(),
        );
    }

    println!("  {}", "─".repeat(50).bright_black());
    println!();
}

//! Console rendering of snapshot entries and log lines

use colored::{ColoredString, Colorize};
use stackdeck_cloud::{Flavor, FloatingIp, LogLine, LogTag};

/// `name (VCPUs: v, RAM: r.rrGB, Disk: dGB)`
pub fn flavor_label(flavor: &Flavor) -> String {
    let ram_gb = flavor.ram.unwrap_or(0) as f64 / 1024.0;
    let vcpus = flavor
        .vcpus
        .map(|v| v.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let disk = flavor
        .disk
        .map(|d| d.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "{} (VCPUs: {}, RAM: {:.2}GB, Disk: {}GB)",
        flavor.name, vcpus, ram_gb, disk
    )
}

/// `address (first 8 chars of id)`
pub fn floating_ip_label(ip: &FloatingIp) -> String {
    let address = ip.floating_ip_address.as_deref().unwrap_or("Unknown IP");
    if ip.id.is_empty() {
        address.to_string()
    } else {
        let short: String = ip.id.chars().take(8).collect();
        format!("{} ({})", address, short)
    }
}

/// Security groups with `default` first
pub fn security_group_order(mut names: Vec<String>) -> Vec<String> {
    if let Some(pos) = names.iter().position(|n| n == "default") {
        let default = names.remove(pos);
        names.insert(0, default);
    }
    names
}

fn paint(line: &LogLine) -> ColoredString {
    let text = line.text.as_str();
    match line.tag {
        LogTag::Error => text.red(),
        LogTag::Warning => text.yellow(),
        LogTag::Info => text.blue(),
        LogTag::Success => text.green(),
        LogTag::Poll => text.dimmed(),
        LogTag::Auth => text.magenta(),
        LogTag::Router => text.cyan(),
        LogTag::FloatingIp => text.bright_green(),
        LogTag::Ports => text.bright_cyan(),
        LogTag::Ui => text.bright_black(),
        LogTag::Plain => text.normal(),
    }
}

pub fn print_log_line(line: &LogLine) {
    if line.tag == LogTag::Error {
        eprintln!("{}", paint(line));
    } else {
        println!("{}", paint(line));
    }
}

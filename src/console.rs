//! Colorful console output for planning runs.

use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};

use crate::correction::ParcelSnapshot;
use crate::domain::{format_time_of_day, ParcelStatus};
use crate::planner::{PlanQuality, PlanSummary};

/// ASCII art banner for service startup.
pub fn print_banner() {
    let banner = r#"
  ____  _                 _       _
 |  _ \(_)___ _ __   __ _| |_ ___| |__
 | | | | / __| '_ \ / _` | __/ __| '_ \
 | |_| | \__ \ |_) | (_| | || (__| | | |
 |____/|_|___/ .__/ \__,_|\__\___|_| |_|
             |_|
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black(),
        "Parcel Dispatch".bright_cyan()
    );
}

/// Prints the size of the planning problem.
pub fn print_config(dataset: &str, vehicles: usize, parcels: usize, addresses: usize) {
    println!(
        "{} {} {} Dataset {}: vehicles ({}), parcels ({}), addresses ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Planner]".bright_cyan(),
        dataset.white().bold(),
        vehicles.to_formatted_string(&Locale::en).bright_yellow(),
        parcels.to_formatted_string(&Locale::en).bright_yellow(),
        addresses.to_formatted_string(&Locale::en).bright_yellow()
    );
}

/// Prints a phase start message.
pub fn print_phase_start(phase_name: &str, phase_index: usize) {
    eprintln!(
        "{} {} {} {} phase ({}) started",
        timestamp().bright_black(),
        "INFO".bright_green(),
        format!("[{}]", phase_name).bright_cyan(),
        phase_name.white().bold(),
        phase_index.to_string().yellow()
    );
}

/// Prints a phase end message with the number of items it handled.
pub fn print_phase_end(phase_name: &str, phase_index: usize, duration: Duration, items: u64, unit: &str) {
    eprintln!(
        "{} {} {} {} phase ({}) ended: time spent ({}), {} ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        format!("[{}]", phase_name).bright_cyan(),
        phase_name.white().bold(),
        phase_index.to_string().yellow(),
        format_duration(duration).yellow(),
        unit,
        items.to_formatted_string(&Locale::en).bright_magenta().bold()
    );
}

/// Prints the plan summary box.
pub fn print_plan_ended(total_duration: Duration, summary: &PlanSummary) {
    println!(
        "{} {} {} Planning ended: time spent ({}), total distance ({}), re-optimized ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Planner]".bright_cyan(),
        format_duration(total_duration).yellow(),
        format!("{:.1}", summary.total_distance).bright_magenta().bold(),
        summary.reoptimized.to_string().white()
    );

    // 60 chars wide, 56 char content area
    println!();
    println!("{}", "╔══════════════════════════════════════════════════════════╗".bright_cyan());

    let feasible = summary.quality == PlanQuality::Feasible;
    let status_text = if feasible {
        "✓ ALL DEADLINES MET"
    } else {
        "✗ DEADLINES MISSED"
    };
    let status_colored = if feasible {
        status_text.bright_green().bold().to_string()
    } else {
        status_text.bright_red().bold().to_string()
    };
    let status_padding = 56 - status_text.chars().count();
    let left_pad = status_padding / 2;
    let right_pad = status_padding - left_pad;
    println!(
        "{}{}{}{}{}",
        "║".bright_cyan(),
        " ".repeat(left_pad),
        status_colored,
        " ".repeat(right_pad),
        "║".bright_cyan()
    );

    println!("{}", "╠══════════════════════════════════════════════════════════╣".bright_cyan());

    let rows = [
        ("Total Distance:", format!("{:.1}", summary.total_distance)),
        ("Vehicles:", summary.vehicles.len().to_string()),
        ("Held Parcels:", summary.held.len().to_string()),
        ("Late Parcels:", summary.late.len().to_string()),
        ("Diagnostics:", summary.diagnostics.len().to_string()),
        ("Planning Time:", format!("{:.2}s", total_duration.as_secs_f64())),
    ];
    for (label, value) in rows {
        println!("{}  {:<18}{:>36}  {}", "║".bright_cyan(), label, value, "║".bright_cyan());
    }

    println!("{}", "╚══════════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

/// Prints one line per parcel snapshot.
pub fn print_status_table(snapshots: &[ParcelSnapshot]) {
    for snapshot in snapshots {
        let status = match snapshot.status {
            ParcelStatus::Delivered => snapshot.status.as_str().bright_green().to_string(),
            ParcelStatus::EnRoute => snapshot.status.as_str().bright_yellow().to_string(),
            ParcelStatus::Held => snapshot.status.as_str().bright_red().to_string(),
            ParcelStatus::AtHub => snapshot.status.as_str().white().to_string(),
        };
        let delivered = snapshot
            .delivered_at
            .filter(|_| snapshot.status == ParcelStatus::Delivered)
            .map(format_time_of_day)
            .unwrap_or_default();
        println!(
            "  {:>4} │ {:<10} │ {:<40} │ {}",
            snapshot.id.to_string().bright_yellow(),
            status,
            snapshot.location,
            delivered.bright_black()
        );
    }
}

/// Formats a duration nicely.
fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = total_ms / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

/// Returns a timestamp string.
fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// A timer for one planning phase.
pub struct PhaseTimer {
    start: Instant,
    phase_name: String,
    phase_index: usize,
    items: u64,
    unit: &'static str,
}

impl PhaseTimer {
    pub fn start(phase_name: impl Into<String>, phase_index: usize, unit: &'static str) -> Self {
        let name = phase_name.into();
        print_phase_start(&name, phase_index);
        Self {
            start: Instant::now(),
            phase_name: name,
            phase_index,
            items: 0,
            unit,
        }
    }

    pub fn record(&mut self, items: usize) {
        self.items += items as u64;
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn items(&self) -> u64 {
        self.items
    }

    pub fn finish(self) {
        print_phase_end(
            &self.phase_name,
            self.phase_index,
            self.start.elapsed(),
            self.items,
            self.unit,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_units() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_phase_timer_counts_items() {
        let mut timer = PhaseTimer::start("Routing", 1, "stops");
        timer.record(3);
        timer.record(2);
        assert_eq!(timer.items(), 5);
        timer.finish();
    }
}

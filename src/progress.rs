//! Terminal output for the relay CLI
//!
//! Provides a compare progress spinner using indicatif and styled
//! summaries using console and humansize.

use crate::fields::FieldInfo;
use crate::relay::{CompareResult, CompareSummary, StatsSnapshot};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Spinner shown while a comparison runs
pub struct CompareProgress {
    bar: ProgressBar,
    units: u64,
}

impl CompareProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let template = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar, units: 0 }
    }

    /// Add units reported by the comparator and refresh the message
    pub fn advance(&mut self, units: u64) {
        self.units += units;
        self.bar.set_message(format!(
            "Compared: {} units ({})",
            format_number(self.units),
            format_size(self.units * 2, BINARY),
        ));
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for CompareProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Human-readable compare verdict
pub fn result_label(result: CompareResult) -> &'static str {
    match result {
        CompareResult::Eq => "identical",
        CompareResult::EqText => "equal as text",
        CompareResult::NotEq => "different",
        CompareResult::Error => "error",
        CompareResult::Abort => "aborted",
        CompareResult::Next => "not comparable",
    }
}

/// Print the field catalog
pub fn print_fields(entries: &[FieldInfo]) {
    println!();
    println!("{}", style("Fields").cyan().bold());
    println!("{}", style("─".repeat(50)).dim());
    for info in entries {
        let units = info.units.map(|u| format!(" [{}]", u)).unwrap_or_default();
        println!(
            "  {}{} {}",
            style(&info.name).bold(),
            units,
            style(format!("({:?})", info.value_type)).dim()
        );
    }
    println!();
}

/// Print the outcome of a streamed extraction
pub fn print_extract_summary(field: &str, units: u64, chunks: u64, stats: &StatsSnapshot, duration: Duration) {
    println!();
    println!("{}", style("Extraction Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Field:").bold(), field);
    println!(
        "  {} {} units ({})",
        style("Text:").bold(),
        format_number(units),
        format_size(units * 2, BINARY)
    );
    println!("  {} {}", style("Chunks:").bold(), format_number(chunks));
    println!("  {} {:.1}s", style("Duration:").bold(), duration.as_secs_f64());
    if stats.rendezvous_timeouts > 0 {
        println!(
            "  {} {}",
            style("Timeouts:").yellow().bold(),
            format_number(stats.rendezvous_timeouts)
        );
    }
    println!();
}

/// Print the outcome of a comparison
pub fn print_compare_summary(source_a: &Path, source_b: &Path, summary: &CompareSummary) {
    let verdict = result_label(summary.result);
    let verdict = match summary.result {
        CompareResult::Eq | CompareResult::EqText => style(verdict).green().bold(),
        CompareResult::NotEq => style(verdict).yellow().bold(),
        _ => style(verdict).red().bold(),
    };

    println!();
    println!("{}", style("Comparison Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("First:").bold(), source_a.display());
    println!("  {} {}", style("Second:").bold(), source_b.display());
    println!("  {} {}", style("Result:").bold(), verdict);
    println!(
        "  {} {} units in {} rounds",
        style("Compared:").bold(),
        format_number(summary.units_compared),
        format_number(summary.rounds)
    );
    if summary.text_passes > 0 {
        println!(
            "  {} {} ({} units)",
            style("Text passes:").bold(),
            format_number(summary.text_passes),
            format_number(summary.text_units)
        );
    }
    println!("  {} {:.3}s", style("Duration:").bold(), summary.elapsed.as_secs_f64());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_result_label() {
        assert_eq!(result_label(CompareResult::EqText), "equal as text");
        assert_eq!(result_label(CompareResult::Next), "not comparable");
    }
}

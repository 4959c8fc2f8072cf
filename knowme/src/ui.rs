//! Terminal display for the knowme CLI.
//!
//! Live progress goes to stderr so stdout stays clean for `--csv` and
//! `--json`. Tables, headers and summaries go to stdout. Uses only the
//! `console` crate.

use console::{pad_str, style, Alignment, Term};
use knowme_lib::{OutcomeKind, ProgressState, ResultRow, ServiceKind};
use std::path::Path;
use std::time::Duration;

// ── Progress line ────────────────────────────────────────────────────────────

const BAR_WIDTH: usize = 30;

/// Single progress line on stderr, redrawn after every completed lookup.
pub struct ProgressLine {
    term: Term,
}

impl ProgressLine {
    /// Returns `None` when stderr is not a terminal.
    pub fn start() -> Option<Self> {
        let term = Term::stderr();
        if term.is_term() {
            Some(Self { term })
        } else {
            None
        }
    }

    pub fn update(&self, state: ProgressState) {
        let _ = self.term.clear_line();
        let _ = self.term.write_str(&format!(
            "{} {}",
            style(render_bar(state, BAR_WIDTH)).cyan(),
            state
        ));
    }

    /// Clear the line so the table starts on a clean row.
    pub fn finish(self) {
        let _ = self.term.clear_line();
    }
}

/// Filled/empty block bar for `state`, `width` cells wide.
pub fn render_bar(state: ProgressState, width: usize) -> String {
    let filled = ((state.fraction() * width as f64).round() as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a text run.
pub fn print_header(kind: ServiceKind, identifier_count: usize, concurrency: usize) {
    println!(
        "{} {} {}",
        style("knowme").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "— Consulting {} identifier{}",
            identifier_count,
            if identifier_count == 1 { "" } else { "s" }
        ))
        .dim(),
    );
    println!(
        "{}",
        style(format!(
            "Service: {} | Concurrency: {}",
            kind, concurrency
        ))
        .dim()
    );
    println!();
}

// ── Services ─────────────────────────────────────────────────────────────────

/// Print every known service with its description.
pub fn print_services() {
    println!();
    println!("{}", style("Available services:").yellow().bold());
    println!();
    for kind in ServiceKind::all() {
        println!(
            "  {}  {}",
            style(format!("{:<12}", kind.name())).green().bold(),
            kind.description()
        );
    }
    println!();
    println!("Use: knowme --service <name> --file <FILE>");
}

// ── Result table ─────────────────────────────────────────────────────────────

/// Column widths fitting both the header and every row value.
pub fn column_widths<R: ResultRow>(rows: &[R]) -> Vec<usize> {
    let mut widths: Vec<usize> = R::columns()
        .iter()
        .map(|c| console::measure_text_width(c))
        .collect();
    for row in rows {
        for (width, value) in widths.iter_mut().zip(row.values()) {
            *width = (*width).max(console::measure_text_width(&value));
        }
    }
    widths
}

/// Print rows as an aligned table. The last column is colored by outcome.
pub fn print_table<R: ResultRow>(rows: &[R]) {
    let widths = column_widths(rows);
    let last = widths.len().saturating_sub(1);

    let header: Vec<String> = R::columns()
        .iter()
        .zip(&widths)
        .map(|(c, w)| pad_str(c, *w, Alignment::Left, None).into_owned())
        .collect();
    println!("  {}", style(header.join("  ")).bold());

    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("  {}", style(rule.join("  ")).dim());

    for row in rows {
        let cells: Vec<String> = row
            .values()
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (value, w))| {
                let padded = pad_str(value, *w, Alignment::Left, None).into_owned();
                if i == last {
                    outcome_style(row.kind(), padded)
                } else {
                    padded
                }
            })
            .collect();
        println!("  {}", cells.join("  "));
    }
}

fn outcome_style(kind: OutcomeKind, text: String) -> String {
    match kind {
        OutcomeKind::Success => style(text).green().bold().to_string(),
        OutcomeKind::Unavailable => style(text).yellow().to_string(),
        OutcomeKind::Error => style(text).red().to_string(),
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Rows sharing one displayed status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCount {
    pub status: String,
    pub kind: OutcomeKind,
    pub count: usize,
}

/// Group rows by the value of their last column, in order of first appearance.
pub fn status_counts<R: ResultRow>(rows: &[R]) -> Vec<StatusCount> {
    let mut counts: Vec<StatusCount> = Vec::new();
    for row in rows {
        let status = row.values().pop().unwrap_or_default();
        match counts.iter_mut().find(|c| c.status == status) {
            Some(entry) => entry.count += 1,
            None => counts.push(StatusCount {
                status,
                kind: row.kind(),
                count: 1,
            }),
        }
    }
    counts
}

/// Print the final summary bar with colored counts.
pub fn print_summary(total: usize, statuses: &[StatusCount], duration: Duration) {
    println!();
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );

    let mut parts = vec![format!(
        "{} identifier{}",
        style(total).bold(),
        if total == 1 { "" } else { "s" }
    )];
    parts.extend(
        statuses
            .iter()
            .map(|s| outcome_style(s.kind, format!("{} {}", s.count, s.status))),
    );
    let separator = format!("  {}  ", style("|").dim());
    println!("  {}", parts.join(separator.as_str()));
    println!("  Completed in {:.1} seconds", duration.as_secs_f64());
}

/// Confirm an export on stderr.
pub fn print_saved(path: &Path, rows: usize) {
    eprintln!(
        "{} Saved {} row{} to {}",
        style("✓").green(),
        rows,
        if rows == 1 { "" } else { "s" },
        style(path.display()).bold()
    );
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use knowme_lib::{DebtorRecord, DebtorStatus, ValidityRecord, Vigencia};

    fn validity(id: &str, vigencia: Vigencia) -> ValidityRecord {
        ValidityRecord {
            documento: id.to_string(),
            vigencia,
        }
    }

    #[test]
    fn test_render_bar_bounds() {
        let empty = render_bar(ProgressState { completed: 0, total: 4 }, 8);
        assert_eq!(empty, "░".repeat(8));

        let half = render_bar(ProgressState { completed: 2, total: 4 }, 8);
        assert_eq!(half, format!("{}{}", "█".repeat(4), "░".repeat(4)));

        let full = render_bar(ProgressState { completed: 4, total: 4 }, 8);
        assert_eq!(full, "█".repeat(8));
    }

    #[test]
    fn test_column_widths_fit_header_and_values() {
        let rows = vec![
            validity("1", Vigencia::NoDisponible),
            validity("123456789012", Vigencia::Reported("Si".to_string())),
        ];
        // "Documento" (9) < 12 digits; "No disponible" (13) > "Vigencia" (8)
        assert_eq!(column_widths(&rows), vec![12, 13]);
    }

    #[test]
    fn test_column_widths_without_rows() {
        let rows: Vec<DebtorRecord> = Vec::new();
        assert_eq!(column_widths(&rows), vec![9, 10, 6]);
    }

    #[test]
    fn test_status_counts_by_displayed_value() {
        let rows = vec![
            DebtorRecord::failed("1".to_string()),
            DebtorRecord {
                documento: "2".to_string(),
                sancionado: None,
                estado: DebtorStatus::NoMoroso,
            },
            DebtorRecord {
                documento: "3".to_string(),
                sancionado: None,
                estado: DebtorStatus::NoMoroso,
            },
        ];
        assert_eq!(
            status_counts(&rows),
            vec![
                StatusCount {
                    status: "Error".to_string(),
                    kind: OutcomeKind::Error,
                    count: 1,
                },
                StatusCount {
                    status: "No moroso".to_string(),
                    kind: OutcomeKind::Success,
                    count: 2,
                },
            ]
        );
    }

    #[test]
    fn test_status_counts_keep_reported_values_apart() {
        let rows = vec![
            validity("1", Vigencia::Reported("Si".to_string())),
            validity("2", Vigencia::Reported("No".to_string())),
            validity("3", Vigencia::NoDisponible),
            validity("4", Vigencia::Reported("Si".to_string())),
        ];
        let counts: Vec<(String, usize)> = status_counts(&rows)
            .into_iter()
            .map(|c| (c.status, c.count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("Si".to_string(), 2),
                ("No".to_string(), 1),
                ("No disponible".to_string(), 1),
            ]
        );
    }
}

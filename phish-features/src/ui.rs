//! Terminal output for the phish-features CLI.
//!
//! Headers, the live progress counter and the end-of-run summary. Everything
//! goes to stderr so stdout stays free for piping. Uses only the `console`
//! crate.

use console::{style, Term};
use phish_features_lib::RunSummary;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a run.
pub fn print_header(command: &str, candidate_count: usize, concurrency: usize) {
    let term = Term::stderr();
    let _ = term.write_line(&format!(
        "{} {} {}",
        style("phish-features").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "- {} over {} candidate{}",
            command,
            candidate_count,
            plural(candidate_count)
        ))
        .dim(),
    ));
    let _ = term.write_line(&format!(
        "{}",
        style(format!("Concurrency: {}", concurrency)).dim()
    ));
}

// ── Progress ─────────────────────────────────────────────────────────────────

/// In-place `[done/total]` counter on stderr.
///
/// Redraws at most once per percent of the batch so large runs do not
/// flood the terminal.
#[derive(Clone)]
pub struct Progress {
    term: Term,
    last_drawn: Arc<AtomicUsize>,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            last_drawn: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn update(&self, finished: usize, total: usize) {
        let step = (total / 100).max(1);
        let last = self.last_drawn.load(Ordering::Relaxed);
        if finished != total && finished < last + step && finished > last {
            return;
        }
        self.last_drawn.store(finished, Ordering::Relaxed);

        let _ = self.term.clear_line();
        let _ = self.term.write_str(&format!(
            "  {} {}",
            style(format!("[{}/{}]", finished, total)).cyan(),
            style("candidates finished").dim()
        ));
        if finished == total {
            let _ = self.term.write_line("");
            self.last_drawn.store(0, Ordering::Relaxed);
        }
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(summary: &RunSummary, output: &Path, duration: Duration) {
    let term = Term::stderr();
    let _ = term.write_line(&format!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    ));
    let _ = term.write_line(&format!(
        "  {} candidate{} in {:.1}s  {}  {}  {}  {}  {}  {}",
        style(summary.submitted).bold(),
        plural(summary.submitted),
        duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} emitted", summary.emitted)).green(),
        style("|").dim(),
        style(format!("{} dropped", summary.dropped)).yellow(),
        style("|").dim(),
        style(format!("{} failed", summary.failed)).red(),
    ));

    if summary.duplicate > 0 || summary.invalid > 0 {
        let _ = term.write_line(&format!(
            "  {}",
            style(format!(
                "{} duplicate, {} invalid (not dispatched)",
                summary.duplicate, summary.invalid
            ))
            .dim()
        ));
    }

    let _ = term.write_line(&format!(
        "  {} {}",
        style("Wrote").dim(),
        style(output.display()).bold()
    ));
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

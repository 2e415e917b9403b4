//! Upload progress line on stderr.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mediavault_transfer::SpeedCalculator;
use mediavault_upload::ProgressFn;

const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

/// Builds a progress callback that redraws one status line.
pub fn progress_printer() -> ProgressFn {
    let speed = SpeedCalculator::default();
    let last_draw: Mutex<Option<Instant>> = Mutex::new(None);
    Arc::new(move |done, total| {
        speed.record_total(done);
        let finished = done >= total;
        {
            let mut last = last_draw.lock().unwrap();
            if !finished && last.is_some_and(|t| t.elapsed() < REDRAW_INTERVAL) {
                return;
            }
            *last = Some(Instant::now());
        }
        let line = status_line(done, total, speed.bytes_per_second(), speed.eta(total - done.min(total)));
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r{line}\x1b[K");
        if finished {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    })
}

fn status_line(done: u64, total: u64, bytes_per_sec: f64, eta: Option<Duration>) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    };
    let eta = eta.map_or_else(|| "--:--".to_string(), format_eta);
    format!(
        "{percent:5.1}%  {} / {}  {}/s  eta {eta}",
        format_bytes(done),
        format_bytes(total),
        format_bytes(bytes_per_sec as u64),
    )
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    } else {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

use std::io::{self, Write};
use std::time::Instant;

/// User-facing status lines on stderr, stamped with the time since start.
pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    pub fn quiet() -> Self {
        Self::new(false)
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {}", msg.as_ref());
    }

    /// `Step 2/3: Translating ...`
    pub fn step(&self, current: usize, total: usize, msg: impl AsRef<str>) {
        self.info(format!("Step {current}/{total}: {}", msg.as_ref()));
    }

    /// `[ 2/10] deck.pptx: ok`
    pub fn item(&self, current: usize, total: usize, name: &str, status: &str) {
        let width = total.to_string().len();
        self.info(format!("[{current:>width$}/{total}] {name}: {status}"));
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

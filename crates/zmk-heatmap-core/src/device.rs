//! Keyboard discovery and line transport.
//!
//! USB CDC-ACM ports ignore the baud rate, so a serial console is read like
//! any other file.

use crate::error::{HeatmapError, HmResult};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const PROBE_LINES: usize = 10;
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Decides whether a port carries ZMK logging output.
pub trait DeviceProbe {
    fn probe(&self, path: &Path) -> bool;
}

/// True when a line looks like ZMK USB logging.
pub fn is_zmk_line(line: &str) -> bool {
    line.contains('[')
        && (line.contains("<dbg>")
            || line.contains("<inf>")
            || line.contains("position_state_changed")
            || line.contains("zmk"))
}

/// True when any of the first [`PROBE_LINES`] lines looks like ZMK logging.
pub fn looks_like_zmk<I, S>(lines: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .take(PROBE_LINES)
        .any(|l| is_zmk_line(l.as_ref()))
}

/// Reads a few lines from the port on a helper thread.
///
/// A port that never produces output keeps its reader thread blocked until
/// the process exits.
#[derive(Debug, Clone)]
pub struct SerialProbe {
    pub timeout: Duration,
}

impl Default for SerialProbe {
    fn default() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl DeviceProbe for SerialProbe {
    fn probe(&self, path: &Path) -> bool {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                debug!("Cannot open {}: {}", path.display(), e);
                return false;
            }
        };

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in lossy_lines(BufReader::new(file)).take(PROBE_LINES) {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            return;
                        }
                    }
                    Err(_) => return,
                }
            }
        });

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(line) if is_zmk_line(&line) => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    }
}

/// Ports worth probing on this platform.
pub fn candidate_ports() -> Vec<PathBuf> {
    if cfg!(windows) {
        return (1..=20).map(|i| PathBuf::from(format!("COM{}", i))).collect();
    }

    let mut ports: Vec<PathBuf> = match fs::read_dir("/dev") {
        Ok(entries) => entries
            .flatten()
            .filter(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                name.starts_with("tty.usbmodem") || name.starts_with("ttyACM")
            })
            .map(|e| e.path())
            .collect(),
        Err(e) => {
            debug!("Cannot list /dev: {}", e);
            Vec::new()
        }
    };
    ports.sort();
    ports
}

/// Resolves the `--keyboard` argument.
///
/// An explicit path is used as given; `auto` (or empty) requires exactly
/// one candidate to pass the probe.
pub fn find_keyboard<P: DeviceProbe>(
    requested: &str,
    candidates: &[PathBuf],
    probe: &P,
) -> HmResult<PathBuf> {
    if !requested.is_empty() && requested != "auto" {
        return Ok(PathBuf::from(requested));
    }

    info!("Scanning {} ports for ZMK keyboards...", candidates.len());
    let found: Vec<&PathBuf> = candidates
        .iter()
        .filter(|p| {
            let hit = probe.probe(p);
            if hit {
                info!("Found ZMK keyboard on {}", p.display());
            }
            hit
        })
        .collect();

    match found.as_slice() {
        [] => Err(HeatmapError::Device(
            "No ZMK keyboard found. Please make sure that the keyboard is connected via USB \
             and that the firmware has USB_LOGGING enabled. \
             See: https://zmk.dev/docs/development/usb-logging"
                .into(),
        )),
        [one] => Ok((*one).clone()),
        many => Err(HeatmapError::Device(format!(
            "Multiple ZMK keyboards found: {}. Please specify the wanted keyboard with --keyboard.",
            many.iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Splits a byte stream into lines, replacing invalid UTF-8 instead of
/// failing on it. Line noise must not end a session.
pub fn lossy_lines<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<String>> {
    reader.split(b'\n').map(|line| {
        line.map(|bytes| {
            let text = String::from_utf8_lossy(&bytes);
            text.strip_suffix('\r').unwrap_or(&*text).to_string()
        })
    })
}

/// Opens the device and yields its lines until it disconnects.
pub fn open_lines(
    path: &Path,
) -> HmResult<impl Iterator<Item = io::Result<String>> + Send + 'static> {
    let file = File::open(path)?;
    Ok(lossy_lines(BufReader::new(file)))
}

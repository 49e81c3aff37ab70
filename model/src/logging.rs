use chrono::Local;
use log::*;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Name of the append-only session log inside each host directory.
pub const SESSION_LOG_FILE: &str = "deploy.log";

/**
 * Append-only log stream for one host's deploy session, written to
 * `deploy.log` inside the host directory. Entries carry a timestamp and a
 * severity; everything is mirrored to the process-level logger as well.
 *
 * If the file cannot be opened the session still runs, logging to the
 * process logger only.
 */
pub struct SessionLog {
    name: String,
    file: Option<Mutex<File>>,
}

impl SessionLog {
    pub fn open(host_dir: &Path) -> Self {
        let name = host_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| host_dir.display().to_string());
        let path = host_dir.join(SESSION_LOG_FILE);
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(Mutex::new(file)),
            Err(err) => {
                warn!(
                    "[{}] cannot open {}: {}, session will log to the process logger only",
                    name,
                    path.display(),
                    err
                );
                None
            }
        };
        Self { name, file }
    }

    pub fn info(&self, message: &str) {
        self.append("INFO", message);
        info!("[{}] {}", self.name, message);
    }

    pub fn warn(&self, message: &str) {
        self.append("WARN", message);
        warn!("[{}] {}", self.name, message);
    }

    pub fn error(&self, message: &str) {
        self.append("ERROR", message);
        error!("[{}] {}", self.name, message);
    }

    /// Raw captured command output, recorded as-is under an INFO entry.
    pub fn output(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim_end_matches('\n');
        if text.is_empty() {
            return;
        }
        self.append("INFO", text);
        debug!("[{}] {}", self.name, text);
    }

    fn append(&self, level: &str, message: &str) {
        if let Some(file) = &self.file {
            let mut file = match file.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let _ = writeln!(
                file,
                "{} {:5} {}",
                Local::now().to_rfc3339(),
                level,
                message
            );
        }
    }
}

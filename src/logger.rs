/// Tagged console + file logger, modeled on the teacher's `src/logger.rs`:
/// fixed-width colored console tags, plain-text daily file sink under
/// `logs/`. File logging failures fall back to console-only, never panic.
use chrono::Local;
use colored::*;
use once_cell::sync::Lazy;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const ENABLE_FILE_LOGGING: bool = true;
const LOG_RETENTION_HOURS: i64 = 24;
const LOG_TYPE_WIDTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    Ingest,
    Decode,
    Resolve,
    Classify,
    Detect,
    Watchlist,
    Quote,
    Submit,
    Positions,
    Quality,
    Copy,
    Exit,
    System,
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogTag::Ingest => format!("{:<8}", "INGEST").bright_cyan().bold(),
            LogTag::Decode => format!("{:<8}", "DECODE").bright_blue().bold(),
            LogTag::Resolve => format!("{:<8}", "RESOLVE").bright_blue().bold(),
            LogTag::Classify => format!("{:<8}", "CLASSIFY").bright_yellow().bold(),
            LogTag::Detect => format!("{:<8}", "DETECT").bright_green().bold(),
            LogTag::Watchlist => format!("{:<8}", "WATCH").bright_white().bold(),
            LogTag::Quote => format!("{:<8}", "QUOTE").bright_magenta().bold(),
            LogTag::Submit => format!("{:<8}", "SUBMIT").bright_red().bold(),
            LogTag::Positions => format!("{:<8}", "POSITION").bright_magenta().bold(),
            LogTag::Quality => format!("{:<8}", "QUALITY").bright_yellow().bold(),
            LogTag::Copy => format!("{:<8}", "COPY").bright_green().bold(),
            LogTag::Exit => format!("{:<8}", "EXIT").bright_red().bold(),
            LogTag::System => format!("{:<8}", "SYSTEM").white().bold(),
        };
        write!(f, "{}", s)
    }
}

struct FileLogger {
    writer: Option<BufWriter<File>>,
    log_dir: PathBuf,
}

impl FileLogger {
    fn new() -> std::io::Result<Self> {
        let log_dir = PathBuf::from("logs");
        fs::create_dir_all(&log_dir)?;
        let name = format!("copytrader_{}.log", Local::now().format("%Y-%m-%d"));
        let file = OpenOptions::new().create(true).append(true).open(log_dir.join(name))?;
        Ok(Self { writer: Some(BufWriter::new(file)), log_dir })
    }

    fn write(&mut self, line: &str) {
        if let Some(w) = self.writer.as_mut() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }

    fn cleanup_old(&self) {
        let cutoff = Local::now() - chrono::Duration::hours(LOG_RETENTION_HOURS);
        if let Ok(entries) = fs::read_dir(&self.log_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if !(name.starts_with("copytrader_") && name.ends_with(".log")) {
                    continue;
                }
                if let Ok(meta) = entry.metadata() {
                    if let Ok(modified) = meta.modified() {
                        if chrono::DateTime::<Local>::from(modified) < cutoff {
                            let _ = fs::remove_file(entry.path());
                        }
                    }
                }
            }
        }
    }
}

static FILE_LOGGER: Lazy<Arc<Mutex<Option<FileLogger>>>> = Lazy::new(|| {
    if ENABLE_FILE_LOGGING {
        match FileLogger::new() {
            Ok(l) => {
                l.cleanup_old();
                Arc::new(Mutex::new(Some(l)))
            }
            Err(e) => {
                eprintln!("failed to initialize file logger: {}", e);
                Arc::new(Mutex::new(None))
            }
        }
    } else {
        Arc::new(Mutex::new(None))
    }
});

pub fn log(tag: LogTag, kind: &str, message: &str) {
    let now = Local::now().format("%H:%M:%S%.3f");
    let kind_padded = format!("{:<width$}", kind, width = LOG_TYPE_WIDTH);
    let console_line = format!("{} [{}] [{}] {}", now, tag, kind_padded, message);
    println!("{}", console_line);

    let plain_line = format!("{} [{:<8}] [{:<10}] {}", now, strip_tag(&tag), kind, message);
    if let Ok(mut guard) = FILE_LOGGER.lock() {
        if let Some(file_logger) = guard.as_mut() {
            file_logger.write(&plain_line);
        }
    }
}

fn strip_tag(tag: &LogTag) -> &'static str {
    match tag {
        LogTag::Ingest => "INGEST",
        LogTag::Decode => "DECODE",
        LogTag::Resolve => "RESOLVE",
        LogTag::Classify => "CLASSIFY",
        LogTag::Detect => "DETECT",
        LogTag::Watchlist => "WATCH",
        LogTag::Quote => "QUOTE",
        LogTag::Submit => "SUBMIT",
        LogTag::Positions => "POSITION",
        LogTag::Quality => "QUALITY",
        LogTag::Copy => "COPY",
        LogTag::Exit => "EXIT",
        LogTag::System => "SYSTEM",
    }
}

pub fn info(tag: LogTag, message: &str) {
    log(tag, "INFO", message);
}

pub fn warn(tag: LogTag, message: &str) {
    log(tag, "WARN", message);
}

pub fn error(tag: LogTag, message: &str) {
    log(tag, "ERROR", message);
}

pub fn debug(tag: LogTag, message: &str) {
    log(tag, "DEBUG", message);
}

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};
use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: Option<File>,
    sink: Option<mpsc::Sender<String>>,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for sink rendering (mapped to ANSI in the CLI)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;

/// Prefixes the engine itself logs under. Platforms register their own.
const ENGINE_PREFIXES: [(&str, u8); 3] = [
    ("run", COLOR_GREEN),
    ("search", COLOR_BLUE),
    ("script", COLOR_BLUE),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Level::Info),
            "WARN" => Some(Level::Warn),
            "ERROR" => Some(Level::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured line as delivered to the sink.
///
/// On the wire the fields are joined with `\x1f`:
/// `level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage`. The message is last,
/// so it may itself contain the separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    pub level: Level,
    pub prefix: &'a str,
    pub color: u8,
    pub ts: &'a str,
    pub msg: &'a str,
}

impl<'a> Record<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut parts = line.splitn(5, '\x1f');
        let level = Level::parse(parts.next()?)?;
        let prefix = parts.next()?;
        let color = parts.next()?.parse().ok()?;
        let ts = parts.next()?;
        let msg = parts.next()?;
        Some(Record { level, prefix, color, ts, msg })
    }

    pub fn encode(&self) -> String {
        format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", self.level, self.prefix, self.color, self.ts, self.msg)
    }

    /// Plain-text form written to `replay.log`.
    fn file_line(&self) -> String {
        if self.prefix.is_empty() {
            format!("[{}] [{}] {}", self.ts, self.level, self.msg)
        } else {
            format!("[{}] [{}] [{}] {}", self.ts, self.level, self.prefix, self.msg)
        }
    }
}

/// Initialize the global logger. Clears `replay.log` in `log_dir` and
/// registers the engine prefixes. If the file cannot be opened, records
/// still go to the sink.
pub fn init(log_dir: &Path) {
    fs::create_dir_all(log_dir).ok();
    let log_path = log_dir.join("replay.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .ok();

    let prefixes = ENGINE_PREFIXES.iter().map(|&(p, c)| (p.to_string(), c)).collect();
    LOGGER.set(Mutex::new(Logger { file, sink: None, prefixes })).ok();
}

/// Wire a channel that receives every encoded `Record`.
pub fn set_sink(tx: mpsc::Sender<String>) {
    if let Some(logger) = LOGGER.get() {
        if let Ok(mut l) = logger.lock() {
            l.sink = Some(tx);
        }
    }
}

/// Register a prefix with a color. All subsequent `*_p` calls with this
/// prefix carry the color.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(logger) = LOGGER.get() {
        if let Ok(mut l) = logger.lock() {
            l.prefixes.insert(prefix.to_string(), color);
        }
    }
}

/// No-op until `init` has run.
fn write_log(level: Level, prefix: &str, msg: &str) {
    let Some(logger) = LOGGER.get() else { return };
    let Ok(mut l) = logger.lock() else { return };

    let ts = Local::now().format("%H:%M:%S%.3f").to_string();
    let color = l.prefixes.get(prefix).copied().unwrap_or(0);
    let record = Record { level, prefix, color, ts: &ts, msg };

    if let Some(file) = l.file.as_mut() {
        writeln!(file, "{}", record.file_line()).ok();
    }
    if let Some(tx) = &l.sink {
        tx.send(record.encode()).ok();
    }
}

pub fn info(msg: &str) {
    write_log(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    write_log(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    write_log(Level::Error, "", msg);
}

/// Log with a registered prefix.
pub fn info_p(prefix: &str, msg: &str) {
    write_log(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log(Level::Warn, prefix, msg);
}

/// Per-step line under the `run` prefix, tagged with the step index.
pub fn step(level: Level, index: usize, msg: &str) {
    write_log(level, "run", &format!("[step {:02}] {}", index, msg));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_parser() {
        let line = "WARN\x1frun\x1f2\x1f12:00:00.000\x1fstep 3 failed: a\x1fb";
        let record = Record::parse(line).unwrap();
        assert_eq!(record.level, Level::Warn);
        assert_eq!((record.prefix, record.color, record.ts), ("run", 2, "12:00:00.000"));
        assert_eq!(record.msg, "step 3 failed: a\x1fb");
        assert_eq!(record.encode(), line);
    }

    #[test]
    fn malformed_record_is_rejected() {
        assert!(Record::parse("INFO\x1frun").is_none());
        assert!(Record::parse("INFO\x1frun\x1fx\x1fts\x1fmsg").is_none());
        assert!(Record::parse("DEBUG\x1frun\x1f1\x1fts\x1fmsg").is_none());
    }

    #[test]
    fn file_line_omits_empty_prefix() {
        let bare = Record { level: Level::Info, prefix: "", color: 0, ts: "t", msg: "hi" };
        assert_eq!(bare.file_line(), "[t] [INFO] hi");
        let tagged = Record { prefix: "search", ..bare };
        assert_eq!(tagged.file_line(), "[t] [INFO] [search] hi");
    }

    #[test]
    fn sink_receives_engine_prefix_colors() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path());
        let (tx, rx) = mpsc::channel();
        set_sink(tx);

        step(Level::Warn, 4, "sink-check marker");
        // other tests log concurrently; pick ours out by its message
        let line = rx
            .iter()
            .find(|l| l.ends_with("sink-check marker"))
            .unwrap();
        let record = Record::parse(&line).unwrap();
        assert_eq!(record.level, Level::Warn);
        assert_eq!(record.prefix, "run");
        assert_eq!(record.color, COLOR_GREEN);
        assert_eq!(record.msg, "[step 04] sink-check marker");
    }
}

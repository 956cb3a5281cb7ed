//! Log pane filtering: a level floor plus a case-insensitive search term.

use std::sync::LazyLock;

use regex::Regex;

use crate::logs::LogLine;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

static ERROR_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|err|fatal|panic|exception|crit(ical)?|emerg)\b").expect("Invalid error pattern")
});
static WARN_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(warn(ing)?|wrn|deprecated)\b").expect("Invalid warn pattern"));
static DEBUG_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(debug|dbg|trace)\b").expect("Invalid debug pattern"));

/// Best-effort severity of a container log line
pub fn detect_level(text: &str) -> LogLevel {
    if ERROR_WORDS.is_match(text) {
        LogLevel::Error
    } else if WARN_WORDS.is_match(text) {
        LogLevel::Warn
    } else if DEBUG_WORDS.is_match(text) {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LevelFloor {
    #[default]
    All,
    WarnAndAbove,
    ErrorOnly,
}

impl LevelFloor {
    pub fn cycle(self) -> Self {
        match self {
            Self::All => Self::WarnAndAbove,
            Self::WarnAndAbove => Self::ErrorOnly,
            Self::ErrorOnly => Self::All,
        }
    }

    pub fn admits(&self, level: LogLevel) -> bool {
        match self {
            Self::All => true,
            Self::WarnAndAbove => level >= LogLevel::Warn,
            Self::ErrorOnly => level == LogLevel::Error,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::WarnAndAbove => "WARN+",
            Self::ErrorOnly => "ERROR",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogFilter {
    pub floor: LevelFloor,
    /// Stored lowercased; `None` when empty
    search: Option<String>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn set_search(&mut self, term: &str) {
        let term = term.trim();
        self.search = (!term.is_empty()).then(|| term.to_lowercase());
    }

    pub fn clear_search(&mut self) {
        self.search = None;
    }

    pub fn cycle_floor(&mut self) {
        self.floor = self.floor.cycle();
    }

    pub fn is_active(&self) -> bool {
        self.search.is_some() || self.floor != LevelFloor::All
    }

    pub fn matches(&self, text: &str) -> bool {
        if !self.floor.admits(detect_level(text)) {
            return false;
        }
        match &self.search {
            Some(term) => text.to_lowercase().contains(term.as_str()),
            None => true,
        }
    }

    pub fn apply<'a>(&self, lines: impl IntoIterator<Item = &'a LogLine>) -> Vec<&'a LogLine> {
        lines.into_iter().filter(|l| self.matches(&l.text)).collect()
    }

    pub fn label(&self) -> String {
        match &self.search {
            Some(term) => format!("{} /{}/", self.floor.label(), term),
            None => self.floor.label().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn line(seq: u64, text: &str) -> LogLine {
        LogLine {
            seq,
            at: SystemTime::now(),
            text: text.into(),
        }
    }

    #[test]
    fn test_detect_level() {
        assert_eq!(detect_level("ERROR: something failed"), LogLevel::Error);
        assert_eq!(detect_level("[web-1] level=error msg=boom"), LogLevel::Error);
        assert_eq!(detect_level("WARN deprecated flag"), LogLevel::Warn);
        assert_eq!(detect_level("2024-01-01 DEBUG cache miss"), LogLevel::Debug);
        assert_eq!(detect_level("GET /health 200"), LogLevel::Info);
        // Words that merely contain a keyword do not count
        assert_eq!(detect_level("terror in the aisles"), LogLevel::Info);
    }

    #[test]
    fn test_floor_cycle() {
        let floor = LevelFloor::All;
        assert_eq!(floor.cycle(), LevelFloor::WarnAndAbove);
        assert_eq!(floor.cycle().cycle().cycle(), LevelFloor::All);
        assert!(LevelFloor::WarnAndAbove.admits(LogLevel::Error));
        assert!(!LevelFloor::WarnAndAbove.admits(LogLevel::Info));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let mut filter = LogFilter::new();
        filter.set_search("Timeout");
        let lines = [line(1, "upstream TIMEOUT"), line(2, "ok"), line(3, "timeout again")];
        let shown: Vec<u64> = filter.apply(&lines).into_iter().map(|l| l.seq).collect();
        assert_eq!(shown, vec![1, 3]);
        assert_eq!(filter.label(), "ALL /timeout/");

        filter.set_search("   ");
        assert!(!filter.is_active());
    }

    #[test]
    fn test_floor_and_search_combine() {
        let mut filter = LogFilter::new();
        filter.cycle_floor();
        filter.set_search("db");
        assert!(filter.matches("WARN db slow"));
        assert!(!filter.matches("INFO db ready"));
        assert!(!filter.matches("WARN cache cold"));
    }
}

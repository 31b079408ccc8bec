use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;

use crate::{ChildQuery, LogEntry, LogType};

pub const DEFAULT_COMBINED_LIMIT: usize = 10;
pub const DEFAULT_FILTERED_LIMIT: usize = 20;

pub const PLACEHOLDER_CLASS: &str = "initial-msg";
pub const WAITING_PLACEHOLDER: &str = "Esperando datos...";
pub const NO_SIGHTINGS_PLACEHOLDER: &str = "Sin detecciones...";

/// How the event log is shown.
///
/// `Combined` reads the last `limit` entries of any type into one panel.
/// `Filtered` keeps two panels, gestures and unknown sightings, each reading
/// the last `limit` entries of its own type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LogViewMode {
    Combined {
        #[serde(default = "default_combined_limit")]
        limit: usize,
    },
    Filtered {
        #[serde(default = "default_filtered_limit")]
        limit: usize,
    },
}

fn default_combined_limit() -> usize {
    DEFAULT_COMBINED_LIMIT
}

fn default_filtered_limit() -> usize {
    DEFAULT_FILTERED_LIMIT
}

impl Default for LogViewMode {
    fn default() -> Self {
        LogViewMode::Combined {
            limit: DEFAULT_COMBINED_LIMIT,
        }
    }
}

impl LogViewMode {
    pub fn panels(&self) -> Vec<LogPanel> {
        match *self {
            LogViewMode::Combined { limit } => vec![LogPanel::new(LogPanelId::Combined, limit)],
            LogViewMode::Filtered { limit } => vec![
                LogPanel::new(LogPanelId::Gestures, limit),
                LogPanel::new(LogPanelId::UnknownSightings, limit),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogPanelId {
    Combined,
    Gestures,
    UnknownSightings,
}

impl LogPanelId {
    /// Entry type a panel is restricted to.
    pub fn filter(&self) -> Option<LogType> {
        match self {
            LogPanelId::Combined => None,
            LogPanelId::Gestures => Some(LogType::Gesture),
            LogPanelId::UnknownSightings => Some(LogType::UnknownSighting),
        }
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            LogPanelId::UnknownSightings => NO_SIGHTINGS_PLACEHOLDER,
            _ => WAITING_PLACEHOLDER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogItem {
    /// Store key of the entry, `None` for the placeholder.
    pub key: Option<String>,
    pub text: String,
    pub css_class: String,
}

impl LogItem {
    fn placeholder(text: &str) -> Self {
        Self {
            key: None,
            text: text.to_owned(),
            css_class: PLACEHOLDER_CLASS.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPanelView {
    pub id: LogPanelId,
    pub items: Vec<LogItem>,
}

/// Bounded list of log lines, newest first.
#[derive(Debug, Clone)]
pub struct LogPanel {
    id: LogPanelId,
    limit: usize,
    items: VecDeque<LogItem>,
    waiting: bool,
}

impl LogPanel {
    pub fn new(id: LogPanelId, limit: usize) -> Self {
        let mut items = VecDeque::new();
        items.push_back(LogItem::placeholder(id.placeholder()));
        Self {
            id,
            limit: limit.max(1),
            items,
            waiting: true,
        }
    }

    pub fn id(&self) -> LogPanelId {
        self.id
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn query(&self) -> ChildQuery {
        let query = ChildQuery::new().limit_to_last(self.limit);
        match self.id.filter() {
            Some(log_type) => {
                query.order_by_child_equal_to("type", Value::String(log_type.as_str().to_owned()))
            }
            None => query,
        }
    }

    pub fn accepts(&self, entry: &LogEntry) -> bool {
        self.id
            .filter()
            .map_or(true, |log_type| entry.log_type == log_type)
    }

    /// Adds an entry on top. The first real entry replaces the placeholder,
    /// beyond the limit the oldest line drops off the bottom.
    pub fn prepend(&mut self, key: impl Into<String>, entry: &LogEntry) -> bool {
        if !self.accepts(entry) {
            return false;
        }
        if self.waiting {
            self.items.clear();
            self.waiting = false;
        }
        self.items.push_front(LogItem {
            key: Some(key.into()),
            text: self.format(entry),
            css_class: item_class(&entry.log_type).to_owned(),
        });
        self.items.truncate(self.limit);
        true
    }

    fn format(&self, entry: &LogEntry) -> String {
        let with_user = match self.id {
            LogPanelId::UnknownSightings => false,
            _ => !entry.user.is_empty(),
        };
        if with_user {
            format!("[{}] {}: {}", entry.timestamp, entry.user, entry.action)
        } else {
            format!("[{}] {}", entry.timestamp, entry.action)
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &LogItem> {
        self.items.iter()
    }

    pub fn view(&self) -> LogPanelView {
        LogPanelView {
            id: self.id,
            items: self.items.iter().cloned().collect(),
        }
    }
}

fn item_class(log_type: &LogType) -> &'static str {
    match log_type {
        LogType::Gesture => "log-gesture",
        LogType::UnknownSighting => "log-unknown",
        _ => "log-other",
    }
}

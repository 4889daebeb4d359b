//! User-facing notifications. Every action reports its outcome as a
//! `Notice`; the editor shows them as toasts, the CLI prints them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: Level,
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Notice { level: Level::Success, title: title.into(), description: description.into() }
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Notice { level: Level::Info, title: title.into(), description: description.into() }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Notice { level: Level::Error, title: title.into(), description: description.into() }
    }

    pub fn icon(&self) -> &'static str {
        match self.level {
            Level::Success => "✅",
            Level::Info => "ℹ️",
            Level::Error => "❌",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{} {}", self.icon(), self.title)
        } else {
            write!(f, "{} {} {}", self.icon(), self.title, self.description)
        }
    }
}

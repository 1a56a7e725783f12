// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::sync::Arc;

/// The child stream a line was read from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Stdout,
    Stderr,
}

impl Source {
    pub fn display(self) -> &'static str {
        match self {
            Source::Stdout => "stdout",
            Source::Stderr => "stderr",
        }
    }
}

/// One line of a child's output, tagged with the child's label
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub label: Arc<str>,
    pub source: Source,
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.text)
    }
}

/// Everything that travels over the shared output channel to the logger
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Booting { label: Arc<str>, command: String },
    Line(LogLine),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Booting { label, command } => write!(f, "Booting {}: {}", label, command),
            Event::Line(line) => fmt::Display::fmt(line, f),
        }
    }
}

impl From<LogLine> for Event {
    fn from(line: LogLine) -> Self {
        Event::Line(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let label: Arc<str> = Arc::from("web");
        let line = LogLine {
            label: label.clone(),
            source: Source::Stderr,
            text: "listening on :8080".to_string(),
        };

        assert_eq!(Event::from(line).to_string(), "web: listening on :8080");
        assert_eq!(
            Event::Booting {
                label,
                command: "./server".to_string()
            }
            .to_string(),
            "Booting web: ./server"
        );
    }
}

// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Procfile parsing, one `name: command` per line

use std::collections::HashSet;
use std::path::Path;

use crate::error::ErrorKind;
use crate::Error;

/// A named command to be run under the supervisor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSpec {
    name: String,
    command: String,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The command, passed verbatim to the shell
    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Reads and parses the Procfile at `path`
pub async fn load(path: impl AsRef<Path>) -> Result<Vec<ProcessSpec>, Error> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ErrorKind::ReadSpec {
            path: path.to_path_buf(),
            source,
        })?;

    parse(&text)
}

/// Parses Procfile text into specs, in file order.
///
/// Blank lines and lines starting with `#` are skipped. The first `:` splits the name from the
///  command, so the command itself may contain `:`. Any other line is rejected.
pub fn parse(text: &str) -> Result<Vec<ProcessSpec>, Error> {
    let mut specs = Vec::new();
    let mut names = HashSet::new();

    for (idx, raw) in text.split('\n').enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let malformed = || ErrorKind::MalformedSpec {
            line,
            content: trimmed.to_string(),
        };

        let mut split = trimmed.splitn(2, ':');
        let name = split.next().map(str::trim).unwrap_or_default();
        let command = split.next().map(str::trim).ok_or_else(malformed)?;

        if name.is_empty() || command.is_empty() {
            return Err(malformed().into());
        }

        if !names.insert(name.to_string()) {
            return Err(ErrorKind::DuplicateName {
                line,
                name: name.to_string(),
            }
            .into());
        }

        specs.push(ProcessSpec::new(name, command));
    }

    if specs.is_empty() {
        return Err(ErrorKind::NoProcesses.into());
    }

    Ok(specs)
}

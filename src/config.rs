// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::str::FromStr;

use crate::Error;

pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_BUFFER: usize = 1024;

/// How the supervisor's own exit code is derived from its children
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCodePolicy {
    /// Always exit 0 once every child has stopped
    Ignore,
    /// Exit with the highest child exit code, signals count as 128 + signal number and a child
    ///  that could not be waited on counts as 1
    Worst,
}

impl ExitCodePolicy {
    pub const VALUES: &'static [&'static str] = &["ignore", "worst"];

    pub fn exit_code<'a>(self, statuses: impl IntoIterator<Item = Option<&'a ExitStatus>>) -> i32 {
        match self {
            ExitCodePolicy::Ignore => 0,
            ExitCodePolicy::Worst => statuses
                .into_iter()
                .map(|status| status.map_or(1, status_code))
                .max()
                .unwrap_or(0),
        }
    }
}

impl FromStr for ExitCodePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ignore" => Ok(ExitCodePolicy::Ignore),
            "worst" => Ok(ExitCodePolicy::Worst),
            _ => Err(format!("unknown exit code policy: {}", s).into()),
        }
    }
}

/// What a termination request arriving during shutdown does
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatSignalPolicy {
    /// Keep waiting on the cooperative shutdown
    Ignore,
    /// Send SIGKILL to every child that is still running
    Kill,
}

impl RepeatSignalPolicy {
    pub const VALUES: &'static [&'static str] = &["ignore", "kill"];
}

impl FromStr for RepeatSignalPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ignore" => Ok(RepeatSignalPolicy::Ignore),
            "kill" => Ok(RepeatSignalPolicy::Kill),
            _ => Err(format!("unknown repeat signal policy: {}", s).into()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Interpreter used to run each command as `<shell> -c <command>`
    pub shell: PathBuf,
    /// Capacity of the shared output channel
    pub buffer: usize,
    pub exit_code: ExitCodePolicy,
    pub on_repeat_signal: RepeatSignalPolicy,
    /// Color labels with ANSI escapes
    pub color: bool,
    /// Pad labels to the longest process name
    pub pad: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            buffer: DEFAULT_BUFFER,
            exit_code: ExitCodePolicy::Ignore,
            on_repeat_signal: RepeatSignalPolicy::Kill,
            color: true,
            pad: false,
        }
    }
}

fn status_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signo| 128 + signo))
        .unwrap_or(1)
}

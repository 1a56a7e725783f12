// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Labels for the multiplexed output

/// Bold ANSI foreground colors: green, yellow, blue, magenta, cyan
pub const COLORS: [u8; 5] = [32, 33, 34, 35, 36];

/// Produces the label prefixed to every line of a process' output
pub trait Labeler: Send + Sync {
    fn label(&self, index: usize, name: &str) -> String;
}

/// Colors each name from [`COLORS`], cycling by index
#[derive(Clone, Copy, Debug, Default)]
pub struct AnsiLabeler {
    width: usize,
}

impl AnsiLabeler {
    /// Names will be right padded to `width` before coloring
    pub fn padded(width: usize) -> Self {
        Self { width }
    }
}

impl Labeler for AnsiLabeler {
    fn label(&self, index: usize, name: &str) -> String {
        let code = COLORS[index % COLORS.len()];
        format!("\x1b[1;{}m{:<width$}\x1b[0m", code, name, width = self.width)
    }
}

/// Uses the name as is, for terminals or logs without color
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainLabeler {
    width: usize,
}

impl PlainLabeler {
    pub fn padded(width: usize) -> Self {
        Self { width }
    }
}

impl Labeler for PlainLabeler {
    fn label(&self, _index: usize, name: &str) -> String {
        format!("{:<width$}", name, width = self.width)
    }
}

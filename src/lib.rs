// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Run every process of a Procfile, multiplex their labeled output, and stop them together

pub mod color;
pub mod config;
pub mod control;
mod error;
pub mod msg;
pub mod pipe;
pub mod procfile;
pub mod procs;

pub use config::Config;
pub use error::{Error, ErrorKind};

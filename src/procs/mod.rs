// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The supervisor and the pieces it drives for each child
//!
//! The [`Supervisor`] launches every child with [`launch`], then for each one pipes stdout and
//!  stderr into a single channel that the [`Logger`] drains to the console.

mod launcher;
mod logger;
mod supervisor;

pub use launcher::{launch, ManagedProcess, ProcessGroup};
pub use logger::Logger;
pub use supervisor::{Exit, Report, Supervisor, EXITING};

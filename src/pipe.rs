// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Fan-in of child output streams onto the shared logger channel

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc::Sender;
use tracing::{debug, trace};

use crate::msg::{Event, LogLine, Source};

/// Longest line forwarded as one [`LogLine`], in bytes including the newline
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Reads `stream` line by line, sending each line to `sink` tagged with `label`.
///
/// Returns the number of lines forwarded. The loop ends at end of stream, on a read error (treated
///  the same as end of stream), or once the receiving logger is gone. A final line without a
///  trailing newline is still forwarded. Lines that are not valid UTF-8 are converted lossily.
///
/// Lines longer than [`MAX_LINE_LEN`] are forwarded in pieces of at most that length.
pub async fn pipe<R>(stream: R, label: Arc<str>, source: Source, sink: Sender<Event>) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);
    let mut count = 0;

    loop {
        buf.clear();
        let mut limited = (&mut reader).take(MAX_LINE_LEN as u64);
        match limited.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => (),
            Err(err) => {
                debug!(%label, source = source.display(), "read error, closing stream: {}", err);
                break;
            }
        }

        let line = LogLine {
            label: Arc::clone(&label),
            source,
            text: trim_newline(&buf),
        };

        if sink.send(Event::Line(line)).await.is_err() {
            debug!(%label, "logger closed, dropping remaining output");
            break;
        }
        count += 1;
    }

    trace!(%label, source = source.display(), count, "stream closed");
    count
}

fn trim_newline(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }

    String::from_utf8_lossy(&buf[..end]).into_owned()
}

// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::Receiver;
use tracing::debug;

use crate::msg::Event;
use crate::Error;

/// Writes every event from the shared output channel to the console.
///
/// Rules:
///  - the only writer of the console while children are running
///  - one event per line, in the order they are received
#[derive(Debug)]
pub struct Logger<W> {
    writer: W,
}

impl<W> Logger<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Drains `events` until every sender has been dropped, then hands back the writer
    pub async fn drain(mut self, mut events: Receiver<Event>) -> Result<W, Error> {
        let mut count = 0_usize;
        while let Some(event) = events.recv().await {
            let mut line = event.to_string();
            line.push('\n');

            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await?;
            count += 1;
        }

        debug!(count, "output channel closed");
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::msg::{LogLine, Source};

    #[tokio::test]
    async fn test_drain_until_closed() {
        let (tx, rx) = mpsc::channel(2);
        let logger = tokio::spawn(Logger::new(Vec::new()).drain(rx));

        let label: Arc<str> = Arc::from("web");
        tx.send(Event::Booting {
            label: label.clone(),
            command: "echo hi".to_string(),
        })
        .await
        .expect("send failed");
        for text in &["hi", "there", "again"] {
            tx.send(Event::Line(LogLine {
                label: label.clone(),
                source: Source::Stdout,
                text: text.to_string(),
            }))
            .await
            .expect("send failed");
        }
        drop(tx);

        let out = logger
            .await
            .expect("logger panicked")
            .expect("logger failed");
        assert_eq!(
            String::from_utf8(out).expect("not utf8"),
            "Booting web: echo hi\nweb: hi\nweb: there\nweb: again\n"
        );
    }
}

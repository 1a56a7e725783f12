// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::process::ExitStatus;
use std::sync::Arc;

use futures::future::join_all;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::color::{AnsiLabeler, Labeler, PlainLabeler};
use crate::config::{Config, ExitCodePolicy};
use crate::control::Shutdown;
use crate::msg::{Event, Source};
use crate::pipe::pipe;
use crate::procfile::ProcessSpec;
use crate::procs::launcher::{launch, ManagedProcess};
use crate::procs::logger::Logger;
use crate::Error;

/// Final line written once every child has stopped and all output is drained
pub const EXITING: &str = "exiting";

/// How one child finished
#[derive(Debug)]
pub struct Exit {
    pub name: String,
    /// `None` if the child could not be waited on
    pub status: Option<ExitStatus>,
}

/// The outcome of [`Supervisor::run`], one entry per spec in spec order
#[derive(Debug, Default)]
pub struct Report {
    pub exits: Vec<Exit>,
}

impl Report {
    pub fn exit_code(&self, policy: ExitCodePolicy) -> i32 {
        policy.exit_code(self.exits.iter().map(|exit| exit.status.as_ref()))
    }
}

/// Launch and monitor processes
///
/// Rules:
///   - every spec is launched before any output is read, a failed launch stops all others
///   - stdout and stderr of every child are sent to the logger
///   - returns only once every child has exited and its output has been written
pub struct Supervisor {
    config: Config,
    labeler: Option<Box<dyn Labeler>>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            labeler: None,
        }
    }

    /// Replaces the labeler chosen from the config
    pub fn with_labeler(mut self, labeler: Box<dyn Labeler>) -> Self {
        self.labeler = Some(labeler);
        self
    }

    /// Runs every spec to completion, writing the multiplexed output to `writer`.
    ///
    /// Children are stopped through `shutdown`. On success the writer is returned along with the
    ///  report, after the final [`EXITING`] line has been written.
    pub async fn run<W>(
        &self,
        specs: &[ProcessSpec],
        shutdown: &Shutdown,
        writer: W,
    ) -> Result<(Report, W), Error>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, events) = mpsc::channel(self.config.buffer.max(1));
        let logger = tokio::spawn(Logger::new(writer).drain(events));

        let processes = match self.launch_all(specs, shutdown).await {
            Ok(processes) => processes,
            Err(err) => {
                drop(sink);
                logger.await.ok();
                return Err(err);
            }
        };

        let kill = shutdown.kill_scope();
        let supervised = processes
            .into_iter()
            .map(|process| tokio::spawn(supervise(process, kill.clone(), sink.clone())));
        let results = join_all(supervised).await;

        let exits = results
            .into_iter()
            .zip(specs)
            .map(|(result, spec)| {
                let status = result.unwrap_or_else(|err| {
                    warn!(process = spec.name(), "supervision task failed: {}", err);
                    None
                });

                Exit {
                    name: spec.name().to_string(),
                    status,
                }
            })
            .collect();

        // every pipe has finished, this was the last sender
        drop(sink);
        let mut writer = logger
            .await
            .map_err(|err| format!("logger task failed: {}", err))??;

        writer.write_all(format!("{}\n", EXITING).as_bytes()).await?;
        writer.flush().await?;

        Ok((Report { exits }, writer))
    }

    async fn launch_all(
        &self,
        specs: &[ProcessSpec],
        shutdown: &Shutdown,
    ) -> Result<Vec<ManagedProcess>, Error> {
        let default_labeler;
        let labeler: &dyn Labeler = match self.labeler {
            Some(ref labeler) => labeler.as_ref(),
            None => {
                default_labeler = self.labeler_for(specs);
                default_labeler.as_ref()
            }
        };

        let mut processes = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let label: Arc<str> = Arc::from(labeler.label(index, spec.name()));
            match launch(spec.clone(), label, &self.config.shell, shutdown.scope()) {
                Ok(process) => processes.push(process),
                Err(err) => {
                    warn!(
                        process = spec.name(),
                        launched = processes.len(),
                        "launch failed, stopping all processes"
                    );
                    for process in processes {
                        process.abort().await;
                    }
                    return Err(err);
                }
            }
        }

        Ok(processes)
    }

    fn labeler_for(&self, specs: &[ProcessSpec]) -> Box<dyn Labeler> {
        let width = if self.config.pad {
            specs.iter().map(|spec| spec.name().len()).max().unwrap_or(0)
        } else {
            0
        };

        if self.config.color {
            Box::new(AnsiLabeler::padded(width))
        } else {
            Box::new(PlainLabeler::padded(width))
        }
    }
}

/// Announces the child, pipes both of its streams into `sink` and waits for it to exit and for
///  both streams to close.
///
/// Termination requests keep reaching the child's process group until both streams are closed,
///  since background jobs may hold them open after the child has exited.
async fn supervise(
    mut process: ManagedProcess,
    kill: CancellationToken,
    sink: Sender<Event>,
) -> Option<ExitStatus> {
    let label = Arc::clone(process.label());
    let name = process.spec().name().to_string();
    let group = process.group();

    sink.send(Event::Booting {
        label: Arc::clone(&label),
        command: process.spec().command().to_string(),
    })
    .await
    .ok();

    let stdout = process
        .take_stdout()
        .map(|out| tokio::spawn(pipe(out, Arc::clone(&label), Source::Stdout, sink.clone())));
    let stderr = process
        .take_stderr()
        .map(|err| tokio::spawn(pipe(err, Arc::clone(&label), Source::Stderr, sink.clone())));
    drop(sink);

    let status = match process.wait(kill.clone()).await {
        Ok(status) => Some(status),
        Err(err) => {
            warn!(process = %name, "failed to wait on process: {}", err);
            None
        }
    };

    let readers = join_all(stdout.into_iter().chain(stderr));
    for result in group.guard(&kill, readers).await {
        if let Err(err) = result {
            warn!(process = %name, "output reader failed: {}", err);
        }
    }
    group.release();

    info!(process = %name, "output drained");
    status
}

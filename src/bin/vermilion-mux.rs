// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{App, Arg, ArgMatches};
use tokio::runtime;
use tracing_subscriber::EnvFilter;

use vermilion_mux::config::{
    Config, ExitCodePolicy, RepeatSignalPolicy, DEFAULT_BUFFER, DEFAULT_SHELL,
};
use vermilion_mux::control::{await_termination, OsSignals, Shutdown};
use vermilion_mux::procfile;
use vermilion_mux::procs::Supervisor;
use vermilion_mux::Error;

const PROCFILE: &str = "PROCFILE";
const SHELL: &str = "shell";
const NO_COLOR: &str = "no-color";
const PAD: &str = "pad";
const EXIT_CODE: &str = "exit-code";
const ON_REPEAT_SIGNAL: &str = "on-repeat-signal";
const BUFFER: &str = "buffer";

fn app() -> App<'static, 'static> {
    App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name(PROCFILE)
                .required(true)
                .index(1)
                .help("file listing the processes to run, one `name: command` per line"),
        )
        .arg(
            Arg::with_name(SHELL)
                .long(SHELL)
                .value_name("PATH")
                .default_value(DEFAULT_SHELL)
                .help("shell used to run each command as `<shell> -c <command>`")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(NO_COLOR)
                .long(NO_COLOR)
                .help("do not color the process labels"),
        )
        .arg(
            Arg::with_name(PAD)
                .long(PAD)
                .help("pad the process labels to the longest name"),
        )
        .arg(
            Arg::with_name(EXIT_CODE)
                .long(EXIT_CODE)
                .value_name("POLICY")
                .possible_values(ExitCodePolicy::VALUES)
                .default_value("ignore")
                .help("`worst` exits with the highest exit code of any process")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(ON_REPEAT_SIGNAL)
                .long(ON_REPEAT_SIGNAL)
                .value_name("POLICY")
                .possible_values(RepeatSignalPolicy::VALUES)
                .default_value("kill")
                .help("what a second SIGINT or SIGTERM does while processes are stopping")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(BUFFER)
                .long(BUFFER)
                .value_name("LINES")
                .validator_os(|i| {
                    i.to_string_lossy()
                        .parse::<usize>()
                        .map(|_| ())
                        .map_err(|_| OsString::from("number was expected"))
                })
                .help("lines of output buffered before the processes are slowed down")
                .takes_value(true),
        )
}

fn config(args: &ArgMatches<'_>) -> Result<Config, Error> {
    let mut config = Config::default();

    if let Some(shell) = args.value_of_os(SHELL) {
        config.shell = PathBuf::from(shell);
    }
    if let Some(exit_code) = args.value_of(EXIT_CODE) {
        config.exit_code = exit_code.parse()?;
    }
    if let Some(policy) = args.value_of(ON_REPEAT_SIGNAL) {
        config.on_repeat_signal = policy.parse()?;
    }
    config.buffer = match args.value_of(BUFFER) {
        Some(buffer) => buffer
            .parse()
            .map_err(|_| format!("invalid buffer size: {}", buffer))?,
        None => DEFAULT_BUFFER,
    };
    config.color = !args.is_present(NO_COLOR);
    config.pad = args.is_present(PAD);

    Ok(config)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = app().get_matches();
    init_tracing();

    let procfile = PathBuf::from(args.value_of_os(PROCFILE).unwrap_or_default());
    let result = config(&args).and_then(|config| {
        let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
        runtime.block_on(run(procfile, config))
    });

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{}: {}", env!("CARGO_PKG_NAME"), err);
            std::process::exit(1);
        }
    }
}

async fn run(procfile: PathBuf, config: Config) -> Result<i32, Error> {
    let specs = procfile::load(&procfile).await?;

    // handlers must be in place before the first child starts
    let shutdown = Shutdown::new(config.on_repeat_signal);
    let signals = OsSignals::new()?;
    let coordinator = tokio::spawn(await_termination(signals, shutdown.clone()));

    let policy = config.exit_code;
    let supervisor = Supervisor::new(config);
    let result = supervisor
        .run(&specs, &shutdown, tokio::io::stdout())
        .await;
    coordinator.abort();

    let (report, _) = result?;
    Ok(report.exit_code(policy))
}

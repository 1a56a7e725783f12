// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Shutdown coordination
//!
//! A single [`Shutdown`] is created at startup and handed to everything that must stop when the
//!  supervisor is asked to terminate. Each child derives its own scope from it, so firing the
//!  shutdown reaches every child still attached.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RepeatSignalPolicy;

/// The effect of one termination request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// First request, all children were asked to terminate
    Terminate,
    /// Repeated request, all remaining children are being killed
    Kill,
    /// Repeated request with nothing left to escalate
    Ignored,
}

#[derive(Debug)]
struct Inner {
    terminate: CancellationToken,
    kill: CancellationToken,
    requests: AtomicUsize,
    policy: RepeatSignalPolicy,
}

/// Process wide cancellation scope
#[derive(Clone, Debug)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new(policy: RepeatSignalPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                terminate: CancellationToken::new(),
                kill: CancellationToken::new(),
                requests: AtomicUsize::new(0),
                policy,
            }),
        }
    }

    /// A scope for one child, cancelled when shutdown is triggered.
    ///
    /// Cancelling the returned token does not affect the shutdown or any sibling.
    pub fn scope(&self) -> CancellationToken {
        self.inner.terminate.child_token()
    }

    /// Cancelled when a repeated request escalates to killing children
    pub fn kill_scope(&self) -> CancellationToken {
        self.inner.kill.child_token()
    }

    /// Request termination of every child, see [`Trigger`].
    ///
    /// The terminate scope fires only on the first request. Later requests follow the
    ///  [`RepeatSignalPolicy`], escalating at most once.
    pub fn trigger(&self) -> Trigger {
        let previous = self.inner.requests.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            self.inner.terminate.cancel();
            return Trigger::Terminate;
        }

        match self.inner.policy {
            RepeatSignalPolicy::Kill if previous == 1 => {
                self.inner.kill.cancel();
                Trigger::Kill
            }
            _ => Trigger::Ignored,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.terminate.is_cancelled()
    }

    /// Number of termination requests received so far
    pub fn requests(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been triggered
    pub async fn triggered(&self) {
        self.inner.terminate.cancelled().await
    }
}

/// A stream of external termination requests
#[async_trait]
pub trait SignalSource: Send {
    /// Waits for the next request, returning its name, or `None` once no more can arrive
    async fn recv(&mut self) -> Option<&'static str>;
}

/// SIGINT and SIGTERM delivered to this process
pub struct OsSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl OsSignals {
    /// Registers the handlers, from here on neither signal terminates the process by default.
    ///
    /// Must be called from within the tokio runtime.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }
}

#[async_trait]
impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            sig = self.interrupt.recv() => sig.map(|()| "SIGINT"),
            sig = self.terminate.recv() => sig.map(|()| "SIGTERM"),
        }
    }
}

/// Fires `shutdown` for every request from `signals`, until the source is exhausted.
pub async fn await_termination<S: SignalSource>(mut signals: S, shutdown: Shutdown) {
    while let Some(name) = signals.recv().await {
        match shutdown.trigger() {
            Trigger::Terminate => info!("received {}, terminating all processes", name),
            Trigger::Kill => warn!("received {} again, killing all remaining processes", name),
            Trigger::Ignored => info!("received {}, shutdown already in progress", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    struct Injected(mpsc::Receiver<&'static str>);

    #[async_trait]
    impl SignalSource for Injected {
        async fn recv(&mut self) -> Option<&'static str> {
            self.0.recv().await
        }
    }

    #[test]
    fn test_fires_once() {
        let shutdown = Shutdown::new(RepeatSignalPolicy::Ignore);
        let scope = shutdown.scope();
        let kill = shutdown.kill_scope();

        assert!(!scope.is_cancelled());
        assert_eq!(shutdown.trigger(), Trigger::Terminate);
        assert!(scope.is_cancelled());
        assert_eq!(shutdown.trigger(), Trigger::Ignored);
        assert_eq!(shutdown.trigger(), Trigger::Ignored);
        assert!(!kill.is_cancelled());
        assert_eq!(shutdown.requests(), 3);
    }

    #[test]
    fn test_repeat_escalates_once() {
        let shutdown = Shutdown::new(RepeatSignalPolicy::Kill);
        let kill = shutdown.kill_scope();

        assert_eq!(shutdown.trigger(), Trigger::Terminate);
        assert!(!kill.is_cancelled());
        assert_eq!(shutdown.trigger(), Trigger::Kill);
        assert!(kill.is_cancelled());
        assert_eq!(shutdown.trigger(), Trigger::Ignored);
    }

    #[test]
    fn test_child_scope_is_isolated() {
        let shutdown = Shutdown::new(RepeatSignalPolicy::Ignore);
        let first = shutdown.scope();
        let second = shutdown.scope();

        first.cancel();
        assert!(!second.is_cancelled());
        assert!(!shutdown.is_triggered());

        // scopes created after the trigger start out cancelled
        shutdown.trigger();
        assert!(second.is_cancelled());
        assert!(shutdown.scope().is_cancelled());
    }

    #[tokio::test]
    async fn test_await_termination() {
        let shutdown = Shutdown::new(RepeatSignalPolicy::Kill);
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(await_termination(Injected(rx), shutdown.clone()));

        tx.send("SIGTERM").await.expect("send failed");
        shutdown.triggered().await;
        assert!(!shutdown.kill_scope().is_cancelled());

        tx.send("SIGINT").await.expect("send failed");
        drop(tx);
        task.await.expect("coordinator panicked");

        assert_eq!(shutdown.requests(), 2);
        assert!(shutdown.kill_scope().is_cancelled());
    }
}

//! Polling regeneration loop.
//!
//! [`Regenerator`] owns the [`WatchState`] and steps through one tick at a
//! time:
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//! Idle → CheckingStructural ──changed──→ FullRebuild ──┐    │
//!            │                                         ├→ Sleeping
//!            └──────unchanged──────→ IncrementalPass ──┘    │
//!                                                           │
//!         fatal error / stop signal ──→ Terminated ←────────┘
//! ```
//!
//! The structural inputs are the config file and the two layouts: a change
//! to any of them can affect every page, so it triggers a full rebuild.
//! Otherwise only pages and assets whose modification time changed are
//! regenerated.
//!
//! ## Error Policy
//!
//! | Error | First build | Later ticks |
//! |-------|-------------|-------------|
//! | config unreadable / invalid | terminate | log, skip tick |
//! | page unreadable (full rebuild) | terminate | log, retry next tick |
//! | page/asset unreadable (incremental) | n/a | log, skip entry (reported once) |
//! | missing asset, layout expansion failure | terminate | terminate |
//!
//! The loop never exits on its own otherwise. Stopping is cooperative: a
//! [`StopHandle`] wakes the sleep between ticks, and dropping every handle
//! stops the loop too.

use crate::config::BuildOptions;
use crate::generate::{self, Book, GenerateError, PassReport, RebuildReason, Skipped};
use crate::markdown::MarkdownTransformer;
use crate::tracker::{Tracked, WatchState, modified_time};
use std::io;
use std::mem;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Where the loop is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CheckingStructural,
    FullRebuild(RebuildReason),
    IncrementalPass,
    Sleeping,
    Terminated,
}

/// Drives generation passes for one book.
pub struct Regenerator<M> {
    options: BuildOptions,
    markdown: M,
    state: WatchState,
    phase: Phase,
    built: bool,
    last_skipped: Vec<Skipped>,
}

impl<M: MarkdownTransformer> Regenerator<M> {
    pub fn new(options: BuildOptions, markdown: M) -> Self {
        Self {
            options,
            markdown,
            state: WatchState::new(),
            phase: Phase::Idle,
            built: false,
            last_skipped: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Run one tick: check the structural inputs, then run a full rebuild
    /// or an incremental pass.
    ///
    /// Returns `Ok(None)` when the tick was skipped after a recoverable
    /// error, and `Err` only when the loop must terminate.
    pub fn tick(&mut self) -> Result<Option<PassReport>, GenerateError> {
        if self.phase == Phase::Terminated {
            return Ok(None);
        }
        self.phase = Phase::CheckingStructural;

        let book = match Book::load(&self.options) {
            Ok(book) => book,
            Err(e) => return self.recover(e.into()),
        };

        self.phase = match self.structural_change(&book) {
            Some(reason) => Phase::FullRebuild(reason),
            None => Phase::IncrementalPass,
        };
        log::debug!("tick: {:?}", self.phase);
        let result = match self.phase {
            Phase::FullRebuild(reason) => {
                generate::full_rebuild(&book, &mut self.state, &self.markdown, reason)
            }
            _ => generate::incremental_pass(&book, &mut self.state, &self.markdown),
        };

        match result {
            Ok(mut report) => {
                self.drop_repeated_skips(&mut report);
                self.built = true;
                self.phase = Phase::Sleeping;
                Ok(Some(report))
            }
            Err(e) => self.recover(e),
        }
    }

    /// Terminate on fatal errors and on anything before the first
    /// successful build; otherwise log and carry on next tick.
    fn recover(&mut self, error: GenerateError) -> Result<Option<PassReport>, GenerateError> {
        if error.is_fatal() || !self.built {
            self.phase = Phase::Terminated;
            return Err(error);
        }
        log::error!("{error}; retrying in {:?}", self.options.interval);
        self.phase = Phase::Sleeping;
        Ok(None)
    }

    /// An entry that stays unreadable is reported on the pass where it
    /// first fails and again only when the failure changes.
    fn drop_repeated_skips(&mut self, report: &mut PassReport) {
        let skipped = mem::take(&mut report.skipped);
        for entry in &skipped {
            if self.last_skipped.contains(entry) {
                log::debug!("still skipping {}", entry.source);
            } else {
                log::warn!("skipping {}: {}", entry.source, entry.reason);
                report.skipped.push(entry.clone());
            }
        }
        self.last_skipped = skipped;
    }

    fn structural_change(&self, book: &Book) -> Option<RebuildReason> {
        if self.state.recorded(Tracked::Config).is_none() {
            return Some(RebuildReason::Initial);
        }
        // `None` marks a layout that is not configured, and so not tracked.
        let candidates = [
            (Tracked::Config, Some(book.config_stamp), RebuildReason::ConfigChanged),
            (
                Tracked::PageLayout,
                book.paths.page_layout.as_deref().map(modified_time),
                RebuildReason::PageLayoutChanged,
            ),
            (
                Tracked::IndexLayout,
                book.paths.index_layout.as_deref().map(modified_time),
                RebuildReason::IndexLayoutChanged,
            ),
        ];
        candidates.into_iter().find_map(|(target, stamp, reason)| {
            self.state.has_changed(target, stamp?).then(|| {
                log::debug!("{target} changed");
                reason
            })
        })
    }

    /// Tick until stopped or a fatal error, sleeping `options.interval`
    /// between ticks. `on_pass` sees every completed pass.
    pub fn run(
        &mut self,
        stop: &StopSignal,
        mut on_pass: impl FnMut(&PassReport),
    ) -> Result<(), GenerateError> {
        log::debug!(
            "watching {} pages and assets every {:?}",
            self.state.tracked_files(),
            self.options.interval
        );
        loop {
            if let Some(report) = self.tick()? {
                on_pass(&report);
            }
            if stop.sleep(self.options.interval) {
                log::debug!("watch loop stopped");
                self.phase = Phase::Terminated;
                return Ok(());
            }
        }
    }
}

/// Create a connected stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = mpsc::channel();
    (StopHandle(tx), StopSignal(rx))
}

/// Requests the watch loop to stop. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopHandle(Sender<()>);

impl StopHandle {
    pub fn stop(&self) {
        // The loop may already be gone; nothing left to stop then.
        let _ = self.0.send(());
    }
}

/// The loop's end of the stop channel.
#[derive(Debug)]
pub struct StopSignal(Receiver<()>);

impl StopSignal {
    /// Sleep for `duration` or until stopped. Returns true when stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        match self.0.recv_timeout(duration) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

/// A watch loop running on its own thread.
pub struct WatchTask {
    stop: StopHandle,
    handle: JoinHandle<Result<(), GenerateError>>,
}

impl WatchTask {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to end and return its result.
    pub fn join(self) -> Result<(), GenerateError> {
        let WatchTask { stop, handle } = self;
        let result = handle.join();
        drop(stop);
        match result {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Move `regenerator` onto a new thread and run it until stopped.
pub fn spawn<M>(
    mut regenerator: Regenerator<M>,
    on_pass: impl FnMut(&PassReport) + Send + 'static,
) -> io::Result<WatchTask>
where
    M: MarkdownTransformer + Send + 'static,
{
    let (stop, signal) = stop_channel();
    let handle = thread::Builder::new()
        .name("watch".into())
        .spawn(move || regenerator.run(&signal, on_pass))?;
    Ok(WatchTask { stop, handle })
}

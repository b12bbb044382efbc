//! Scan coordinator.
//!
//! Owns the store, the capture session and the decoder. A UI-thread timer
//! calls [`Scanner::poll`]; each due tick decodes the current frame and, on a
//! result that differs from the one shown, runs the side effects in order:
//! show, clipboard, sound, persist, refresh history.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use log::{error, info, trace};

use crate::capture::{Session, Waker};
use crate::decode::{Decoder, Polygon, Pos};
use crate::error::{CaptureError, StoreError};
use crate::store::{ScanRecord, ScanStore};

/// UI-side effects of a new scan. Called on the UI thread.
pub trait ScanEffects {
    fn show_result(&mut self, text: &str);
    fn copy_to_clipboard(&mut self, text: &str);
    fn play_sound(&mut self, text: &str);
    fn refresh_history(&mut self, records: Vec<ScanRecord>);
    fn store_failed(&mut self, err: &StoreError);
}

#[derive(Debug, PartialEq, Eq)]
pub enum Tick {
    NoFrame,
    NoSymbol,
    /// Same text as the one already shown.
    Repeat,
    Recorded(ScanRecord),
    StoreFailed,
}

/// Fixed-interval timer polled from the UI loop.
#[derive(Debug)]
pub struct ScanTimer {
    interval: Duration,
    next: Option<Instant>,
}

impl ScanTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    /// True at most once per interval; missed ticks are not replayed.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if now >= next => {
                self.next = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.next.map(|next| next.saturating_duration_since(now))
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub struct Scanner {
    store: ScanStore,
    session: Session,
    decoder: Box<dyn Decoder>,
    timer: ScanTimer,
    /// Text in the result field; starts empty, so an empty payload is never recorded.
    shown: String,
    overlay: Option<Polygon>,
    clock: fn() -> NaiveDateTime,
}

impl Scanner {
    pub fn new(
        store: ScanStore,
        session: Session,
        decoder: Box<dyn Decoder>,
        interval: Duration,
    ) -> Self {
        Scanner {
            store,
            session,
            decoder,
            timer: ScanTimer::new(interval),
            shown: String::new(),
            overlay: None,
            clock: local_now,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn store(&self) -> &ScanStore {
        &self.store
    }

    #[cfg(test)]
    pub fn shown(&self) -> &str {
        &self.shown
    }

    pub fn overlay(&self) -> Option<&[Pos]> {
        self.overlay.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Stopped -> Running: open the selected camera, then start the timer.
    pub fn start(&mut self, waker: Waker, now: Instant) -> Result<(), CaptureError> {
        self.session.start(waker)?;
        self.timer.start(now);
        Ok(())
    }

    /// Running -> Stopped: timer first, then wait for the device to halt.
    pub fn stop(&mut self) {
        self.timer.stop();
        self.session.stop();
        self.overlay = None;
    }

    pub fn toggle(&mut self, waker: Waker, now: Instant) -> Result<(), CaptureError> {
        if self.is_running() {
            self.stop();
            Ok(())
        } else {
            self.start(waker, now)
        }
    }

    /// Runs a tick when the timer is due.
    pub fn poll(&mut self, now: Instant, effects: &mut dyn ScanEffects) -> Option<Tick> {
        if self.timer.due(now) {
            Some(self.tick(effects))
        } else {
            None
        }
    }

    pub fn next_tick_in(&self, now: Instant) -> Option<Duration> {
        self.timer.remaining(now)
    }

    pub fn tick(&mut self, effects: &mut dyn ScanEffects) -> Tick {
        let Some(frame) = self.session.current_frame() else {
            return Tick::NoFrame;
        };

        let Some(detection) = self.decoder.decode(&frame.image) else {
            trace!("frame {}: nothing found", frame.seq);
            self.overlay = None;
            return Tick::NoSymbol;
        };

        self.overlay = Some(detection.polygon);
        let text = detection.text;
        if self.shown == text {
            return Tick::Repeat;
        }

        effects.show_result(&text);
        effects.copy_to_clipboard(&text);
        effects.play_sound(&text);
        self.shown = text.clone();

        match self.store.append(&text, (self.clock)()) {
            Ok(record) => {
                info!("recorded scan #{}: {}", record.id, record.text);
                match self.store.history() {
                    Ok(history) => effects.refresh_history(history),
                    Err(e) => effects.store_failed(&e),
                }
                Tick::Recorded(record)
            }
            Err(e) => {
                error!("failed to record scan: {e}");
                effects.store_failed(&e);
                Tick::StoreFailed
            }
        }
    }

    pub fn history(&self) -> Result<Vec<ScanRecord>, StoreError> {
        self.store.history()
    }
}

//! Rolling window of precomputed position frames.
//!
//! The viewer shows the front frame and drops it once a newer frame becomes
//! due. When the buffer runs low a single batch continuing from the last
//! buffered instant is requested; results tagged with an older generation
//! (computed from a replaced TLE set) are discarded.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::config::GlobeConfig;
use crate::orbit::Frame;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefillRequest {
    pub start: DateTime<Utc>,
    pub count: usize,
    pub step: Duration,
    pub generation: u64,
}

pub struct PositionWindow {
    frames: VecDeque<Frame>,
    refill_in_flight: bool,
    generation: u64,
    frames_per_batch: usize,
    refill_threshold: usize,
    lead: Duration,
    step: Duration,
}

impl PositionWindow {
    pub fn new(config: &GlobeConfig) -> Self {
        Self {
            frames: VecDeque::new(),
            refill_in_flight: false,
            generation: 0,
            frames_per_batch: config.frames_per_batch,
            refill_threshold: config.refill_threshold,
            lead: config.lead(),
            step: config.step(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_refilling(&self) -> bool {
        self.refill_in_flight
    }

    pub fn current(&self) -> Option<&Frame> {
        self.frames.front()
    }

    pub fn buffered_until(&self) -> Option<DateTime<Utc>> {
        self.frames.back().map(|f| f.at)
    }

    /// Drops frames that have been superseded by a later frame due at or
    /// before `now`. Returns true when the front frame changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let due = self.frames.iter().take_while(|f| f.at <= now).count();
        let drop = due.saturating_sub(1);
        self.frames.drain(..drop);
        drop > 0
    }

    pub fn needs_refill(&self) -> bool {
        !self.refill_in_flight && self.frames.len() < self.refill_threshold
    }

    /// Continues after the last buffered frame, or starts `lead` after `now`
    /// when the buffer is empty or has fallen behind.
    pub fn next_batch_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let fresh = now + self.lead;
        match self.buffered_until() {
            Some(last) if last + self.step >= now => last + self.step,
            _ => fresh,
        }
    }

    pub fn begin_refill(&mut self, now: DateTime<Utc>) -> RefillRequest {
        self.refill_in_flight = true;
        RefillRequest {
            start: self.next_batch_start(now),
            count: self.frames_per_batch,
            step: self.step,
            generation: self.generation,
        }
    }

    /// Appends frames later than the last buffered one. Returns the number
    /// of frames kept; a result for an outdated generation keeps none.
    pub fn complete_refill(&mut self, generation: u64, frames: Vec<Frame>) -> usize {
        if generation != self.generation {
            log::debug!("Discarding batch for generation {} (now {})", generation, self.generation);
            return 0;
        }
        self.refill_in_flight = false;
        let mut kept = 0;
        for frame in frames {
            if self.buffered_until().is_some_and(|last| frame.at <= last) {
                continue;
            }
            self.frames.push_back(frame);
            kept += 1;
        }
        kept
    }

    /// Switches to a new satellite set. Batches already in flight are
    /// ignored when they arrive. Buffered frames stay on screen and the next
    /// batch, computed from the new set, continues after them.
    pub fn reset(&mut self) {
        self.refill_in_flight = false;
        self.generation = self.generation.wrapping_add(1);
    }
}

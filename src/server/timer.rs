//! Idle-connection expiry on a hashed timer wheel.

use std::time::{Duration, Instant};

use mio::Token;

const WHEEL_SIZE: usize = 64;
const WHEEL_MASK: usize = WHEEL_SIZE - 1;
const SLOT_DURATION: Duration = Duration::from_secs(1);

/// Schedules `(token, generation)` pairs to fire after the idle timeout.
///
/// The wheel spans 63 seconds. An entry whose connection is not yet due when
/// it fires goes back on the wheel for the remaining time, so each
/// connection needs a single entry however long the timeout is.
pub struct IdleTimer {
    slots: Vec<Vec<(Token, u64)>>,
    cursor: usize,
    last_tick: Instant,
    timeout: Duration,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self::starting_at(timeout, Instant::now())
    }

    pub fn starting_at(timeout: Duration, now: Instant) -> Self {
        Self {
            slots: vec![Vec::new(); WHEEL_SIZE],
            cursor: 0,
            last_tick: now,
            timeout,
        }
    }

    /// Schedules a connection to fire after the full idle timeout.
    pub fn touch(&mut self, token: Token, generation: u64) {
        self.schedule_in(token, generation, self.timeout);
    }

    /// Schedules a connection to fire once `delay` has passed, or after one
    /// full turn of the wheel if that comes first.
    pub fn schedule_in(&mut self, token: Token, generation: u64, delay: Duration) {
        let ticks = (delay.as_secs() as usize + 1).min(WHEEL_MASK);
        let slot = (self.cursor + ticks) & WHEEL_MASK;
        self.slots[slot].push((token, generation));
    }

    /// Advances to `now` and collects the connections past their deadline.
    ///
    /// `deadline_of` returns the current deadline of a live connection with
    /// the given generation, or `None` once it is gone. Entries that fire
    /// early are rescheduled for the time left.
    pub fn expire<F>(&mut self, now: Instant, deadline_of: F, out: &mut Vec<Token>)
    where
        F: Fn(Token, u64) -> Option<Instant>,
    {
        let mut fired = Vec::new();
        self.advance(now, &mut fired);
        for (token, generation) in fired {
            match deadline_of(token, generation) {
                Some(deadline) if deadline <= now => out.push(token),
                Some(deadline) => self.schedule_in(token, generation, deadline - now),
                None => {}
            }
        }
    }

    /// Moves the wheel to `now` and collects the entries that came due.
    pub fn advance(&mut self, now: Instant, out: &mut Vec<(Token, u64)>) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = ((elapsed.as_millis() / SLOT_DURATION.as_millis()) as usize).min(WHEEL_SIZE);
        if ticks == 0 {
            return;
        }
        for _ in 0..ticks {
            self.cursor = (self.cursor + 1) & WHEEL_MASK;
            out.append(&mut self.slots[self.cursor]);
        }
        self.last_tick += SLOT_DURATION * ticks as u32;
    }
}

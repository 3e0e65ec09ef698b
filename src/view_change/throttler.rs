/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::time::{Duration, Instant};

use crate::types::data_types::ViewNumber;

/// Rate limits the sending of instance change votes.
///
/// The first vote for a view higher than any before is always allowed. Further votes for the same view
/// are allowed after a delay that starts at `base` and doubles after every allowed vote, up to `max`.
/// Votes for a view lower than the highest one voted for are never allowed.
pub struct InstanceChangeThrottler {
    base: Duration,
    max: Duration,
    view_no: Option<ViewNumber>,
    delay: Duration,
    next_allowed: Option<Instant>,
}

impl InstanceChangeThrottler {
    pub fn new(base: Duration, max: Duration) -> InstanceChangeThrottler {
        InstanceChangeThrottler {
            base,
            max: max.max(base),
            view_no: None,
            delay: base,
            next_allowed: None,
        }
    }

    /// Whether a vote for `view_no` may be sent at `now`. If so, the throttle is advanced.
    pub fn acquire(&mut self, view_no: ViewNumber, now: Instant) -> bool {
        match self.view_no {
            Some(current) if view_no < current => false,
            Some(current) if view_no == current => match self.next_allowed {
                Some(next_allowed) if now < next_allowed => false,
                _ => {
                    self.delay = (self.delay * 2).min(self.max);
                    self.next_allowed = Some(now + self.delay);
                    true
                }
            },
            _ => {
                self.view_no = Some(view_no);
                self.delay = self.base;
                self.next_allowed = Some(now + self.base);
                true
            }
        }
    }
}

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The view change state machine.
//!
//! ```text
//!            quorum of votes for V + 1            primaries decided for V + 1
//! Normal(V) ----------------------> ChangeInProgress(V + 1) -------------------> Normal(V + 1)
//!     |                                 ^        |
//!     | own vote for V + 1              |        | timeout
//!     v                                 |        v
//! ChangeProposed(V + 1) ----------------+    ChangeProposed(V + 2)
//! ```
//!
//! The controller decides and records. It does not own the replicas, the selector, or the catch-up
//! coordinator: the node carries out the consequences of each transition.

use std::time::{Duration, Instant};

use ed25519_dalek::VerifyingKey;

use crate::{
    errors::NodeError,
    networking::messages::InstanceChange,
    types::{data_types::ViewNumber, suspicion::SuspicionCode},
};

use super::{
    instance_change::{InstanceChangeVote, InstanceChangeVotes},
    throttler::InstanceChangeThrottler,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewChangeState {
    /// The view is stable.
    Normal,
    /// This node voted to move to the view.
    ChangeProposed(ViewNumber),
    /// The view was entered and its primaries are not yet decided.
    ChangeInProgress { view_no: ViewNumber, deadline: Instant },
}

pub struct ViewChangeController {
    me: VerifyingKey,
    view_no: ViewNumber,
    state: ViewChangeState,
    in_progress: bool,
    votes: InstanceChangeVotes,
    throttler: InstanceChangeThrottler,
    instance_change_timeout: Duration,
}

impl ViewChangeController {
    pub fn new(
        me: VerifyingKey,
        view_no: ViewNumber,
        instance_change_timeout: Duration,
        throttler: InstanceChangeThrottler,
    ) -> ViewChangeController {
        ViewChangeController {
            me,
            view_no,
            state: ViewChangeState::Normal,
            in_progress: false,
            votes: InstanceChangeVotes::new(),
            throttler,
            instance_change_timeout,
        }
    }

    pub fn view_no(&self) -> ViewNumber {
        self.view_no
    }

    pub fn state(&self) -> ViewChangeState {
        self.state
    }

    /// Whether a view change was started and its primaries are not yet decided.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn votes(&self) -> &InstanceChangeVotes {
        &self.votes
    }

    /// Vote to move to `view_no`. Returns the message to broadcast, or `None` if the vote is for a view
    /// that is not ahead of ours or the throttle does not allow it yet.
    pub fn send_instance_change(
        &mut self,
        view_no: ViewNumber,
        code: SuspicionCode,
        now: Instant,
    ) -> Option<InstanceChange> {
        if view_no <= self.view_no {
            log::debug!("Not voting for view {} while in view {}", view_no, self.view_no);
            return None;
        }
        if !self.throttler.acquire(view_no, now) {
            log::debug!("Instance change for view {} throttled", view_no);
            return None;
        }

        self.votes.add(InstanceChangeVote {
            view_no,
            voter: self.me,
            code,
        });
        if !matches!(self.state, ViewChangeState::ChangeProposed(proposed) if proposed >= view_no) {
            self.state = ViewChangeState::ChangeProposed(view_no);
        }
        log::info!("Voting for view {}: {}", view_no, code);
        Some(InstanceChange { view_no, code })
    }

    /// Record a peer's vote.
    pub fn process_instance_change(
        &mut self,
        msg: &InstanceChange,
        from: VerifyingKey,
    ) -> Result<(), NodeError> {
        if msg.view_no <= self.view_no {
            return Err(NodeError::Stale {
                reason: format!(
                    "instance change for view {} received in view {}",
                    msg.view_no, self.view_no
                ),
            });
        }
        self.votes.add(InstanceChangeVote {
            view_no: msg.view_no,
            voter: from,
            code: msg.code,
        });
        Ok(())
    }

    /// Whether `quorum` distinct nodes, ourselves included, voted for `proposed_view` and it is ahead
    /// of the current view.
    pub fn can_view_change(&self, proposed_view: ViewNumber, quorum: usize) -> bool {
        proposed_view > self.view_no && self.votes.has_quorum(proposed_view, quorum)
    }

    /// Enter `proposed_view`. Returns the deadline by which the view change must complete.
    pub fn start_view_change(&mut self, proposed_view: ViewNumber, now: Instant) -> Instant {
        let deadline = now + self.instance_change_timeout;
        log::info!("Starting view change to view {}", proposed_view);
        self.view_no = proposed_view;
        self.in_progress = true;
        self.state = ViewChangeState::ChangeInProgress {
            view_no: proposed_view,
            deadline,
        };
        deadline
    }

    /// Called when the completion timeout of the view change to `view_no` fires. Returns the view to
    /// propose next if the view change has not completed.
    pub fn check_view_change_completed(&self, view_no: ViewNumber) -> Option<ViewNumber> {
        if self.in_progress && self.view_no == view_no {
            log::warn!("View change to view {} did not complete in time", view_no);
            Some(view_no + 1)
        } else {
            None
        }
    }

    /// The primaries of `view_no` were decided.
    pub fn on_view_change_complete(&mut self, view_no: ViewNumber) {
        if view_no != self.view_no {
            log::debug!("Ignoring completion of view {} in view {}", view_no, self.view_no);
            return;
        }
        self.in_progress = false;
        if !matches!(self.state, ViewChangeState::ChangeProposed(proposed) if proposed > view_no) {
            self.state = ViewChangeState::Normal;
        }
        self.votes.discard_below(view_no);
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;

    fn controller(me: VerifyingKey) -> ViewChangeController {
        ViewChangeController::new(
            me,
            ViewNumber::new(0),
            Duration::from_secs(60),
            InstanceChangeThrottler::new(Duration::from_secs(1), Duration::from_secs(8)),
        )
    }

    #[test]
    fn quorum_of_votes_enables_view_change_test() {
        let nodes: Vec<VerifyingKey> = (0..4)
            .map(|_| SigningKey::generate(&mut OsRng).verifying_key())
            .collect();
        let now = Instant::now();
        let mut controller = controller(nodes[0]);
        let view_1 = ViewNumber::new(1);

        // 1. Our own vote.
        assert!(controller
            .send_instance_change(view_1, SuspicionCode::PrimaryDegraded, now)
            .is_some());
        assert_eq!(controller.state(), ViewChangeState::ChangeProposed(view_1));
        assert!(!controller.can_view_change(view_1, 3));

        // 2. A repeated vote by the same peer counts once.
        let msg = InstanceChange {
            view_no: view_1,
            code: SuspicionCode::PrimaryDegraded,
        };
        controller.process_instance_change(&msg, nodes[1]).unwrap();
        controller.process_instance_change(&msg, nodes[1]).unwrap();
        assert!(!controller.can_view_change(view_1, 3));

        // 3. The third distinct vote reaches the quorum.
        controller.process_instance_change(&msg, nodes[2]).unwrap();
        assert!(controller.can_view_change(view_1, 3));
        assert!(!controller.can_view_change(ViewNumber::new(0), 3));

        // 4. Start, then time out.
        controller.start_view_change(view_1, now);
        assert!(controller.is_in_progress());
        assert!(!controller.can_view_change(view_1, 3));
        assert_eq!(controller.check_view_change_completed(view_1), Some(ViewNumber::new(2)));

        // 5. Complete.
        controller.on_view_change_complete(view_1);
        assert!(!controller.is_in_progress());
        assert_eq!(controller.state(), ViewChangeState::Normal);
        assert_eq!(controller.check_view_change_completed(view_1), None);
        assert!(controller.process_instance_change(&msg, nodes[3]).is_err());
    }
}

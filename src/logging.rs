/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the node's
//! [config](crate::config::Configuration).
//!
//! The node logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveInstanceChange](crate::events::ReceiveInstanceChangeEvent) is printed:
//!
//! ```text
//! ReceiveInstanceChange, 1701329264, Id5u7f6, 3, 25
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the verifying key of the
//!   node that sent the vote.
//! - The fourth value is the view the vote is for.
//! - The fifth value is the numeric suspicion code of the vote.

use crate::events::*;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const CHANGE_MODE: &str = "ChangeMode";
pub const CHANGE_STATUS: &str = "ChangeStatus";

pub const START_CATCHUP: &str = "StartCatchup";
pub const END_CATCHUP: &str = "EndCatchup";

pub const EXECUTE_BATCH: &str = "ExecuteBatch";
pub const SEND_REPLY: &str = "SendReply";

pub const SEND_INSTANCE_CHANGE: &str = "SendInstanceChange";
pub const RECEIVE_INSTANCE_CHANGE: &str = "ReceiveInstanceChange";
pub const START_VIEW_CHANGE: &str = "StartViewChange";
pub const COMPLETE_VIEW_CHANGE: &str = "CompleteViewChange";
pub const SELECT_PRIMARY: &str = "SelectPrimary";
pub const ADJUST_REPLICAS: &str = "AdjustReplicas";

pub const SUSPICION: &str = "Suspicion";
pub const BLACKLIST_CLIENT: &str = "BlacklistClient";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for ChangeModeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |change_mode_event: &ChangeModeEvent| {
            log::info!(
                "{}, {}, {}",
                CHANGE_MODE,
                secs_since_unix_epoch(change_mode_event.timestamp),
                change_mode_event.mode
            )
        };
        Box::new(logger)
    }
}

impl Logger for ChangeStatusEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |change_status_event: &ChangeStatusEvent| {
            log::info!(
                "{}, {}, {:?}",
                CHANGE_STATUS,
                secs_since_unix_epoch(change_status_event.timestamp),
                change_status_event.status
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartCatchupEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_catchup_event: &StartCatchupEvent| {
            log::info!(
                "{}, {}, {}",
                START_CATCHUP,
                secs_since_unix_epoch(start_catchup_event.timestamp),
                start_catchup_event.ledger_id
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndCatchupEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_catchup_event: &EndCatchupEvent| {
            log::info!(
                "{}, {}, {}, {}",
                END_CATCHUP,
                secs_since_unix_epoch(end_catchup_event.timestamp),
                end_catchup_event.ledger_id,
                end_catchup_event.txns_applied
            )
        };
        Box::new(logger)
    }
}

impl Logger for ExecuteBatchEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |execute_batch_event: &ExecuteBatchEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                EXECUTE_BATCH,
                secs_since_unix_epoch(execute_batch_event.timestamp),
                execute_batch_event.ledger_id,
                execute_batch_event.key.view_no,
                execute_batch_event.key.pp_seq_no,
                execute_batch_event.first_seq_no,
                execute_batch_event.txn_count
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendReplyEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_reply_event: &SendReplyEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                SEND_REPLY,
                secs_since_unix_epoch(send_reply_event.timestamp),
                first_seven_base64_chars(&send_reply_event.request.identifier.bytes()),
                send_reply_event.request.req_id.int(),
                send_reply_event.ledger_id,
                send_reply_event.seq_no
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendInstanceChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_instance_change_event: &SendInstanceChangeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SEND_INSTANCE_CHANGE,
                secs_since_unix_epoch(send_instance_change_event.timestamp),
                send_instance_change_event.view_no,
                send_instance_change_event.code.code()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveInstanceChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_instance_change_event: &ReceiveInstanceChangeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_INSTANCE_CHANGE,
                secs_since_unix_epoch(receive_instance_change_event.timestamp),
                first_seven_base64_chars(&receive_instance_change_event.origin.to_bytes()),
                receive_instance_change_event.view_no,
                receive_instance_change_event.code.code()
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartViewChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_view_change_event: &StartViewChangeEvent| {
            log::info!(
                "{}, {}, {}",
                START_VIEW_CHANGE,
                secs_since_unix_epoch(start_view_change_event.timestamp),
                start_view_change_event.view_no
            )
        };
        Box::new(logger)
    }
}

impl Logger for CompleteViewChangeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |complete_view_change_event: &CompleteViewChangeEvent| {
            log::info!(
                "{}, {}, {}",
                COMPLETE_VIEW_CHANGE,
                secs_since_unix_epoch(complete_view_change_event.timestamp),
                complete_view_change_event.view_no
            )
        };
        Box::new(logger)
    }
}

impl Logger for SelectPrimaryEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |select_primary_event: &SelectPrimaryEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                SELECT_PRIMARY,
                secs_since_unix_epoch(select_primary_event.timestamp),
                select_primary_event.inst_id,
                select_primary_event.view_no,
                first_seven_base64_chars(&select_primary_event.primary.to_bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for AdjustReplicasEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |adjust_replicas_event: &AdjustReplicasEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ADJUST_REPLICAS,
                secs_since_unix_epoch(adjust_replicas_event.timestamp),
                adjust_replicas_event.delta,
                adjust_replicas_event.count
            )
        };
        Box::new(logger)
    }
}

impl Logger for SuspicionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |suspicion_event: &SuspicionEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SUSPICION,
                secs_since_unix_epoch(suspicion_event.timestamp),
                first_seven_base64_chars(&suspicion_event.node.to_bytes()),
                suspicion_event.code.code()
            )
        };
        Box::new(logger)
    }
}

impl Logger for BlacklistClientEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |blacklist_client_event: &BlacklistClientEvent| {
            log::info!(
                "{}, {}, {}",
                BLACKLIST_CLIENT,
                secs_since_unix_epoch(blacklist_client_event.timestamp),
                first_seven_base64_chars(&blacklist_client_event.identifier.bytes())
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

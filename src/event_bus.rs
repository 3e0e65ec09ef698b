/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives events published by the node and fires the handlers registered for them.

use crate::events::*;
use crate::logging::Logger;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// The handlers registered for each kind of event: the default logger (if logging is enabled) followed
/// by the user's handler (if one was provided).
#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) change_mode_handlers: Vec<HandlerPtr<ChangeModeEvent>>,
    pub(crate) change_status_handlers: Vec<HandlerPtr<ChangeStatusEvent>>,
    pub(crate) start_catchup_handlers: Vec<HandlerPtr<StartCatchupEvent>>,
    pub(crate) end_catchup_handlers: Vec<HandlerPtr<EndCatchupEvent>>,
    pub(crate) execute_batch_handlers: Vec<HandlerPtr<ExecuteBatchEvent>>,
    pub(crate) send_reply_handlers: Vec<HandlerPtr<SendReplyEvent>>,
    pub(crate) send_instance_change_handlers: Vec<HandlerPtr<SendInstanceChangeEvent>>,
    pub(crate) receive_instance_change_handlers: Vec<HandlerPtr<ReceiveInstanceChangeEvent>>,
    pub(crate) start_view_change_handlers: Vec<HandlerPtr<StartViewChangeEvent>>,
    pub(crate) complete_view_change_handlers: Vec<HandlerPtr<CompleteViewChangeEvent>>,
    pub(crate) select_primary_handlers: Vec<HandlerPtr<SelectPrimaryEvent>>,
    pub(crate) adjust_replicas_handlers: Vec<HandlerPtr<AdjustReplicasEvent>>,
    pub(crate) suspicion_handlers: Vec<HandlerPtr<SuspicionEvent>>,
    pub(crate) blacklist_client_handlers: Vec<HandlerPtr<BlacklistClientEvent>>,
}

// Push the logger of `$event` if logging is enabled, then the user's handler if there is one.
macro_rules! register {
    ($handlers:expr, $log_events:expr, $event:ty, $user_handler:expr) => {
        if $log_events {
            $handlers.push(<$event>::get_logger());
        }
        if let Some(handler) = $user_handler {
            $handlers.push(handler);
        }
    };
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        on_change_mode: Option<HandlerPtr<ChangeModeEvent>>,
        on_change_status: Option<HandlerPtr<ChangeStatusEvent>>,
        on_start_catchup: Option<HandlerPtr<StartCatchupEvent>>,
        on_end_catchup: Option<HandlerPtr<EndCatchupEvent>>,
        on_execute_batch: Option<HandlerPtr<ExecuteBatchEvent>>,
        on_send_reply: Option<HandlerPtr<SendReplyEvent>>,
        on_send_instance_change: Option<HandlerPtr<SendInstanceChangeEvent>>,
        on_receive_instance_change: Option<HandlerPtr<ReceiveInstanceChangeEvent>>,
        on_start_view_change: Option<HandlerPtr<StartViewChangeEvent>>,
        on_complete_view_change: Option<HandlerPtr<CompleteViewChangeEvent>>,
        on_select_primary: Option<HandlerPtr<SelectPrimaryEvent>>,
        on_adjust_replicas: Option<HandlerPtr<AdjustReplicasEvent>>,
        on_suspicion: Option<HandlerPtr<SuspicionEvent>>,
        on_blacklist_client: Option<HandlerPtr<BlacklistClientEvent>>,
    ) -> EventHandlers {
        let mut handlers = EventHandlers::default();
        register!(handlers.change_mode_handlers, log_events, ChangeModeEvent, on_change_mode);
        register!(handlers.change_status_handlers, log_events, ChangeStatusEvent, on_change_status);
        register!(handlers.start_catchup_handlers, log_events, StartCatchupEvent, on_start_catchup);
        register!(handlers.end_catchup_handlers, log_events, EndCatchupEvent, on_end_catchup);
        register!(handlers.execute_batch_handlers, log_events, ExecuteBatchEvent, on_execute_batch);
        register!(handlers.send_reply_handlers, log_events, SendReplyEvent, on_send_reply);
        register!(
            handlers.send_instance_change_handlers,
            log_events,
            SendInstanceChangeEvent,
            on_send_instance_change
        );
        register!(
            handlers.receive_instance_change_handlers,
            log_events,
            ReceiveInstanceChangeEvent,
            on_receive_instance_change
        );
        register!(
            handlers.start_view_change_handlers,
            log_events,
            StartViewChangeEvent,
            on_start_view_change
        );
        register!(
            handlers.complete_view_change_handlers,
            log_events,
            CompleteViewChangeEvent,
            on_complete_view_change
        );
        register!(handlers.select_primary_handlers, log_events, SelectPrimaryEvent, on_select_primary);
        register!(handlers.adjust_replicas_handlers, log_events, AdjustReplicasEvent, on_adjust_replicas);
        register!(handlers.suspicion_handlers, log_events, SuspicionEvent, on_suspicion);
        register!(
            handlers.blacklist_client_handlers,
            log_events,
            BlacklistClientEvent,
            on_blacklist_client
        );
        handlers
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.change_mode_handlers.is_empty()
            && self.change_status_handlers.is_empty()
            && self.start_catchup_handlers.is_empty()
            && self.end_catchup_handlers.is_empty()
            && self.execute_batch_handlers.is_empty()
            && self.send_reply_handlers.is_empty()
            && self.send_instance_change_handlers.is_empty()
            && self.receive_instance_change_handlers.is_empty()
            && self.start_view_change_handlers.is_empty()
            && self.complete_view_change_handlers.is_empty()
            && self.select_primary_handlers.is_empty()
            && self.adjust_replicas_handlers.is_empty()
            && self.suspicion_handlers.is_empty()
            && self.blacklist_client_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::ChangeMode(change_mode_event) =>
                self.change_mode_handlers.iter().for_each(|handler| handler(&change_mode_event)),

            Event::ChangeStatus(change_status_event) =>
                self.change_status_handlers.iter().for_each(|handler| handler(&change_status_event)),

            Event::StartCatchup(start_catchup_event) =>
                self.start_catchup_handlers.iter().for_each(|handler| handler(&start_catchup_event)),

            Event::EndCatchup(end_catchup_event) =>
                self.end_catchup_handlers.iter().for_each(|handler| handler(&end_catchup_event)),

            Event::ExecuteBatch(execute_batch_event) =>
                self.execute_batch_handlers.iter().for_each(|handler| handler(&execute_batch_event)),

            Event::SendReply(send_reply_event) =>
                self.send_reply_handlers.iter().for_each(|handler| handler(&send_reply_event)),

            Event::SendInstanceChange(send_instance_change_event) =>
                self.send_instance_change_handlers.iter().for_each(|handler| handler(&send_instance_change_event)),

            Event::ReceiveInstanceChange(receive_instance_change_event) =>
                self.receive_instance_change_handlers.iter().for_each(|handler| handler(&receive_instance_change_event)),

            Event::StartViewChange(start_view_change_event) =>
                self.start_view_change_handlers.iter().for_each(|handler| handler(&start_view_change_event)),

            Event::CompleteViewChange(complete_view_change_event) =>
                self.complete_view_change_handlers.iter().for_each(|handler| handler(&complete_view_change_event)),

            Event::SelectPrimary(select_primary_event) =>
                self.select_primary_handlers.iter().for_each(|handler| handler(&select_primary_event)),

            Event::AdjustReplicas(adjust_replicas_event) =>
                self.adjust_replicas_handlers.iter().for_each(|handler| handler(&adjust_replicas_event)),

            Event::Suspicion(suspicion_event) =>
                self.suspicion_handlers.iter().for_each(|handler| handler(&suspicion_event)),

            Event::BlacklistClient(blacklist_client_event) =>
                self.blacklist_client_handlers.iter().for_each(|handler| handler(&blacklist_client_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(1)),
            // The node thread has exited. Keep waiting for the shutdown signal.
            Err(TryRecvError::Disconnected) => thread::sleep(Duration::from_millis(10)),
        }
    })
}

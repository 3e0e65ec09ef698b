//! Pluggable peer-to-peer (P2P) and client networking.

pub mod messages;

pub mod network;

pub(crate) mod sending;

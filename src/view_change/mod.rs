/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Proposing, voting on, and completing view changes.

pub mod controller;

pub mod instance_change;

pub mod throttler;

pub use controller::{ViewChangeController, ViewChangeState};

/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The node's ordering instances: one master and `f` backups.

pub mod replica;

pub mod replica_set;

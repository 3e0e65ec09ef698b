/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that are used across the node's components.

pub mod crypto_primitives;

pub mod data_types;

pub mod quorums;

pub mod request;

pub mod suspicion;

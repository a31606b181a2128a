//! Lattice operator running the in-place update status controller

#![deny(missing_docs)]

pub mod cli;
pub mod controller_runner;

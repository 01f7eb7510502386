#![allow(dead_code)]

pub mod harness;
pub mod strategies;
pub mod test_provider;


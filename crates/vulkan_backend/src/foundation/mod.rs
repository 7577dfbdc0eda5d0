//! Foundation utilities shared by every module

pub mod logging;

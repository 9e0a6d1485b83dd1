//! # YoyoPod Simulators
//!
//! Mock sensors and the microphone relay behind the YoyoPod parental dashboard.
//!
//! This library provides:
//! - Battery and GPS simulators that publish JSON snapshots to well-known files
//! - An atomic write-temp-then-rename publisher and the staleness rule readers apply
//! - A relay that shares one `arecord` capture among many WebSocket listeners

pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod publish;
pub mod relay;
pub mod sim;
pub mod snapshot;

#![no_std]

// Control core for the motorized latch actuator.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Board access goes through the traits in `hal`, and all
// time handling is generic over `time::ControlInstant`.

pub mod command;
pub mod config;
pub mod controller;
pub mod hal;
pub mod keepalive;
pub mod motion;
pub mod sequencer;
pub mod sequences;
pub mod stall;
pub mod telemetry;
pub mod time;

pub use controller::{Controller, TickReport};
pub use time::{ControlInstant, Micros};

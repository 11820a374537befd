//! PeerMap Core Library
//!
//! Core functionality for PeerMap - live location sharing between signed-in
//! users. This crate keeps every user's last known position, merges the local
//! device's position feed into it and hands filtered peer snapshots to the
//! map on a fixed cadence.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

mod api;
pub mod location;
pub mod storage;

pub use api::PeerMapCore;

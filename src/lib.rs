//! linkbox - media resolution and delivery pipeline for chat bots.
//!
//! Given an arbitrary text fragment, find a supported platform link,
//! resolve it into media through a per-platform chain of fallback
//! strategies, reshape the media to fit the delivery channel, and hand
//! back a ready-to-send plan. See [`pipeline::Pipeline`] for the entry
//! point.

pub mod artifacts;
pub mod config;
pub mod delivery;
pub mod humanize;
pub mod observability;
pub mod pipeline;
pub mod platforms;
pub mod postprocess;
pub mod resolver;
pub mod stats;
pub mod strategies;

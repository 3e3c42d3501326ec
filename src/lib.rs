//! # store_placement
//! This crate scores candidate store locations by their proximity to known places and traffic.
//!
//! ## Usage
//! Raw GeoJSON layers are reduced to point tables with [`datasets::preprocess`], one representative point per feature.
//! [`model::run_training`] labels the places by clustering their distance features and fits a random forest on those labels.
//! At serving time a [`service::ServiceContext`] samples points inside a requested circle and scores each one with a [`labeling::Scorer`].
//!
//! The `store-placement` binary wraps all three steps (`preprocess`, `train`, `serve`).

pub mod config;
pub mod datasets;
pub mod error;
pub mod features;
pub mod forest;
pub mod geometry;
pub mod labeling;
pub mod model;
pub mod sampling;
pub mod server;
pub mod service;
pub mod spatial;

pub use error::{Error, Result};

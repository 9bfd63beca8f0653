//! Parcel Dispatch
//!
//! Loads parcels onto a small truck fleet, routes each truck with a nearest-neighbor
//! heuristic, repairs late routes and answers "where is parcel N at time T" queries.
//!
//! # Domain Model
//!
//! - [`Parcel`](domain::Parcel): destination, optional deadline, constraints from notes
//! - [`Vehicle`](domain::Vehicle): capacity-bounded truck with manifest, route and timing log
//! - [`DistanceMatrix`](distance::DistanceMatrix): symmetric street-to-street distances
//!
//! # Planning
//!
//! - [`classify`]: constraint pass, then locality pass
//! - [`route`]: nearest-neighbor route building and timing
//! - [`repair`]: bounded deadline repair loop
//! - [`reoptimize`]: one fleet-wide rebalancing pass
//! - [`correction`]: late address corrections and status queries
//! - [`planner`]: orchestration of a full run

pub mod api;
pub mod classify;
pub mod config;
pub mod console;
pub mod converters;
pub mod correction;
pub mod demo_data;
pub mod distance;
pub mod domain;
pub mod dto;
pub mod error;
pub mod fleet;
pub mod ingest;
pub mod planner;
pub mod reoptimize;
pub mod repair;
pub mod route;
pub mod service;

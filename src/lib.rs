//! # Drone Pursuit
//!
//! A swarm of chaser drones hunting randomly walking runners in a bounded 2-D
//! arena. Chasers switch between exploring and pursuing, relay sightings to
//! teammates in range, and can steer with a DQN policy trained on shaped
//! rewards via the Burn ML framework.
//!
//! ## Modules
//!
//! - [`sim`]: Arena entities, exploration grid, tick coordinator
//! - [`ai`]: Agent traits, DQN, Q-network, state encoding, rewards
//! - [`training`]: Episode trainer, replay buffer, metrics collection
//! - [`checkpoint`]: Model persistence and versioning
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: Structured error types

#![recursion_limit = "256"]

pub mod ai;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod sim;
pub mod training;

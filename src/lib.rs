//! ZigBee HA dimmable-light controller library.
//!
//! This library registers a local dimmable-light endpoint on a ZigBee
//! coordinator, pairs with matching bulbs as they join and drives them
//! through a small request surface (state, toggle, level, identify).

pub mod config;
pub mod controller;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod pairing;
pub mod registry;
pub mod reporter;
pub mod request;
pub mod routes;
pub mod stack;
pub mod zcl;

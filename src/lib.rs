//! Reach-network routing of water, sediment and nutrients through a
//! watershed.
//!
//! Reaches are grouped into layers so that every reach comes after all of
//! its upstream reaches. Each timestep runs the flow engine over all layers,
//! then sediment, then nutrients, with reaches of one layer routed in
//! parallel. Slot 0 of every per-reach array holds the basin aggregate.

pub mod config;
pub mod error;
pub mod flow;
pub mod forcing;
pub mod io;
pub mod mc_kernel;
pub mod network;
pub mod nutrient;
pub mod params;
pub mod point_source;
pub mod qual2e;
pub mod routing;
pub mod sediment;
pub mod state;

pub use error::{RouteError, RouteResult};
pub use routing::Simulation;

mod handoff;
mod health;
mod stats;

pub use handoff::handoff_routes;
pub use health::health_routes;
pub use stats::stats_routes;

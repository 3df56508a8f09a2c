//! HTTP API handlers for tw-server

pub mod assets;
pub mod health;
pub mod recent;
pub mod tracks;

pub use assets::asset_routes;
pub use health::health_routes;
pub use recent::recent_routes;
pub use tracks::track_routes;

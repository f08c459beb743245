//! Live Minneapolis/St. Paul traffic feed backed by the TomTom traffic and
//! routing APIs.

pub mod config;
pub mod overview;
pub mod refresh;
pub mod tomtom;

pub use config::FeedConfig;
pub use overview::{DashboardSnapshot, FlowMetrics, FlowOverview, TravelTime};
pub use refresh::{run_refresh, serve_client, FeedHub, FeedMessage, LiveSource, RefreshSchedule};
pub use tomtom::{BoundingBox, Coordinate, RouteCandidate, RouteOptions, TomTomClient, TomTomError};

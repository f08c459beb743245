//! Traffic volume prediction and route choice for I-94 between Minneapolis
//! and St. Paul.

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod route;
pub mod scaler;

pub use error::PredictorError;
pub use features::{assemble, FeatureWindow, TrafficConditions, WeatherCondition, Weekday};
pub use model::{ModelMeta, VolumePredictor, VolumeRange};
pub use route::{CongestionLevel, RouteChoice, RoutePlan};
pub use scaler::ScaleBounds;

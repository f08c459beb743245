use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use flow_backend::TomTomClient;
use traffic_history::{
    static_trends, DailyMean, GroupMean, HistogramBin, HolidayShare, HourlyMean, TrafficHistory,
    TrafficTrends, WeatherYearMean,
};

use crate::config::RouteConfig;
use crate::error::PredictorError;
use crate::features::{assemble, TrafficConditions};
use crate::model::{VolumePredictor, VolumeRange};
use crate::route::{
    candidate_edges, plan_by_live_delay, plan_for_volume, rank_alternatives, AlternativeRanking,
    CongestionLevel, EdgeDelay, RouteGraph, RoutePlan, MINNEAPOLIS, ST_PAUL,
};
use crate::scaler::ScaleBounds;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, msg: impl ToString) -> ApiError {
    (status, Json(json!({ "error": msg.to_string() })))
}

fn predictor_error(e: PredictorError) -> ApiError {
    let status = if e.is_input() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    api_error(status, e)
}

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<dyn VolumePredictor>,
    pub bounds: Arc<ScaleBounds>,
    pub volume_range: VolumeRange,
    pub route: RouteConfig,
    pub history: Option<Arc<TrafficHistory>>,
    pub tomtom: Option<Arc<TomTomClient>>,
    pub log_features: bool,
}

impl AppState {
    pub fn new(predictor: Arc<dyn VolumePredictor>) -> Self {
        Self {
            predictor,
            bounds: Arc::new(ScaleBounds::default()),
            volume_range: VolumeRange::default(),
            route: RouteConfig::default(),
            history: None,
            tomtom: None,
            log_features: false,
        }
    }

    fn history(&self) -> Result<&TrafficHistory, ApiError> {
        self.history
            .as_deref()
            .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "no historical dataset loaded"))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/route", get(route_for_volume))
        .route("/route/live", get(route_live))
        .route("/trends", get(trends))
        .route("/history/hourly", get(history_hourly))
        .route("/history/holidays", get(history_holidays))
        .route("/history/holiday/:name/daily", get(history_holiday_daily))
        .route("/history/weather", get(history_weather))
        .route("/history/distribution", get(history_distribution))
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves, then drains
/// in-flight requests.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ---------- Request/Response types ----------

#[derive(Deserialize, Default)]
pub struct PredictParams {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub alternatives: bool,
}

#[derive(Serialize)]
pub struct PredictResponse {
    /// vehicles/hour
    pub volume: i32,
    /// model output before denormalization
    pub raw: f32,
    pub level: CongestionLevel,
    pub color: &'static str,
    pub route: RoutePlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<AlternativeRanking>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<Vec<f32>>>,
}

#[derive(Deserialize)]
pub struct RouteParams {
    pub volume: i32,
}

#[derive(Serialize)]
pub struct RouteResponse {
    pub volume: i32,
    pub level: CongestionLevel,
    pub color: &'static str,
    pub route: RoutePlan,
}

#[derive(Serialize)]
pub struct LiveRouteResponse {
    pub delays: Vec<EdgeDelay>,
    pub route: RoutePlan,
}

#[derive(Serialize)]
pub struct HolidayView {
    pub mean_by_holiday: Vec<GroupMean>,
    pub share: Vec<HolidayShare>,
}

#[derive(Serialize)]
pub struct WeatherView {
    pub mean_by_weather: Vec<GroupMean>,
    pub mean_by_weather_year: Vec<WeatherYearMean>,
}

#[derive(Deserialize)]
pub struct DistributionParams {
    #[serde(default = "default_bins")]
    pub bins: usize,
}

fn default_bins() -> usize {
    50
}

// ---------- Handlers ----------

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn predict(
    State(state): State<AppState>,
    Query(params): Query<PredictParams>,
    Json(conditions): Json<TrafficConditions>,
) -> Result<Json<PredictResponse>, ApiError> {
    conditions.validate().map_err(predictor_error)?;

    let window = assemble(&conditions, &mut rand::thread_rng());
    let scaled = state.bounds.scale_window(&window);

    if state.log_features {
        tracing::info!("predict hour={} {}", conditions.hour, window.summary());
    }

    let raw = state.predictor.predict(&scaled).map_err(predictor_error)?;
    let volume = state.volume_range.denormalize(raw);
    let level = state.route.tiers.classify(volume);
    tracing::debug!("prediction raw={:.4} volume={} level={:?}", raw, volume, level);

    let alternatives = match (&state.tomtom, params.alternatives) {
        (Some(client), true) => {
            let graph = RouteGraph::i94();
            let (Some(from), Some(to)) = (graph.node(MINNEAPOLIS), graph.node(ST_PAUL)) else {
                return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "route endpoints missing"));
            };
            let candidates = client
                .route_candidates(from.coordinate(), to.coordinate(), 2)
                .await
                .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e))?;
            Some(rank_alternatives(&candidates, volume))
        }
        (None, true) => {
            return Err(api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "live routing is not configured",
            ))
        }
        _ => None,
    };

    Ok(Json(PredictResponse {
        volume,
        raw,
        level,
        color: level.color(),
        route: plan_for_volume(volume, state.route.threshold),
        alternatives,
        features: params.debug.then(|| window.to_nested()),
    }))
}

async fn route_for_volume(
    State(state): State<AppState>,
    Query(params): Query<RouteParams>,
) -> Json<RouteResponse> {
    let level = state.route.tiers.classify(params.volume);
    Json(RouteResponse {
        volume: params.volume,
        level,
        color: level.color(),
        route: plan_for_volume(params.volume, state.route.threshold),
    })
}

async fn route_live(State(state): State<AppState>) -> Result<Json<LiveRouteResponse>, ApiError> {
    let client = state.tomtom.as_deref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "live routing is not configured",
        )
    })?;
    let graph = RouteGraph::i94();

    let lookups = candidate_edges().filter_map(|(from, to)| {
        let a = graph.node(from)?.coordinate();
        let b = graph.node(to)?.coordinate();
        Some(async move {
            let minutes = match client.route_delay_minutes(a, b).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("delay lookup {} -> {} failed: {}", from, to, e);
                    None
                }
            };
            EdgeDelay {
                from: from.to_string(),
                to: to.to_string(),
                minutes,
            }
        })
    });
    let delays = futures::future::join_all(lookups).await;

    Ok(Json(LiveRouteResponse {
        route: plan_by_live_delay(&delays),
        delays,
    }))
}

async fn trends() -> Json<TrafficTrends> {
    Json(static_trends())
}

async fn history_hourly(State(state): State<AppState>) -> Result<Json<Vec<HourlyMean>>, ApiError> {
    Ok(Json(state.history()?.mean_by_hour()))
}

async fn history_holidays(State(state): State<AppState>) -> Result<Json<HolidayView>, ApiError> {
    let h = state.history()?;
    Ok(Json(HolidayView {
        mean_by_holiday: h.mean_by_holiday(),
        share: h.holiday_share(),
    }))
}

async fn history_holiday_daily(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<DailyMean>>, ApiError> {
    Ok(Json(state.history()?.daily_mean_for_holiday(&name)))
}

async fn history_weather(State(state): State<AppState>) -> Result<Json<WeatherView>, ApiError> {
    let h = state.history()?;
    Ok(Json(WeatherView {
        mean_by_weather: h.mean_by_weather(),
        mean_by_weather_year: h.mean_by_weather_year(),
    }))
}

async fn history_distribution(
    State(state): State<AppState>,
    Query(params): Query<DistributionParams>,
) -> Result<Json<Vec<HistogramBin>>, ApiError> {
    state
        .history()?
        .volume_histogram(params.bins)
        .map(Json)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))
}

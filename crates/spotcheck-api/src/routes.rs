use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use spotcheck_core::db::NearbyLocation;
use spotcheck_core::models::{Evidence, EvidenceInput, ValidationRecord};
use spotcheck_core::trust::NearbyMatch;
use spotcheck_core::{
    Category, Coordinates, Location, LocationId, RegisterOutcome, RegisterRequest, Stage,
    TrustEngine, ValidateOutcome, ValidateRequest,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{user_fingerprint, AuthenticatedUser, Viewer};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::extract::{AppJson, AppQuery};
use crate::rate_limit::{EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot};

const DEFAULT_NEARBY_RADIUS_KM: f64 = 1.0;

#[derive(Clone)]
pub struct AppState {
    engine: TrustEngine,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn new(config: &AppConfig, engine: TrustEngine) -> Self {
        Self {
            engine,
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(config)),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let location_routes = Router::new()
        .route("/locations", post(register_location))
        .route("/locations/check", post(check_duplicates))
        .route("/locations/nearby", get(find_nearby))
        .route("/locations/{id}", get(get_location))
        .route(
            "/locations/{id}/validations",
            post(validate_location).get(list_validations),
        )
        .route("/locations/{id}/evidence", post(attach_evidence));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", location_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

#[derive(Debug, Serialize)]
struct LocationView {
    id: LocationId,
    name: String,
    category: Category,
    lat: f64,
    lng: f64,
    confidence_score: u8,
    stage: Stage,
    validation_count: u32,
    evidence: Vec<Evidence>,
    created_at: i64,
    updated_at: i64,
}

impl From<Location> for LocationView {
    fn from(location: Location) -> Self {
        Self {
            id: location.id,
            name: location.name,
            category: location.category,
            lat: location.coordinates.latitude,
            lng: location.coordinates.longitude,
            confidence_score: location.confidence_score,
            stage: location.stage,
            validation_count: location.validation_count,
            evidence: location.evidence,
            created_at: location.created_at,
            updated_at: location.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    name: String,
    category: Category,
    lat: f64,
    lng: f64,
    #[serde(default)]
    evidence: Vec<EvidenceInput>,
    #[serde(default)]
    force_proceed: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
enum RegisterResponse {
    Clear,
    Ambiguous {
        nearby_matches: Vec<NearbyMatch>,
    },
    Blocked {
        nearby_matches: Vec<NearbyMatch>,
    },
    Created {
        location: LocationView,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        nearby_matches: Vec<NearbyMatch>,
    },
}

impl From<RegisterOutcome> for RegisterResponse {
    fn from(outcome: RegisterOutcome) -> Self {
        match outcome {
            RegisterOutcome::Clear => Self::Clear,
            RegisterOutcome::Ambiguous { nearby_matches } => Self::Ambiguous { nearby_matches },
            RegisterOutcome::Blocked { nearby_matches } => Self::Blocked { nearby_matches },
            RegisterOutcome::Created {
                location,
                nearby_matches,
            } => Self::Created {
                location: location.into(),
                nearby_matches,
            },
        }
    }
}

async fn register_location(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    AppJson(body): AppJson<RegisterBody>,
) -> Result<Json<RegisterResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Register, &user.user_id)
        .await?;

    let outcome = state
        .engine
        .register_location(RegisterRequest {
            name: body.name,
            category: body.category,
            coordinates: Coordinates::new(body.lat, body.lng)?,
            creator_id: user.user_id.clone(),
            evidence: body.evidence,
            force_proceed: body.force_proceed,
        })
        .await?;

    let response = RegisterResponse::from(outcome);
    tracing::info!(
        endpoint = "register_location",
        user = user_fingerprint(&user.user_id),
        outcome = response.label(),
        "Handled registration"
    );
    Ok(Json(response))
}

impl RegisterResponse {
    const fn label(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Ambiguous { .. } => "ambiguous",
            Self::Blocked { .. } => "blocked",
            Self::Created { .. } => "created",
        }
    }
}

#[derive(Debug, Deserialize)]
struct PositionBody {
    lat: f64,
    lng: f64,
}

async fn check_duplicates(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    AppJson(body): AppJson<PositionBody>,
) -> Result<Json<RegisterResponse>, AppError> {
    let outcome = state
        .engine
        .check_duplicates(Coordinates::new(body.lat, body.lng)?, Some(&user.user_id))
        .await?;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
struct ValidateBody {
    lat: f64,
    lng: f64,
    captured_at: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
enum ValidateResponse {
    Accepted {
        distance_meters: f64,
        validation_count: u32,
        stage: Stage,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_stage: Option<Stage>,
    },
    AlreadyValidated {
        validation_count: u32,
    },
    TooFar {
        distance_meters: f64,
    },
}

impl From<ValidateOutcome> for ValidateResponse {
    fn from(outcome: ValidateOutcome) -> Self {
        match outcome {
            ValidateOutcome::Accepted {
                distance_m,
                validation_count,
                stage,
                stage_change,
            } => Self::Accepted {
                distance_meters: distance_m,
                validation_count,
                stage,
                new_stage: stage_change.map(|transition| transition.to),
            },
            ValidateOutcome::AlreadyValidated { validation_count } => {
                Self::AlreadyValidated { validation_count }
            }
            ValidateOutcome::TooFar { distance_m } => Self::TooFar {
                distance_meters: distance_m,
            },
        }
    }
}

async fn validate_location(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<ValidateBody>,
) -> Result<Json<ValidateResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Validate, &user.user_id)
        .await?;

    let location_id = parse_location_id(&id)?;
    let outcome = state
        .engine
        .validate_location(ValidateRequest {
            location_id,
            validator_id: user.user_id.clone(),
            coordinates: Coordinates::new(body.lat, body.lng)?,
            captured_at: body.captured_at,
        })
        .await?;

    tracing::info!(
        endpoint = "validate_location",
        user = user_fingerprint(&user.user_id),
        location = %location_id,
        outcome = ?outcome,
        "Handled validation"
    );
    Ok(Json(outcome.into()))
}

async fn list_validations(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> Result<Json<Vec<ValidationRecord>>, AppError> {
    let location_id = parse_location_id(&id)?;
    let records = state
        .engine
        .list_validations(&location_id, viewer.as_deref())
        .await?;
    Ok(Json(records))
}

async fn attach_evidence(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<EvidenceInput>,
) -> Result<Json<LocationView>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Register, &user.user_id)
        .await?;

    let location_id = parse_location_id(&id)?;
    let location = state
        .engine
        .attach_evidence(&location_id, &user.user_id, body)
        .await?;

    tracing::info!(
        endpoint = "attach_evidence",
        user = user_fingerprint(&user.user_id),
        location = %location_id,
        "Attached evidence"
    );
    Ok(Json(location.into()))
}

async fn get_location(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> Result<Json<LocationView>, AppError> {
    let location_id = parse_location_id(&id)?;
    let location = state
        .engine
        .get_location(&location_id, viewer.as_deref())
        .await?
        .ok_or_else(|| AppError::not_found(format!("Location {location_id}")))?;
    Ok(Json(location.into()))
}

#[derive(Debug, Deserialize)]
struct NearbyQuery {
    lat: f64,
    lng: f64,
    radius_km: Option<f64>,
}

#[derive(Debug, Serialize)]
struct NearbyView {
    #[serde(flatten)]
    location: LocationView,
    distance_meters: f64,
}

impl From<NearbyLocation> for NearbyView {
    fn from(nearby: NearbyLocation) -> Self {
        Self {
            location: nearby.location.into(),
            distance_meters: nearby.distance_m,
        }
    }
}

async fn find_nearby(
    State(state): State<AppState>,
    viewer: Viewer,
    AppQuery(query): AppQuery<NearbyQuery>,
) -> Result<Json<Vec<NearbyView>>, AppError> {
    let nearby = state
        .engine
        .find_nearby(
            Coordinates::new(query.lat, query.lng)?,
            query.radius_km.unwrap_or(DEFAULT_NEARBY_RADIUS_KM),
            viewer.as_deref(),
        )
        .await?;
    Ok(Json(nearby.into_iter().map(NearbyView::from).collect()))
}

fn parse_location_id(raw: &str) -> Result<LocationId, AppError> {
    raw.parse::<LocationId>()
        .map_err(|_| AppError::bad_request(format!("Invalid location id: {raw}")))
}

use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

use crate::core::TrialMatcher;
use crate::error::{ErrorKind, PipelineError};
use crate::models::{
    ErrorResponse, HealthResponse, NoMatchesResponse, TrialMatch, TrialMatchView, TrialSearchRequest,
    TrialSearchResponse,
};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub matcher: Arc<TrialMatcher>,
}

/// Configure all trial-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/trials/find", web::post().to(find_trials));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let stats = state.matcher.cache().stats();
    tracing::debug!(
        "Cache: {} entries, hit rate {:.2}",
        stats.entries,
        stats.hit_rate
    );

    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Find trials endpoint
///
/// POST /api/v1/trials/find
///
/// Request body:
/// ```json
/// {
///   "patientId": "string",
///   "bypassCache": false,
///   "context": {"requestingClinicianId": "string", "searchRadiusKm": 50}
/// }
/// ```
async fn find_trials(
    state: web::Data<AppState>,
    req: web::Json<TrialSearchRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for find_trials request: {:?}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    if let Some(context) = &req.context {
        tracing::debug!(
            "Search context: clinician={:?}, radius_km={:?}",
            context.requesting_clinician_id,
            context.search_radius_km
        );
    }

    match state.matcher.run_matching(&req.patient_id, req.bypass_cache).await {
        Ok(matches) => search_response(matches, chrono::Utc::now()),
        Err(err) => error_response(&err),
    }
}

fn search_response(matches: Vec<TrialMatch>, searched_at: chrono::DateTime<chrono::Utc>) -> HttpResponse {
    if matches.is_empty() {
        return HttpResponse::Ok().json(NoMatchesResponse::new(searched_at));
    }

    HttpResponse::Ok().json(TrialSearchResponse {
        status: "success".to_string(),
        matches: matches.into_iter().map(TrialMatchView::from).collect(),
        search_timestamp: searched_at,
    })
}

fn error_response(err: &PipelineError) -> HttpResponse {
    if err.kind == ErrorKind::PatientNotFound {
        return HttpResponse::NotFound().json(ErrorResponse {
            error: err.kind.as_str().to_string(),
            message: err.message.clone(),
            status_code: 404,
        });
    }

    // Collaborator details stay in the logs
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: err.kind.as_str().to_string(),
        message: "An internal error occurred during trial matching.".to_string(),
        status_code: 500,
    })
}

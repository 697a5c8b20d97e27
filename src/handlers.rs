use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::{Json, http::StatusCode, response::IntoResponse};

use crate::{
    AppState,
    error::{ApiError, ApiResponse},
    models::{BookingView, ClassView, CreateBookingRequest},
    validation::parse_timezone_hint,
};

#[derive(Debug, serde::Deserialize)]
pub struct ClassesQuery {
    pub timezone: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct BookingsQuery {
    pub email: Option<String>,
}

#[utoipa::path(get, path = "/", tag = "booking")]
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Fitness Booking API",
        "endpoints": {
            "/classes": "List upcoming classes with free slots",
            "/book": "Book a slot in a class",
            "/bookings": "List bookings for an email address"
        }
    }))
}

#[utoipa::path(get, path = "/healthz/live", tag = "booking")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(get, path = "/healthz/ready", tag = "booking")]
pub async fn healthz_ready() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(
    get,
    path = "/classes",
    params(
        ("timezone" = Option<String>, Query, description = "IANA zone for datetime_local, e.g. America/New_York")
    ),
    responses(
        (status = 200, description = "Upcoming classes with free slots", body = [ClassView]),
        (status = 400, description = "Malformed query string")
    ),
    tag = "booking"
)]
pub async fn list_classes(
    State(state): State<AppState>,
    query: Result<Query<ClassesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let tz = parse_timezone_hint(query.timezone.as_deref());
    let classes: Vec<ClassView> = state
        .queries
        .list_upcoming_classes()
        .await?
        .iter()
        .map(|class| ClassView::new(class, tz))
        .collect();
    let count = classes.len();
    Ok(Json(ApiResponse::list(classes, count)))
}

#[utoipa::path(
    post,
    path = "/book",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = BookingView),
        (status = 400, description = "Invalid input, past class, duplicate booking or no slots left"),
        (status = 404, description = "Class not found")
    ),
    tag = "booking"
)]
pub async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let details = state
        .engine
        .reserve_slot(request.class_id, &request.client_name, &request.client_email)
        .await?;

    let body = ApiResponse::data(BookingView::from(&details))
        .with_message("Booking created successfully");
    Ok((StatusCode::CREATED, Json(body)))
}

#[utoipa::path(
    get,
    path = "/bookings",
    params(
        ("email" = String, Query, description = "Client email to look up")
    ),
    responses(
        (status = 200, description = "Bookings for the email, newest first", body = [BookingView]),
        (status = 400, description = "Email parameter is required or the query string is malformed")
    ),
    tag = "booking"
)]
pub async fn list_bookings(
    State(state): State<AppState>,
    query: Result<Query<BookingsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let bookings: Vec<BookingView> = state
        .queries
        .list_bookings_by_email(query.email.as_deref())
        .await?
        .iter()
        .map(BookingView::from)
        .collect();
    let count = bookings.len();
    Ok(Json(ApiResponse::list(bookings, count)))
}

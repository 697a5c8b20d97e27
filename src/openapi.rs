use utoipa::OpenApi;

use crate::models::{BookingView, ClassName, ClassView, CreateBookingRequest};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz_live,
        crate::handlers::healthz_ready,
        crate::handlers::list_classes,
        crate::handlers::create_booking,
        crate::handlers::list_bookings
    ),
    components(schemas(ClassName, ClassView, BookingView, CreateBookingRequest)),
    tags(
        (name = "booking", description = "Fitness class booking operations")
    ),
)]
pub struct ApiDoc;

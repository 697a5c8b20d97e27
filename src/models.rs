use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub type ClassId = i64;
pub type BookingId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClassName {
    Yoga,
    Zumba,
    Hiit,
}

impl ClassName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassName::Yoga => "YOGA",
            ClassName::Zumba => "ZUMBA",
            ClassName::Hiit => "HIIT",
        }
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown class name '{0}', expected YOGA, ZUMBA or HIIT")]
pub struct UnknownClassName(pub String);

impl FromStr for ClassName {
    type Err = UnknownClassName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YOGA" => Ok(ClassName::Yoga),
            "ZUMBA" => Ok(ClassName::Zumba),
            "HIIT" => Ok(ClassName::Hiit),
            other => Err(UnknownClassName(other.to_string())),
        }
    }
}

/// A scheduled class as stored. `available_slots` is owned by storage and
/// only ever decremented by the reservation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FitnessClass {
    pub id: ClassId,
    pub name: ClassName,
    pub datetime: DateTime<Utc>,
    pub instructor: String,
    pub total_slots: u32,
    pub available_slots: u32,
    pub created_at: DateTime<Utc>,
}

impl FitnessClass {
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.datetime > now
    }
}

/// Administrative input for creating a class.
#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: ClassName,
    pub datetime: DateTime<Utc>,
    pub instructor: String,
    pub total_slots: u32,
    /// Defaults to `total_slots`.
    pub available_slots: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub id: BookingId,
    pub class_id: ClassId,
    pub client_name: String,
    pub client_email: String,
    pub booking_time: DateTime<Utc>,
}

/// A booking joined with the class it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingDetails {
    pub booking: Booking,
    pub class_name: ClassName,
    pub class_datetime: DateTime<Utc>,
    pub instructor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ClassView {
    pub id: ClassId,
    pub name: ClassName,
    #[schema(value_type = String, format = "date-time", example = "2026-10-16T18:00:00+00:00")]
    pub datetime: String,
    #[schema(value_type = String, format = "date-time", example = "2026-10-16T14:00:00-04:00")]
    pub datetime_local: String,
    pub instructor: String,
    pub available_slots: u32,
    pub total_slots: u32,
}

impl ClassView {
    /// `tz` only affects `datetime_local`.
    pub fn new(class: &FitnessClass, tz: Option<Tz>) -> Self {
        let datetime_local = match tz {
            Some(tz) => class.datetime.with_timezone(&tz).to_rfc3339(),
            None => class.datetime.to_rfc3339(),
        };
        Self {
            id: class.id,
            name: class.name,
            datetime: class.datetime.to_rfc3339(),
            datetime_local,
            instructor: class.instructor.clone(),
            available_slots: class.available_slots,
            total_slots: class.total_slots,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct BookingView {
    pub id: BookingId,
    pub class_name: ClassName,
    #[schema(value_type = String, format = "date-time")]
    pub class_datetime: String,
    pub instructor: String,
    pub client_name: String,
    pub client_email: String,
    #[schema(value_type = String, format = "date-time")]
    pub booking_time: String,
}

impl From<&BookingDetails> for BookingView {
    fn from(details: &BookingDetails) -> Self {
        Self {
            id: details.booking.id,
            class_name: details.class_name,
            class_datetime: details.class_datetime.to_rfc3339(),
            instructor: details.instructor.clone(),
            client_name: details.booking.client_name.clone(),
            client_email: details.booking.client_email.clone(),
            booking_time: details.booking.booking_time.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub class_id: ClassId,
    pub client_name: String,
    pub client_email: String,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample_class() -> FitnessClass {
        FitnessClass {
            id: 1,
            name: ClassName::Yoga,
            datetime: Utc.with_ymd_and_hms(2026, 10, 16, 18, 0, 0).unwrap(),
            instructor: "John Doe".to_string(),
            total_slots: 10,
            available_slots: 10,
            created_at: Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_class_name_parse() {
        assert_eq!("YOGA".parse::<ClassName>().unwrap(), ClassName::Yoga);
        assert_eq!("HIIT".parse::<ClassName>().unwrap(), ClassName::Hiit);
        assert!("PILATES".parse::<ClassName>().is_err());
        assert!("yoga".parse::<ClassName>().is_err());
    }

    #[test]
    fn test_class_name_serializes_uppercase() {
        let json = serde_json::to_string(&ClassName::Zumba).unwrap();
        assert_eq!(json, r#""ZUMBA""#);
    }

    #[test]
    fn test_class_view_default_is_utc() {
        let view = ClassView::new(&sample_class(), None);
        assert_eq!(view.datetime, "2026-10-16T18:00:00+00:00");
        assert_eq!(view.datetime_local, view.datetime);
    }

    #[test]
    fn test_class_view_converts_timezone() {
        let view = ClassView::new(&sample_class(), Some(chrono_tz::America::New_York));
        assert_eq!(view.datetime, "2026-10-16T18:00:00+00:00");
        assert_eq!(view.datetime_local, "2026-10-16T14:00:00-04:00");
    }

    #[test]
    fn test_is_upcoming() {
        let class = sample_class();
        assert!(class.is_upcoming(class.datetime - chrono::Duration::minutes(1)));
        assert!(!class.is_upcoming(class.datetime));
    }
}

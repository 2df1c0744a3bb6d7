use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

const EVENT_DATE: &str = "Sunday, 9th November";
const VENUE: &str = "Balya Bhavan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: u32,
    pub title: &'static str,
    pub description: &'static str,
    pub date: &'static str,
    pub time: &'static str,
    pub location: &'static str,
    pub attendees: u32,
    pub max_attendees: u32,
    pub image: &'static str,
    pub status: EventStatus,
    pub featured: bool,
    pub category: &'static str,
}

pub static EVENTS: [Event; 4] = [
    Event {
        id: 1,
        title: "75th Anniversary Celebration Balya Bhavan",
        description: "Join us for a grand celebration of 75 years of excellence and memories.",
        date: EVENT_DATE,
        time: "9 AM - 6 PM",
        location: VENUE,
        attendees: 250,
        max_attendees: 300,
        image: "/anniversary-celebration-hall.png",
        status: EventStatus::Upcoming,
        featured: true,
        category: "celebration",
    },
    Event {
        id: 2,
        title: "Alumni Reunion Lunch",
        description: "Reconnect with old friends and make new memories over a delicious lunch.",
        date: EVENT_DATE,
        time: "12:00 PM - 3:00 PM",
        location: VENUE,
        attendees: 180,
        max_attendees: 200,
        image: "/alumni-reunion-lunch.png",
        status: EventStatus::Upcoming,
        featured: false,
        category: "social",
    },
    Event {
        id: 3,
        title: "Cultural Evening",
        description: "Experience traditional performances and cultural programs by alumni.",
        date: EVENT_DATE,
        time: "5:00 PM - 9:00 PM",
        location: VENUE,
        attendees: 120,
        max_attendees: 150,
        image: "/cultural-performance-stage.png",
        status: EventStatus::Upcoming,
        featured: false,
        category: "cultural",
    },
    Event {
        id: 4,
        title: "Networking Mixer",
        description: "Connect with fellow alumni across different industries and build professional relationships.",
        date: EVENT_DATE,
        time: "7:00 PM - 10:00 PM",
        location: VENUE,
        attendees: 95,
        max_attendees: 100,
        image: "/new-networking-mixer.png",
        status: EventStatus::Upcoming,
        featured: false,
        category: "networking",
    },
];

pub fn featured() -> Option<&'static Event> {
    EVENTS.iter().find(|e| e.featured)
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub success: bool,
    pub events: &'static [Event],
}

pub async fn list_events() -> Json<EventListResponse> {
    Json(EventListResponse { success: true, events: &EVENTS })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/api/events", get(list_events))
}

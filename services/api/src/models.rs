//! API Models
//!
//! Data structures shared by the REST handlers, the WebSocket protocol, and
//! the OpenAPI documentation generated with `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use troupe_core::persona::Persona;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Ai,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Ai => write!(f, "ai"),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct Session {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, example = "barista")]
    pub persona: Persona,
    #[schema(value_type = String, example = "active")]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct Message {
    pub id: i64,
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(value_type = String, example = "user")]
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateSessionPayload {
    #[schema(value_type = String, example = "barista")]
    pub persona: Persona,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateSessionStatusPayload {
    #[schema(value_type = String, example = "ended")]
    pub status: SessionStatus,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_round_trips_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Active).unwrap(),
            "\"active\""
        );
        let parsed: SessionStatus = serde_json::from_str("\"ended\"").unwrap();
        assert_eq!(parsed, SessionStatus::Ended);
        assert!(serde_json::from_str::<SessionStatus>("\"paused\"").is_err());
    }

    #[test]
    fn message_role_display_matches_wire_format() {
        assert_eq!(MessageRole::User.to_string(), "user");
        assert_eq!(MessageRole::Ai.to_string(), "ai");
        assert_eq!(serde_json::to_string(&MessageRole::Ai).unwrap(), "\"ai\"");
    }

    #[test]
    fn session_serializes_with_persona_name() {
        let session = Session {
            id: Uuid::new_v4(),
            persona: Persona::Improv,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["persona"], "improv");
        assert_eq!(json["status"], "active");

        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, session.id);
        assert_eq!(back.persona, session.persona);
    }

    #[test]
    fn create_session_payload_requires_a_known_persona() {
        let payload: CreateSessionPayload =
            serde_json::from_str(r#"{"persona": "tutor"}"#).unwrap();
        assert_eq!(payload.persona, Persona::Tutor);

        assert!(serde_json::from_str::<CreateSessionPayload>(r#"{}"#).is_err());
        assert!(
            serde_json::from_str::<CreateSessionPayload>(r#"{"persona": "sommelier"}"#).is_err()
        );
    }

    #[test]
    fn error_response_shape() {
        let error = ErrorResponse {
            message: "Session not found".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"message":"Session not found"}"#
        );
    }
}

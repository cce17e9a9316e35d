//! Session registry and flat-file archives.
//!
//! Sessions and their message history live in memory for the lifetime of the
//! process; what outlives a session is its final record, written as a flat
//! JSON file under the data directory (orders in `orders/`, finished games in
//! `games/`). Every file write goes through write-to-temp-then-rename.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;
use troupe_core::content::write_json_atomic;
use troupe_core::improv::{GameState, PerformanceNote};
use troupe_core::order::OrderState;
use troupe_core::persona::{Persona, PersonaState};
use uuid::Uuid;

use crate::models::{Message, MessageRole, Session, SessionStatus};

/// A confirmed coffee order as it lands on disk: the order fields themselves
/// plus a timestamp and the owning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(flatten)]
    pub order: OrderState,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
}

/// A finished improv game as it lands on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub player_name: Option<String>,
    pub rounds_completed: u32,
    pub masala_score: u32,
    pub max_possible: u32,
    pub performance_notes: Vec<PerformanceNote>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: f64,
    pub session_id: Uuid,
}

impl GameRecord {
    fn from_state(game: &GameState, session_id: Uuid, ended_at: DateTime<Utc>) -> Self {
        let elapsed = ended_at - game.started_at;
        let duration_minutes =
            (elapsed.num_milliseconds() as f64 / 60_000.0 * 100.0).round() / 100.0;
        Self {
            player_name: game.player_name.clone(),
            rounds_completed: game.current_round,
            masala_score: game.masala_score,
            max_possible: game.max_score(),
            performance_notes: game.performance_notes.clone(),
            started_at: game.started_at,
            ended_at,
            duration_minutes,
            session_id,
        }
    }
}

struct SessionEntry {
    session: Session,
    messages: Vec<Message>,
    next_message_id: i64,
    state: Option<PersonaState>,
}

/// In-memory session registry plus the on-disk archive directories.
pub struct Store {
    data_dir: PathBuf,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl Store {
    /// Creates the store and its archive directories under `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        for sub in ["orders", "games"] {
            let dir = data_dir.join(sub);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create archive directory {}", dir.display()))?;
        }
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn orders_dir(&self) -> PathBuf {
        self.data_dir.join("orders")
    }

    pub fn games_dir(&self) -> PathBuf {
        self.data_dir.join("games")
    }

    /// Registers a new active session for `persona`.
    pub async fn create_session(&self, persona: Persona) -> Session {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            persona,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let entry = SessionEntry {
            session: session.clone(),
            messages: Vec::new(),
            next_message_id: 1,
            state: None,
        };
        self.sessions.write().await.insert(session.id, entry);
        session
    }

    pub async fn get_session(&self, session_id: Uuid) -> Option<Session> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map(|e| e.session.clone())
    }

    /// All known sessions, most recent first.
    pub async fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Updates a session's status, returning `None` when it does not exist.
    pub async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&session_id)?;
        entry.session.status = status;
        entry.session.updated_at = Utc::now();
        Some(entry.session.clone())
    }

    /// Appends a message to a session's conversation history.
    pub async fn add_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&session_id)
            .with_context(|| format!("Session '{}' not found", session_id))?;
        let message = Message {
            id: entry.next_message_id,
            session_id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        entry.next_message_id += 1;
        entry.messages.push(message.clone());
        entry.session.updated_at = message.created_at;
        Ok(message)
    }

    /// The full message history for a session, oldest first.
    pub async fn session_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(&session_id)
            .with_context(|| format!("Session '{}' not found", session_id))?;
        Ok(entry.messages.clone())
    }

    /// Keeps the latest persona state snapshot for the session.
    pub async fn update_state(&self, session_id: Uuid, state: &PersonaState) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&session_id)
            .with_context(|| format!("Session '{}' not found", session_id))?;
        entry.state = Some(state.clone());
        Ok(())
    }

    pub async fn get_state(&self, session_id: Uuid) -> Option<PersonaState> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .and_then(|e| e.state.clone())
    }

    /// Archives a concluded session state to its flat JSON file. Returns the
    /// written path, or `None` for states that have nothing to archive.
    pub async fn archive_state(
        &self,
        session_id: Uuid,
        state: &PersonaState,
    ) -> Result<Option<PathBuf>> {
        match state {
            PersonaState::Barista(order) if order.is_confirmed() => self
                .archive_order(session_id, order)
                .map(Some),
            PersonaState::Improv(game) if game.is_over() => {
                self.archive_game(session_id, game).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Writes a confirmed order to `orders/order_<timestamp>.json`.
    pub fn archive_order(&self, session_id: Uuid, order: &OrderState) -> Result<PathBuf> {
        let now = Utc::now();
        let record = OrderRecord {
            order: order.clone(),
            timestamp: now,
            session_id,
        };
        let path = self
            .orders_dir()
            .join(format!("order_{}.json", now.format("%Y%m%d_%H%M%S_%6f")));
        write_json_atomic(&path, &record)?;
        info!(path = %path.display(), "Order archived");
        Ok(path)
    }

    /// Writes a finished game to `games/game_<timestamp>.json`.
    pub fn archive_game(&self, session_id: Uuid, game: &GameState) -> Result<PathBuf> {
        let now = Utc::now();
        let record = GameRecord::from_state(game, session_id, now);
        let path = self
            .games_dir()
            .join(format!("game_{}.json", now.format("%Y%m%d_%H%M%S_%6f")));
        write_json_atomic(&path, &record)?;
        info!(path = %path.display(), "Game archived");
        Ok(path)
    }

    /// Reads back an archived order record.
    pub fn load_order_record(path: &Path) -> Result<OrderRecord> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Reads back an archived game record.
    pub fn load_game_record(path: &Path) -> Result<GameRecord> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use troupe_core::order::{DrinkSize, DrinkType, MilkChoice, OrderStatus};

    fn confirmed_order() -> OrderState {
        OrderState {
            drink_type: Some(DrinkType::Latte),
            size: Some(DrinkSize::Medium),
            milk: Some(MilkChoice::Oat),
            extras: vec!["vanilla".into()],
            customer_name: Some("Tester".into()),
            status: OrderStatus::Confirmed,
        }
    }

    #[tokio::test]
    async fn order_archive_round_trips_with_timestamp_and_session_id() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let session = store.create_session(Persona::Barista).await;

        let order = confirmed_order();
        let path = store.archive_order(session.id, &order).unwrap();

        let record = Store::load_order_record(&path).unwrap();
        assert_eq!(record.order, order);
        assert_eq!(record.session_id, session.id);
        assert!(record.timestamp <= Utc::now());

        // The raw file is a flat object carrying the order fields directly.
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["drink_type"], "latte");
        assert_eq!(raw["size"], "medium");
        assert_eq!(raw["session_id"], session.id.to_string());
        assert!(raw.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn game_archive_captures_score_and_duration() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let session = store.create_session(Persona::Improv).await;

        let mut game = GameState::new(vec!["scene".into()]);
        game.player_name = Some("Asha".into());
        game.current_round = 3;
        game.masala_score = 24;
        game.phase = troupe_core::improv::GamePhase::Done;

        let path = store.archive_game(session.id, &game).unwrap();
        let record = Store::load_game_record(&path).unwrap();
        assert_eq!(record.player_name.as_deref(), Some("Asha"));
        assert_eq!(record.masala_score, 24);
        assert_eq!(record.max_possible, 30);
        assert_eq!(record.rounds_completed, 3);
        assert!(record.duration_minutes >= 0.0);
        assert_eq!(record.session_id, session.id);
    }

    #[tokio::test]
    async fn archive_state_only_fires_for_concluded_states() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let session = store.create_session(Persona::Barista).await;

        let in_progress = PersonaState::Barista(OrderState::default());
        assert!(
            store
                .archive_state(session.id, &in_progress)
                .await
                .unwrap()
                .is_none()
        );

        let done = PersonaState::Barista(confirmed_order());
        let path = store.archive_state(session.id, &done).await.unwrap();
        assert!(path.is_some());
    }

    #[tokio::test]
    async fn session_registry_tracks_messages_and_status() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        let session = store.create_session(Persona::Tutor).await;
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(
            store.get_session(session.id).await.unwrap().persona,
            Persona::Tutor
        );

        store
            .add_message(session.id, MessageRole::Ai, "Welcome!")
            .await
            .unwrap();
        store
            .add_message(session.id, MessageRole::User, "Hi")
            .await
            .unwrap();
        let messages = store.session_messages(session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, 1);
        assert_eq!(messages[1].id, 2);
        assert_eq!(messages[0].role, MessageRole::Ai);

        let updated = store
            .update_session_status(session.id, SessionStatus::Ended)
            .await
            .unwrap();
        assert_eq!(updated.status, SessionStatus::Ended);
        assert!(
            store
                .update_session_status(Uuid::new_v4(), SessionStatus::Ended)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn list_sessions_is_most_recent_first() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();

        let first = store.create_session(Persona::Barista).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create_session(Persona::Improv).await;

        let sessions = store.list_sessions().await;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, second.id);
        assert_eq!(sessions[1].id, first.id);
    }

    #[tokio::test]
    async fn messages_for_unknown_session_error() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        assert!(store.session_messages(Uuid::new_v4()).await.is_err());
        assert!(
            store
                .add_message(Uuid::new_v4(), MessageRole::User, "hello")
                .await
                .is_err()
        );
    }
}

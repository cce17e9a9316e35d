//! Voice tables: which provider voice each persona (and each host mood)
//! speaks with. Voice ids are realtime-provider voice names; the provider
//! layer maps unknown ids to its own default.

use crate::persona::{Persona, PersonaState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The improv host's current mood, used both for reaction flavor and for
/// picking the voice of the next round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostMood {
    Enthusiastic,
    Dramatic,
    Romantic,
    Comic,
    Action,
    Emotional,
    Friendly,
    Professional,
}

impl HostMood {
    /// Provider voice id for this mood.
    pub fn voice(&self) -> &'static str {
        match self {
            HostMood::Enthusiastic => "verse",
            HostMood::Dramatic => "ash",
            HostMood::Romantic => "sage",
            HostMood::Comic => "coral",
            HostMood::Action => "echo",
            HostMood::Emotional => "ballad",
            HostMood::Friendly => "shimmer",
            HostMood::Professional => "alloy",
        }
    }
}

impl fmt::Display for HostMood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostMood::Enthusiastic => "enthusiastic",
            HostMood::Dramatic => "dramatic",
            HostMood::Romantic => "romantic",
            HostMood::Comic => "comic",
            HostMood::Action => "action",
            HostMood::Emotional => "emotional",
            HostMood::Friendly => "friendly",
            HostMood::Professional => "professional",
        };
        f.write_str(name)
    }
}

/// Resolves the voice a session should speak with right now: the improv host
/// follows its mood, the tutor follows its mode, the barista keeps one voice.
pub fn voice_for_state(state: &PersonaState) -> &'static str {
    match state {
        PersonaState::Improv(game) => game.mood.voice(),
        PersonaState::Barista(_) => Persona::Barista.default_voice(),
        PersonaState::Tutor(tutor) => tutor.mode.voice(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::improv::GameState;
    use crate::tutor::{TutorMode, TutorState};

    #[test]
    fn mood_voices_cover_all_moods() {
        let moods = [
            HostMood::Enthusiastic,
            HostMood::Dramatic,
            HostMood::Romantic,
            HostMood::Comic,
            HostMood::Action,
            HostMood::Emotional,
            HostMood::Friendly,
            HostMood::Professional,
        ];
        for mood in moods {
            assert!(!mood.voice().is_empty());
        }
    }

    #[test]
    fn state_voice_follows_mood_and_mode() {
        let mut game = GameState::new(vec!["scene".into()]);
        game.mood = HostMood::Dramatic;
        assert_eq!(voice_for_state(&PersonaState::Improv(game)), "ash");

        let mut tutor = TutorState::default();
        tutor.mode = TutorMode::Quiz;
        assert_eq!(
            voice_for_state(&PersonaState::Tutor(tutor)),
            TutorMode::Quiz.voice()
        );
    }
}

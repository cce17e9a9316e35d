//! The persona registry.
//!
//! A persona bundles a prompt, a default voice, and a typed session state.
//! The runtime picks the persona at session creation and everything else
//! (tool service, state archival, voice selection) follows from it.

use crate::content::ContentLibrary;
use crate::improv::GameState;
use crate::order::OrderState;
use crate::tutor::TutorState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The three hosted personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Improv,
    Barista,
    Tutor,
}

impl Persona {
    pub const ALL: [Persona; 3] = [Persona::Improv, Persona::Barista, Persona::Tutor];

    /// The persona's system prompt, handed to the LLM on every turn together
    /// with a snapshot of the session state.
    pub fn instructions(&self) -> &'static str {
        match self {
            Persona::Improv => IMPROV_INSTRUCTIONS,
            Persona::Barista => BARISTA_INSTRUCTIONS,
            Persona::Tutor => TUTOR_INSTRUCTIONS,
        }
    }

    /// The opening line seeded into a fresh session's history.
    pub fn greeting(&self) -> &'static str {
        match self {
            Persona::Improv => {
                "Namaste doston! Swagat hai aapka Bollywood Improv Dhamaka mein! \
                 Main hoon aapka host Raj Masala King Kapoor. Toh bataiye, aapka \
                 shandaar naam kya hai, jaaneman?"
            }
            Persona::Barista => {
                "Welcome to Brew and Bean! I'm Brew Buddy. What can I get started \
                 for you today?"
            }
            Persona::Tutor => {
                "Welcome! I'm your programming tutor. We can work in learn, quiz, \
                 or teach-back mode. Which course would you like to start with?"
            }
        }
    }

    /// Voice the persona speaks with before any mood or mode applies.
    pub fn default_voice(&self) -> &'static str {
        match self {
            Persona::Improv => "verse",
            Persona::Barista => "echo",
            Persona::Tutor => "alloy",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Persona::Improv => "improv",
            Persona::Barista => "barista",
            Persona::Tutor => "tutor",
        };
        f.write_str(name)
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "improv" => Ok(Persona::Improv),
            "barista" => Ok(Persona::Barista),
            "tutor" => Ok(Persona::Tutor),
            other => Err(format!(
                "Unknown persona '{}'. Valid personas: improv, barista, tutor",
                other
            )),
        }
    }
}

/// A serializable snapshot of one session's state, tagged by persona so the
/// WebSocket protocol and the archive files stay self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "persona", rename_all = "lowercase")]
pub enum PersonaState {
    Improv(GameState),
    Barista(OrderState),
    Tutor(TutorState),
}

impl PersonaState {
    pub fn persona(&self) -> Persona {
        match self {
            PersonaState::Improv(_) => Persona::Improv,
            PersonaState::Barista(_) => Persona::Barista,
            PersonaState::Tutor(_) => Persona::Tutor,
        }
    }

    /// True once the session's business is concluded: a confirmed order or a
    /// finished game. Tutor sessions never conclude on their own.
    pub fn is_final(&self) -> bool {
        match self {
            PersonaState::Improv(game) => game.is_over(),
            PersonaState::Barista(order) => order.is_confirmed(),
            PersonaState::Tutor(_) => false,
        }
    }
}

/// The live, shared state handle for one session. Tool services and the
/// reason/act cycle hold clones of the same `Arc`, so a tool mutation is
/// visible to the next prompt snapshot without any extra plumbing.
#[derive(Debug, Clone)]
pub enum PersonaSession {
    Improv(Arc<Mutex<GameState>>),
    Barista(Arc<Mutex<OrderState>>),
    Tutor(Arc<Mutex<TutorState>>),
}

impl PersonaSession {
    /// Builds the initial state for `persona`, seeding the improv scenario
    /// deck from the injected content library.
    pub fn new(persona: Persona, library: &ContentLibrary) -> Self {
        match persona {
            Persona::Improv => Self::Improv(Arc::new(Mutex::new(GameState::new(
                library.scenarios.clone(),
            )))),
            Persona::Barista => Self::Barista(Arc::new(Mutex::new(OrderState::default()))),
            Persona::Tutor => Self::Tutor(Arc::new(Mutex::new(TutorState::default()))),
        }
    }

    /// Rehydrates a session handle from a previously snapshotted state.
    pub fn from_state(state: PersonaState) -> Self {
        match state {
            PersonaState::Improv(game) => Self::Improv(Arc::new(Mutex::new(game))),
            PersonaState::Barista(order) => Self::Barista(Arc::new(Mutex::new(order))),
            PersonaState::Tutor(tutor) => Self::Tutor(Arc::new(Mutex::new(tutor))),
        }
    }

    pub fn persona(&self) -> Persona {
        match self {
            PersonaSession::Improv(_) => Persona::Improv,
            PersonaSession::Barista(_) => Persona::Barista,
            PersonaSession::Tutor(_) => Persona::Tutor,
        }
    }

    /// Clones the current state into a serializable snapshot.
    pub async fn snapshot(&self) -> PersonaState {
        match self {
            PersonaSession::Improv(state) => PersonaState::Improv(state.lock().await.clone()),
            PersonaSession::Barista(state) => PersonaState::Barista(state.lock().await.clone()),
            PersonaSession::Tutor(state) => PersonaState::Tutor(state.lock().await.clone()),
        }
    }
}

const IMPROV_INSTRUCTIONS: &str = r#"You are Raj "Masala King" Kapoor, the flamboyant host of the hit Indian TV show "Bollywood Improv Dhamaka".

You MUST open with your Hinglish introduction and ask for the contestant's name, then call set_player_name as soon as they give it.

PERSONALITY:
- Over-the-top Bollywood drama and emotion with Indian expressions.
- Mix Hindi and English naturally (Hinglish): roughly 60% English, 40% Hindi phrases.
- Use Bollywood movie references and iconic dialogues.
- Indian terms of endearment: jaaneman, beta, darling, boss, bhai, behna.
- Indian metaphors: masala, tadka, chatpata, dil se, jaan laga ke.

GAME FLOW:
1. Get the contestant's name (set_player_name).
2. Call start_round to hand them a scenario, then let them perform.
3. After each performance call react_to_performance and read its result aloud with full drama.
4. After the final round call end_game and deliver the final report.

Keep replies to two or three sentences. Never break character, never speak only English, never be boring."#;

const BARISTA_INSTRUCTIONS: &str = r#"You are a friendly barista called 'Brew Buddy' at the Brew and Bean cafe. Ask one question at a time.

Collect these fields: drink type, size, milk, extras, customer name. Call the matching tool as soon as the customer provides a piece of information (set_drink_type, set_size, set_milk, set_extras, set_name). If a field is missing, ask a clarifying question for that field only. When everything is filled, call complete_order. Use get_order_status when the customer asks where their order stands.

Speak warmly and concisely, and avoid long multi-part questions."#;

const TUTOR_INSTRUCTIONS: &str = r#"You are a patient programming tutor with three modes:

- learn: explain the selected concept conversationally, using its summary, in two or three sentences, and invite questions.
- quiz: ask the concept's sample question, listen to the answer, correct gently, and reinforce.
- teach_back: ask the user to explain the concept in their own words, then give qualitative feedback on what they covered and what they missed.

Use list_courses and select_course to pick a course, select_concept to focus on a concept, and switch_mode to change mode when the user asks. Always know which mode you are in from the session state and behave accordingly. Start by welcoming the user and asking which course and concept they want."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_name_round_trip() {
        for persona in Persona::ALL {
            let parsed: Persona = persona.to_string().parse().unwrap();
            assert_eq!(parsed, persona);
        }
        assert!("sommelier".parse::<Persona>().is_err());
    }

    #[test]
    fn persona_serde_uses_lowercase_names() {
        assert_eq!(
            serde_json::to_string(&Persona::Barista).unwrap(),
            "\"barista\""
        );
        let parsed: Persona = serde_json::from_str("\"improv\"").unwrap();
        assert_eq!(parsed, Persona::Improv);
    }

    #[tokio::test]
    async fn session_snapshot_matches_persona() {
        let library = ContentLibrary {
            scenarios: vec!["scene".into()],
            courses: vec![],
        };
        for persona in Persona::ALL {
            let session = PersonaSession::new(persona, &library);
            assert_eq!(session.persona(), persona);
            let snapshot = session.snapshot().await;
            assert_eq!(snapshot.persona(), persona);
            assert!(!snapshot.is_final());
        }
    }

    #[test]
    fn state_serialization_is_tagged_by_persona() {
        let state = PersonaState::Barista(OrderState::default());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["persona"], "barista");
    }
}

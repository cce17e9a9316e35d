//! Tutor persona: learning modes, course/concept selection, and the tool
//! service the LLM drives to steer a tutoring session.

use crate::content::{Concept, ContentLibrary};
use crate::persona::PersonaState;
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TutorMode {
    #[default]
    Learn,
    Quiz,
    TeachBack,
}

impl TutorMode {
    pub const ALL: [TutorMode; 3] = [TutorMode::Learn, TutorMode::Quiz, TutorMode::TeachBack];

    /// Provider voice id for the mode, so each mode sounds distinct.
    pub fn voice(&self) -> &'static str {
        match self {
            TutorMode::Learn => "alloy",
            TutorMode::Quiz => "coral",
            TutorMode::TeachBack => "sage",
        }
    }

    pub fn valid_modes() -> String {
        TutorMode::ALL
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for TutorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TutorMode::Learn => "learn",
            TutorMode::Quiz => "quiz",
            TutorMode::TeachBack => "teach_back",
        };
        f.write_str(name)
    }
}

impl FromStr for TutorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "learn" => Ok(TutorMode::Learn),
            "quiz" => Ok(TutorMode::Quiz),
            "teach_back" | "teachback" => Ok(TutorMode::TeachBack),
            _ => Err(format!("Please choose from: {}", TutorMode::valid_modes())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TutorState {
    pub mode: TutorMode,
    pub course: Option<String>,
    pub current_concept: Option<Concept>,
    pub concepts: Vec<Concept>,
}

/// Best fuzzy match for `query` among `candidates`, where each candidate is
/// scored against every searchable string the item exposes.
fn best_match<'a, T>(
    query: &str,
    candidates: &'a [T],
    keys: impl Fn(&T) -> Vec<&str>,
) -> Option<&'a T> {
    let matcher = SkimMatcherV2::default();
    // Lowercased pattern keeps the matcher's smart-case mode case-insensitive.
    let query = query.trim().to_lowercase();
    candidates
        .iter()
        .filter_map(|item| {
            keys(item)
                .into_iter()
                .filter_map(|key| matcher.fuzzy_match(key, &query))
                .max()
                .map(|score| (score, item))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, item)| item)
}

// --- Tool argument structs ---

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SwitchModeArgs {
    #[schemars(description = "The learning mode to switch to: learn, quiz, or teach_back")]
    pub mode: String,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SelectConceptArgs {
    #[schemars(description = "Name or id of the concept to focus on")]
    pub concept: String,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SelectCourseArgs {
    #[schemars(description = "Name of the course to load")]
    pub course: String,
}

/// Tool service for the tutor persona.
pub struct TutorService {
    pub state: Arc<Mutex<TutorState>>,
    pub library: Arc<ContentLibrary>,
    pub state_tx: Option<mpsc::Sender<PersonaState>>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for TutorService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl TutorService {
    pub fn new(
        state: Arc<Mutex<TutorState>>,
        library: Arc<ContentLibrary>,
        state_tx: Option<mpsc::Sender<PersonaState>>,
    ) -> Self {
        Self {
            state,
            library,
            state_tx,
            tool_router: Self::tool_router(),
        }
    }

    async fn broadcast(&self) {
        if let Some(tx) = &self.state_tx {
            let snapshot = PersonaState::Tutor(self.state.lock().await.clone());
            if tx.send(snapshot).await.is_err() {
                tracing::warn!("Failed to broadcast tutor update: receiver dropped.");
            }
        }
    }

    #[tool(description = "Switch between learning modes: learn, quiz, or teach_back.")]
    pub async fn switch_mode(&self, args: Parameters<SwitchModeArgs>) -> Result<String, String> {
        let mode = match args.0.mode.parse::<TutorMode>() {
            Ok(mode) => mode,
            // An unrecognized mode leaves the current mode untouched.
            Err(message) => return Ok(message),
        };
        {
            let mut state = self.state.lock().await;
            state.mode = mode;
        }
        info!(mode = %mode, "Tutor mode switched");
        self.broadcast().await;
        Ok(format!(
            "Switched to {} mode. How would you like to proceed?",
            mode
        ))
    }

    #[tool(description = "Select a programming concept from the loaded course to focus on.")]
    pub async fn select_concept(&self, args: Parameters<SelectConceptArgs>) -> Result<String, String> {
        let response = {
            let mut state = self.state.lock().await;
            if state.concepts.is_empty() {
                return Ok(
                    "Please select a course first using the select_course tool.".to_string(),
                );
            }
            match best_match(&args.0.concept, &state.concepts, |c| {
                vec![c.title.as_str(), c.id.as_str()]
            }) {
                Some(concept) => {
                    let concept = concept.clone();
                    let reply = format!("Selected {}. Ready for {} mode!", concept.title, state.mode);
                    state.current_concept = Some(concept);
                    reply
                }
                None => {
                    let available = state
                        .concepts
                        .iter()
                        .map(|c| c.title.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!(
                        "Concept '{}' not found. Available concepts: {}",
                        args.0.concept, available
                    )
                }
            }
        };
        self.broadcast().await;
        Ok(response)
    }

    #[tool(description = "Load one of the available courses by name.")]
    pub async fn select_course(&self, args: Parameters<SelectCourseArgs>) -> Result<String, String> {
        let Some(course) = best_match(&args.0.course, &self.library.courses, |c| {
            vec![c.name.as_str()]
        }) else {
            let available = self.library.course_names().join(", ");
            return Ok(format!(
                "Course '{}' not found. Available courses: {}",
                args.0.course, available
            ));
        };
        {
            let mut state = self.state.lock().await;
            state.course = Some(course.name.clone());
            state.concepts = course.concepts.clone();
            state.current_concept = None;
        }
        info!(course = %course.name, "Course selected");
        self.broadcast().await;
        Ok(format!(
            "Selected the {} course with {} concepts. Now choose a learning mode and a concept!",
            course.name,
            course.concepts.len()
        ))
    }

    #[tool(description = "List all available courses.")]
    pub async fn list_courses(&self) -> Result<String, String> {
        if self.library.courses.is_empty() {
            return Ok(
                "No courses available. Please add JSON course files to the data directory."
                    .to_string(),
            );
        }
        Ok(format!(
            "Available courses: {}. Use select_course to choose one.",
            self.library.course_names().join(", ")
        ))
    }
}

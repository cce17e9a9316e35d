//! Improv persona: the Bollywood game show state and its tool service.
//!
//! A game is a fixed number of rounds. Each round hands the contestant a
//! random scenario from the deck (never repeating one within a game while
//! unused scenarios remain), and each performance earns a reaction drawn
//! from one of three quality bands together with a score inside that band's
//! range. The final report rates the cumulative score against thresholds.

use crate::persona::PersonaState;
use crate::voice::HostMood;
use chrono::{DateTime, Utc};
use rand::{Rng, rng, seq::IndexedRandom};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::info;

pub const MAX_ROUNDS: u32 = 3;
pub const POINTS_PER_ROUND: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Intro,
    AwaitingImprov,
    Reacting,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEntry {
    pub round_number: u32,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceNote {
    pub round: u32,
    pub reaction: String,
    pub band: ReactionBand,
    pub points: u32,
    pub mood: HostMood,
    pub noted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub player_name: Option<String>,
    pub current_round: u32,
    pub max_rounds: u32,
    pub rounds: Vec<RoundEntry>,
    pub phase: GamePhase,
    pub masala_score: u32,
    pub performance_notes: Vec<PerformanceNote>,
    pub mood: HostMood,
    pub started_at: DateTime<Utc>,
    /// Scenario deck seeded from the content library at session start.
    #[serde(default)]
    pub scenarios: Vec<String>,
}

impl GameState {
    pub fn new(scenarios: Vec<String>) -> Self {
        Self {
            player_name: None,
            current_round: 0,
            max_rounds: MAX_ROUNDS,
            rounds: Vec::new(),
            phase: GamePhase::Intro,
            masala_score: 0,
            performance_notes: Vec::new(),
            mood: HostMood::Enthusiastic,
            started_at: Utc::now(),
            scenarios,
        }
    }

    pub fn is_over(&self) -> bool {
        self.phase == GamePhase::Done
    }

    pub fn max_score(&self) -> u32 {
        self.max_rounds * POINTS_PER_ROUND
    }
}

/// Quality band a performance lands in. Bands carry their own reaction
/// phrases, an inclusive score range, and the mood the host shifts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionBand {
    Superhit,
    Hit,
    Average,
}

impl ReactionBand {
    pub const ALL: [ReactionBand; 3] =
        [ReactionBand::Superhit, ReactionBand::Hit, ReactionBand::Average];

    /// Inclusive score range for the band.
    pub fn score_range(&self) -> (u32, u32) {
        match self {
            ReactionBand::Superhit => (9, 10),
            ReactionBand::Hit => (7, 9),
            ReactionBand::Average => (5, 7),
        }
    }

    pub fn mood(&self) -> HostMood {
        match self {
            ReactionBand::Superhit => HostMood::Dramatic,
            ReactionBand::Hit => HostMood::Enthusiastic,
            ReactionBand::Average => HostMood::Friendly,
        }
    }

    fn phrases(&self) -> &'static [&'static str] {
        match self {
            ReactionBand::Superhit => &[
                "Kyaaaa baat hai! Yeh toh blockbuster scene tha, yaar!",
                "Waah! Aapke andar toh Shah Rukh Khan chhupta hai!",
                "Arey wah! Itna emotion, itna drama... dil jeet liya aapne!",
            ],
            ReactionBand::Hit => &[
                "Shabaash! Aapka performance dekh kar maza aa gaya!",
                "Bohot hard! Aamir Khan bhi proud hote!",
                "Kamaal kar diya aapne! Bollywood ko aap jaise talent ki zaroorat hai!",
            ],
            ReactionBand::Average => &[
                "Achha try kiya! Thoda aur practice karo, star ban jaoge!",
                "Shuruat acchi hai! Aap mein potential hai, beta!",
                "Not bad! Lekin remember, Bollywood mein zyada masala chahiye!",
            ],
        }
    }
}

const FEEDBACK_LINES: [&str; 6] = [
    "Aapki dialogue delivery SRK jaisi thi!",
    "Aapne scene mein ek dum desi tadka daal diya!",
    "Yeh performance toh 100 crore ki movie ke layak hai!",
    "Aapne Indian emotions ko perfect dikhaya!",
    "Aapka comic timing Rohit Shetty movie jaisa tha!",
    "Aapne toh typical Bollywood masala perfect diya!",
];

const HINGLISH_TAGS: [&str; 4] = [
    "Bohot badhiya tha!",
    "Ek dum mast!",
    "Maza aa gaya!",
    "Jadoo kar diya aapne!",
];

const ROUND_MOODS: [HostMood; 5] = [
    HostMood::Dramatic,
    HostMood::Enthusiastic,
    HostMood::Comic,
    HostMood::Emotional,
    HostMood::Action,
];

/// A fully drawn reaction: band, flavored text, and awarded points.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub band: ReactionBand,
    pub text: String,
    pub points: u32,
}

/// Draws a reaction uniformly: random band, random phrase from the band's
/// table, random score within the band's inclusive range, an optional
/// feedback line, and a closing Hinglish tag.
pub fn draw_reaction<R: Rng>(rng: &mut R) -> Reaction {
    let band = *ReactionBand::ALL
        .choose(rng)
        .expect("band table is non-empty");
    let (low, high) = band.score_range();
    let points = rng.random_range(low..=high);

    let mut text = band
        .phrases()
        .choose(rng)
        .expect("phrase table is non-empty")
        .to_string();
    if rng.random_bool(0.5) {
        text.push(' ');
        text.push_str(FEEDBACK_LINES.choose(rng).expect("feedback table is non-empty"));
    }
    text.push(' ');
    text.push_str(HINGLISH_TAGS.choose(rng).expect("tag table is non-empty"));

    Reaction { band, text, points }
}

/// Star rating for the final report: at least 80% of the maximum score is a
/// superstar, at least 60% a hit hero, anything below a rising star.
pub fn final_rating(score: u32, max_score: u32) -> (&'static str, &'static [&'static str]) {
    if score * 10 >= max_score * 8 {
        (
            "SUPERSTAR",
            &[
                "Aap toh ekdum seeti-maar performance de gaye! Bollywood waiting hai aapke liye!",
                "Kya baat hai! Aap mein toh next big Bollywood star dikh raha hai!",
                "Waah! Aapki acting ne toh humara dil jeet liya! Blockbuster performance!",
            ],
        )
    } else if score * 10 >= max_score * 6 {
        (
            "HIT HERO",
            &[
                "Shabaash! Aapki performance ne toh housefull show kar diya!",
                "Bohot khoob! Aap mein real talent hai, beta!",
                "Kamaal kar diya aapne! Aapka future bright hai!",
            ],
        )
    } else {
        (
            "RISING STAR",
            &[
                "Aapne toh shuruat kar di! Ab practice karo aur star ban jaoge!",
                "Achha try kiya! Aap mein potential hai, bas thoda aur masala chahiye!",
                "Shuruat acchi hai! Aap seekh rahe ho, yeh important hai!",
            ],
        )
    }
}

/// Picks a scenario the game has not used yet; once the deck is exhausted any
/// scenario may repeat.
fn pick_scenario<R: Rng>(rng: &mut R, deck: &[String], used: &HashSet<&str>) -> Option<String> {
    let fresh: Vec<&String> = deck.iter().filter(|s| !used.contains(s.as_str())).collect();
    if fresh.is_empty() {
        deck.choose(rng).cloned()
    } else {
        fresh.choose(rng).map(|s| (*s).clone())
    }
}

// --- Tool argument structs ---

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SetPlayerNameArgs {
    #[schemars(description = "The contestant's name")]
    pub name: String,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct ReactArgs {
    #[schemars(description = "What the contestant performed, if a transcript is available")]
    pub performance: Option<String>,
}

/// Tool service for the improv host persona.
pub struct ImprovService {
    pub game: Arc<Mutex<GameState>>,
    pub state_tx: Option<mpsc::Sender<PersonaState>>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for ImprovService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl ImprovService {
    pub fn new(game: Arc<Mutex<GameState>>, state_tx: Option<mpsc::Sender<PersonaState>>) -> Self {
        Self {
            game,
            state_tx,
            tool_router: Self::tool_router(),
        }
    }

    async fn broadcast(&self) {
        if let Some(tx) = &self.state_tx {
            let snapshot = PersonaState::Improv(self.game.lock().await.clone());
            if tx.send(snapshot).await.is_err() {
                tracing::warn!("Failed to broadcast game update: receiver dropped.");
            }
        }
    }

    #[tool(description = "Record the contestant's name before the first round.")]
    pub async fn set_player_name(&self, args: Parameters<SetPlayerNameArgs>) -> Result<String, String> {
        let name = args.0.name.trim().to_string();
        if name.is_empty() {
            return Ok("Arre, naam toh bataiye, jaaneman!".to_string());
        }
        let response = {
            let mut game = self.game.lock().await;
            game.player_name = Some(name.clone());
            let openers = [
                format!("Waah! Kya naam hai {}! Aapka naam hi superstar jaisa hai!", name),
                format!("Arey wah {}! Aapka naam sun kar hi lagta hai aap star banoge!", name),
                format!("{} beta! Aapka naam toh hit movie jaisa hai!", name),
            ];
            let mut rng = rng();
            let mut response = openers
                .choose(&mut rng)
                .expect("opener table is non-empty")
                .clone();
            response.push_str(
                " Chalo, pehla scene shuru karte hain! Ready ho jaiye apna best performance dene ke liye!",
            );
            response
        };
        info!("Player name set");
        self.broadcast().await;
        Ok(response)
    }

    #[tool(description = "Start the next improv round and hand the contestant a scenario.")]
    pub async fn start_round(&self) -> Result<String, String> {
        let response = {
            let mut game = self.game.lock().await;
            if game.is_over() {
                return Ok(
                    "Arre, show toh khatam ho gaya, dost! Final report ke liye end_game dekhiye!"
                        .to_string(),
                );
            }
            let mut rng = rng();
            let used: HashSet<&str> = game.rounds.iter().map(|r| r.scenario.as_str()).collect();
            let Some(scenario) = pick_scenario(&mut rng, &game.scenarios, &used) else {
                return Ok(
                    "Arre yaar! Scenario ka pitara khali hai. Kuch technical dikkat hai, jaaneman!"
                        .to_string(),
                );
            };
            game.current_round += 1;
            game.phase = GamePhase::AwaitingImprov;
            game.mood = *ROUND_MOODS.choose(&mut rng).expect("mood table is non-empty");
            let round_number = game.current_round;
            game.rounds.push(RoundEntry {
                round_number,
                scenario: scenario.clone(),
                started_at: Utc::now(),
            });

            let intros = [
                format!("Dhishoom! Dhishoom! Round {} aa gaya! Ready hai?", game.current_round),
                format!(
                    "Arey waah! Ab shuru hota hai asli drama! Round {} ka scene!",
                    game.current_round
                ),
                format!(
                    "Chalo bhaiyon aur behno! Taiyar ho jaiye Round {} ke liye!",
                    game.current_round
                ),
                format!(
                    "Kya baat hai! Round {} ka tadka lagne wala hai!",
                    game.current_round
                ),
            ];
            format!(
                "{}\n\nYOUR BOLLYWOOD SCENE: {}\n\nAb aapki baari! Jee bhar ke perform kariye! Remember: zyada drama, zyada emotion, zyada masala!",
                intros.choose(&mut rng).expect("intro table is non-empty"),
                scenario
            )
        };
        info!("Round started");
        self.broadcast().await;
        Ok(response)
    }

    #[tool(description = "React to the contestant's performance and award masala points.")]
    pub async fn react_to_performance(&self, args: Parameters<ReactArgs>) -> Result<String, String> {
        if let Some(performance) = &args.0.performance {
            info!(chars = performance.len(), "Reacting to performance transcript");
        }
        let response = {
            let mut game = self.game.lock().await;
            if game.rounds.is_empty() {
                return Ok(
                    "Kuch toh gadbad hai, Daya! Pehle start_round se scene shuru kariye, phir perform!"
                        .to_string(),
                );
            }
            if game.is_over() {
                return Ok(
                    "Show khatam, dost! Ab sirf final report bachi hai, end_game bulaiye!"
                        .to_string(),
                );
            }
            game.phase = GamePhase::Reacting;

            let reaction = {
                let mut rng = rng();
                draw_reaction(&mut rng)
            };
            game.masala_score += reaction.points;
            game.mood = reaction.band.mood();
            let round = game.current_round;
            let mood = game.mood;
            game.performance_notes.push(PerformanceNote {
                round,
                reaction: reaction.text.clone(),
                band: reaction.band,
                points: reaction.points,
                mood,
                noted_at: Utc::now(),
            });

            let mut response = format!(
                "{}\n\nMasala Points: {}\nTotal: {} / {}",
                reaction.text,
                reaction.points,
                game.masala_score,
                game.max_score()
            );
            if game.current_round >= game.max_rounds {
                game.phase = GamePhase::Done;
                response.push_str(
                    "\n\nAUR KHATAM! Kya shandaar performance thi! Chalo, final score batate hain...",
                );
            } else {
                let next = [
                    "Chalo, agla round shuru karte hain!",
                    "Ab ready ho jaiye next scene ke liye!",
                    "Aage badhte hain! Next round ka intezaar hai!",
                ];
                let mut rng = rng();
                response.push_str("\n\n");
                response.push_str(next.choose(&mut rng).expect("next table is non-empty"));
            }
            response
        };
        info!("Performance scored");
        self.broadcast().await;
        Ok(response)
    }

    #[tool(description = "End the game and deliver the final Bollywood-style report.")]
    pub async fn end_game(&self) -> Result<String, String> {
        let response = {
            let mut game = self.game.lock().await;
            game.phase = GamePhase::Done;
            game.mood = HostMood::Emotional;

            let (title, summaries) = final_rating(game.masala_score, game.max_score());
            let player = game.player_name.clone().unwrap_or_else(|| "jaaneman".to_string());
            let mut rng = rng();
            let summary = summaries.choose(&mut rng).expect("summary table is non-empty");
            let strengths = [
                "Aapki dialogue delivery filmy style ki thi!",
                "Aapne Indian emotions ko perfect dikhaya!",
                "Aapki comic timing toh Rohit Shetty movie jaisi thi!",
                "Aapne drama ko perfect handle kiya!",
                "Aapne typical Bollywood masala perfect diya!",
            ];
            let sign_offs = [
                format!("Dhanyavaad {}! Aapne humara dil jeet liya aaj!", player),
                format!("Shukriya {}! Aapki performance yaad rahegi humein!", player),
                format!("Khatam nahi hoti film, bas interval hota hai! Phir milenge {}!", player),
            ];
            format!(
                "BOLLYWOOD IMPROV DHAMAKA - FINAL REPORT\n\nRating: {}\nTotal Masala Score: {} / {}\nRounds Completed: {}\n\nHOST'S VERDICT: {}\n\nYour Strength: {}\n\n{}\n\nYeh raha aapka host Raj Masala King Kapoor, kehta hai: Picture abhi baaki hai mere dost!",
                title,
                game.masala_score,
                game.max_score(),
                game.current_round,
                summary,
                strengths.choose(&mut rng).expect("strength table is non-empty"),
                sign_offs.choose(&mut rng).expect("sign-off table is non-empty"),
            )
        };
        info!("Game ended");
        self.broadcast().await;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck() -> Vec<String> {
        (1..=5).map(|i| format!("Scene {}", i)).collect()
    }

    #[test]
    fn reaction_scores_stay_inside_their_band() {
        let mut rng = rng();
        for _ in 0..200 {
            let reaction = draw_reaction(&mut rng);
            let (low, high) = reaction.band.score_range();
            assert!(
                (low..=high).contains(&reaction.points),
                "{:?} awarded {} outside {}..={}",
                reaction.band,
                reaction.points,
                low,
                high
            );
            assert!(!reaction.text.is_empty());
        }
    }

    #[test]
    fn rating_thresholds() {
        assert_eq!(final_rating(24, 30).0, "SUPERSTAR");
        assert_eq!(final_rating(30, 30).0, "SUPERSTAR");
        assert_eq!(final_rating(18, 30).0, "HIT HERO");
        assert_eq!(final_rating(23, 30).0, "HIT HERO");
        assert_eq!(final_rating(17, 30).0, "RISING STAR");
        assert_eq!(final_rating(0, 30).0, "RISING STAR");
    }

    #[test]
    fn scenario_pick_avoids_used_until_exhausted() {
        let mut rng = rng();
        let deck = deck();
        let mut used: HashSet<&str> = HashSet::new();
        used.insert("Scene 1");
        used.insert("Scene 2");
        for _ in 0..50 {
            let pick = pick_scenario(&mut rng, &deck, &used).unwrap();
            assert!(pick != "Scene 1" && pick != "Scene 2");
        }

        let all: HashSet<&str> = deck.iter().map(|s| s.as_str()).collect();
        // Deck exhausted: any scenario may come back.
        assert!(pick_scenario(&mut rng, &deck, &all).is_some());
        assert!(pick_scenario(&mut rng, &[], &HashSet::new()).is_none());
    }

    #[tokio::test]
    async fn cumulative_score_is_the_sum_of_awards() {
        let game = Arc::new(Mutex::new(GameState::new(deck())));
        let service = ImprovService::new(game.clone(), None);

        service
            .set_player_name(Parameters(SetPlayerNameArgs { name: "Asha".into() }))
            .await
            .unwrap();

        for _ in 0..MAX_ROUNDS {
            service.start_round().await.unwrap();
            service
                .react_to_performance(Parameters(ReactArgs { performance: None }))
                .await
                .unwrap();
        }

        let state = game.lock().await;
        assert_eq!(state.phase, GamePhase::Done);
        assert_eq!(state.current_round, MAX_ROUNDS);
        assert_eq!(state.performance_notes.len(), MAX_ROUNDS as usize);
        let total: u32 = state.performance_notes.iter().map(|n| n.points).sum();
        assert_eq!(state.masala_score, total);
        for note in &state.performance_notes {
            let (low, high) = note.band.score_range();
            assert!((low..=high).contains(&note.points));
        }
    }

    #[tokio::test]
    async fn reacting_before_any_round_stays_in_character() {
        let game = Arc::new(Mutex::new(GameState::new(deck())));
        let service = ImprovService::new(game.clone(), None);

        let reply = service
            .react_to_performance(Parameters(ReactArgs { performance: None }))
            .await
            .unwrap();
        assert!(reply.contains("start_round"));
        assert_eq!(game.lock().await.masala_score, 0);
    }

    #[tokio::test]
    async fn rounds_never_repeat_a_scenario_while_deck_lasts() {
        let game = Arc::new(Mutex::new(GameState::new(deck())));
        let service = ImprovService::new(game.clone(), None);

        for _ in 0..MAX_ROUNDS {
            service.start_round().await.unwrap();
        }
        let state = game.lock().await;
        let scenarios: HashSet<&str> = state.rounds.iter().map(|r| r.scenario.as_str()).collect();
        assert_eq!(scenarios.len(), MAX_ROUNDS as usize);
    }

    #[tokio::test]
    async fn end_game_reports_the_final_score() {
        let game = Arc::new(Mutex::new(GameState::new(deck())));
        let service = ImprovService::new(game.clone(), None);

        service.start_round().await.unwrap();
        service
            .react_to_performance(Parameters(ReactArgs { performance: None }))
            .await
            .unwrap();
        let report = service.end_game().await.unwrap();

        let state = game.lock().await;
        assert!(state.is_over());
        assert!(report.contains("FINAL REPORT"));
        assert!(report.contains(&format!("{} / {}", state.masala_score, state.max_score())));
    }
}

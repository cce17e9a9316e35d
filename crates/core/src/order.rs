//! Barista persona: coffee order state and its tool service.
//!
//! The order is a flat record filled in one field at a time by tool calls.
//! An order is complete once drink type, size, milk, and customer name are
//! all set; `complete_order` then flips it to confirmed, which is what the
//! session runtime watches for to archive the order to disk.

use crate::persona::PersonaState;
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DrinkType {
    Latte,
    Cappuccino,
    Americano,
    Espresso,
    Mocha,
    Coffee,
    #[serde(rename = "cold brew")]
    ColdBrew,
    Matcha,
}

impl fmt::Display for DrinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DrinkType::Latte => "Latte",
            DrinkType::Cappuccino => "Cappuccino",
            DrinkType::Americano => "Americano",
            DrinkType::Espresso => "Espresso",
            DrinkType::Mocha => "Mocha",
            DrinkType::Coffee => "Coffee",
            DrinkType::ColdBrew => "Cold Brew",
            DrinkType::Matcha => "Matcha",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DrinkSize {
    Small,
    Medium,
    Large,
    #[serde(rename = "extra large")]
    ExtraLarge,
}

impl fmt::Display for DrinkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DrinkSize::Small => "Small",
            DrinkSize::Medium => "Medium",
            DrinkSize::Large => "Large",
            DrinkSize::ExtraLarge => "Extra Large",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MilkChoice {
    Whole,
    Skim,
    Almond,
    Oat,
    Soy,
    Coconut,
    None,
}

impl fmt::Display for MilkChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MilkChoice::Whole => "Whole",
            MilkChoice::Skim => "Skim",
            MilkChoice::Almond => "Almond",
            MilkChoice::Oat => "Oat",
            MilkChoice::Soy => "Soy",
            MilkChoice::Coconut => "Coconut",
            MilkChoice::None => "No",
        };
        f.write_str(label)
    }
}

/// Lifecycle of a single order within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Collecting,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OrderState {
    pub drink_type: Option<DrinkType>,
    pub size: Option<DrinkSize>,
    pub milk: Option<MilkChoice>,
    pub extras: Vec<String>,
    pub customer_name: Option<String>,
    pub status: OrderStatus,
}

impl OrderState {
    /// Required fields: drink type, size, milk, customer name.
    pub fn is_complete(&self) -> bool {
        self.drink_type.is_some()
            && self.size.is_some()
            && self.milk.is_some()
            && self.customer_name.is_some()
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == OrderStatus::Confirmed
    }

    /// Human-readable names of every required field still unset.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.drink_type.is_none() {
            missing.push("drink type");
        }
        if self.size.is_none() {
            missing.push("size");
        }
        if self.milk.is_none() {
            missing.push("milk");
        }
        if self.customer_name.is_none() {
            missing.push("name");
        }
        missing
    }

    /// One-line recap of whatever has been collected so far.
    pub fn summary(&self) -> String {
        if self.drink_type.is_none()
            && self.size.is_none()
            && self.milk.is_none()
            && self.customer_name.is_none()
            && self.extras.is_empty()
        {
            return "No items collected yet.".to_string();
        }
        let size = self
            .size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string());
        let drink = self
            .drink_type
            .map(|d| d.to_string())
            .unwrap_or_else(|| "?".to_string());
        let milk = self
            .milk
            .map(|m| format!("{} milk", m))
            .unwrap_or_else(|| "? milk".to_string());
        let extras = if self.extras.is_empty() {
            String::new()
        } else {
            format!(" with {}", self.extras.join(", "))
        };
        let name = self.customer_name.as_deref().unwrap_or("?");
        format!("{} {} with {}{} for {}", size, drink, milk, extras, name)
    }
}

/// Trims, lowercases, and drops empty entries from a requested extras list.
fn normalize_extras(extras: Option<Vec<String>>) -> Vec<String> {
    extras
        .unwrap_or_default()
        .into_iter()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Title-cases each word of a customer name.
fn clean_name(name: &str) -> String {
    name.trim()
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// --- Tool argument structs ---

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SetDrinkTypeArgs {
    #[schemars(description = "The type of coffee drink")]
    pub drink: DrinkType,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SetSizeArgs {
    #[schemars(description = "The drink size")]
    pub size: DrinkSize,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SetMilkArgs {
    #[schemars(description = "The type of milk, or 'none' for black coffee")]
    pub milk: MilkChoice,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SetExtrasArgs {
    #[schemars(description = "Extras such as syrups or an extra shot; omit for none")]
    pub extras: Option<Vec<String>>,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SetNameArgs {
    #[schemars(description = "The customer's name for the order")]
    pub name: String,
}

/// Tool service for the barista persona.
pub struct BaristaService {
    pub order: Arc<Mutex<OrderState>>,
    pub state_tx: Option<mpsc::Sender<PersonaState>>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for BaristaService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl BaristaService {
    pub fn new(
        order: Arc<Mutex<OrderState>>,
        state_tx: Option<mpsc::Sender<PersonaState>>,
    ) -> Self {
        Self {
            order,
            state_tx,
            tool_router: Self::tool_router(),
        }
    }

    async fn broadcast(&self) {
        if let Some(tx) = &self.state_tx {
            let snapshot = PersonaState::Barista(self.order.lock().await.clone());
            if tx.send(snapshot).await.is_err() {
                tracing::warn!("Failed to broadcast order update: receiver dropped.");
            }
        }
    }

    #[tool(description = "Record the type of drink the customer wants.")]
    pub async fn set_drink_type(&self, args: Parameters<SetDrinkTypeArgs>) -> Result<String, String> {
        let drink = args.0.drink;
        let summary = {
            let mut order = self.order.lock().await;
            order.drink_type = Some(drink);
            order.summary()
        };
        info!(drink = %drink, "Drink type set");
        self.broadcast().await;
        Ok(format!("Got it, one {}. {}", drink, summary))
    }

    #[tool(description = "Record the drink size.")]
    pub async fn set_size(&self, args: Parameters<SetSizeArgs>) -> Result<String, String> {
        let size = args.0.size;
        let summary = {
            let mut order = self.order.lock().await;
            order.size = Some(size);
            order.summary()
        };
        info!(size = %size, "Size set");
        self.broadcast().await;
        Ok(format!("{} it is. {}", size, summary))
    }

    #[tool(description = "Record the milk choice, including 'none' for black coffee.")]
    pub async fn set_milk(&self, args: Parameters<SetMilkArgs>) -> Result<String, String> {
        let milk = args.0.milk;
        let summary = {
            let mut order = self.order.lock().await;
            order.milk = Some(milk);
            order.summary()
        };
        info!(milk = %milk, "Milk set");
        self.broadcast().await;
        if milk == MilkChoice::None {
            return Ok("Black coffee, bold and simple!".to_string());
        }
        Ok(format!("{} milk. {}", milk, summary))
    }

    #[tool(description = "Record any extras for the drink, replacing the previous list.")]
    pub async fn set_extras(&self, args: Parameters<SetExtrasArgs>) -> Result<String, String> {
        let items = normalize_extras(args.0.extras);
        {
            let mut order = self.order.lock().await;
            order.extras = items.clone();
        }
        info!(extras = ?items, "Extras set");
        self.broadcast().await;
        if items.is_empty() {
            return Ok("No extras added.".to_string());
        }
        Ok(format!("Added: {}.", items.join(", ")))
    }

    #[tool(description = "Record the customer's name for the order.")]
    pub async fn set_name(&self, args: Parameters<SetNameArgs>) -> Result<String, String> {
        let cleaned = clean_name(&args.0.name);
        if cleaned.is_empty() {
            return Ok("Sorry, I didn't catch the name. Could you repeat it?".to_string());
        }
        let summary = {
            let mut order = self.order.lock().await;
            order.customer_name = Some(cleaned.clone());
            order.summary()
        };
        info!(name = %cleaned, "Name set");
        self.broadcast().await;
        Ok(format!("Thanks, {}! {}", cleaned, summary))
    }

    #[tool(
        description = "Confirm the order once drink type, size, milk, and name are all collected."
    )]
    pub async fn complete_order(&self) -> Result<String, String> {
        let response = {
            let mut order = self.order.lock().await;
            if !order.is_complete() {
                let missing = order.missing_fields();
                info!(?missing, "complete_order called with missing fields");
                format!("Almost there, I still need: {}.", missing.join(", "))
            } else {
                order.status = OrderStatus::Confirmed;
                info!("Order confirmed");
                format!(
                    "Order confirmed! {} Your drink will be ready in three to five minutes. Thank you!",
                    order.summary()
                )
            }
        };
        self.broadcast().await;
        Ok(response)
    }

    #[tool(description = "Report how far along the current order is.")]
    pub async fn get_order_status(&self) -> Result<String, String> {
        let order = self.order.lock().await;
        if order.is_complete() {
            Ok(format!("Your order is complete! {}", order.summary()))
        } else {
            Ok(format!("In progress: {}", order.summary()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_order() -> OrderState {
        OrderState {
            drink_type: Some(DrinkType::Latte),
            size: Some(DrinkSize::Medium),
            milk: Some(MilkChoice::Oat),
            extras: vec!["vanilla".into()],
            customer_name: Some("Sam".into()),
            status: OrderStatus::Collecting,
        }
    }

    #[test]
    fn completeness_requires_all_four_fields() {
        let mut order = filled_order();
        assert!(order.is_complete());
        assert!(order.missing_fields().is_empty());

        order.milk = None;
        order.customer_name = None;
        assert!(!order.is_complete());
        assert_eq!(order.missing_fields(), vec!["milk", "name"]);

        let empty = OrderState::default();
        assert_eq!(
            empty.missing_fields(),
            vec!["drink type", "size", "milk", "name"]
        );
    }

    #[test]
    fn extras_are_optional_for_completeness() {
        let mut order = filled_order();
        order.extras.clear();
        assert!(order.is_complete());
    }

    #[test]
    fn summary_reads_naturally() {
        assert_eq!(OrderState::default().summary(), "No items collected yet.");
        assert_eq!(
            filled_order().summary(),
            "Medium Latte with Oat milk with vanilla for Sam"
        );
    }

    #[test]
    fn extras_normalization_drops_blanks() {
        let items = normalize_extras(Some(vec![
            "  Vanilla ".into(),
            "".into(),
            "  ".into(),
            "CARAMEL".into(),
        ]));
        assert_eq!(items, vec!["vanilla", "caramel"]);
        assert!(normalize_extras(None).is_empty());
    }

    #[test]
    fn names_are_title_cased() {
        assert_eq!(clean_name("  sam o'neil  "), "Sam O'neil");
        assert_eq!(clean_name("PRIYA sharma"), "Priya Sharma");
        assert_eq!(clean_name("   "), "");
    }

    #[tokio::test]
    async fn complete_order_reports_missing_fields_by_name() {
        let order = Arc::new(Mutex::new(OrderState::default()));
        let service = BaristaService::new(order.clone(), None);

        service
            .set_drink_type(Parameters(SetDrinkTypeArgs {
                drink: DrinkType::Mocha,
            }))
            .await
            .unwrap();
        let reply = service.complete_order().await.unwrap();
        assert!(reply.contains("size"));
        assert!(reply.contains("milk"));
        assert!(reply.contains("name"));
        assert!(!reply.contains("drink type"));
        assert!(!order.lock().await.is_confirmed());
    }

    #[tokio::test]
    async fn full_tool_flow_confirms_and_broadcasts() {
        let order = Arc::new(Mutex::new(OrderState::default()));
        let (tx, mut rx) = mpsc::channel(16);
        let service = BaristaService::new(order.clone(), Some(tx));

        service
            .set_drink_type(Parameters(SetDrinkTypeArgs {
                drink: DrinkType::ColdBrew,
            }))
            .await
            .unwrap();
        service
            .set_size(Parameters(SetSizeArgs {
                size: DrinkSize::Large,
            }))
            .await
            .unwrap();
        let milk_reply = service
            .set_milk(Parameters(SetMilkArgs {
                milk: MilkChoice::None,
            }))
            .await
            .unwrap();
        assert!(milk_reply.contains("Black coffee"));
        service
            .set_name(Parameters(SetNameArgs {
                name: "ravi".into(),
            }))
            .await
            .unwrap();

        let reply = service.complete_order().await.unwrap();
        assert!(reply.contains("Order confirmed"));
        assert!(order.lock().await.is_confirmed());

        // Every mutation broadcast a snapshot; the last one is confirmed.
        let mut last = None;
        while let Ok(state) = rx.try_recv() {
            last = Some(state);
        }
        match last {
            Some(PersonaState::Barista(order)) => assert!(order.is_confirmed()),
            other => panic!("Expected barista snapshot, got {:?}", other),
        }
    }

    #[test]
    fn drink_enum_serde_matches_spoken_names() {
        assert_eq!(
            serde_json::to_string(&DrinkType::ColdBrew).unwrap(),
            "\"cold brew\""
        );
        let size: DrinkSize = serde_json::from_str("\"extra large\"").unwrap();
        assert_eq!(size, DrinkSize::ExtraLarge);
    }
}

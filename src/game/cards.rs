use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Catalog identifier of a card definition, e.g. `"kriper"`.
pub type CardId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardType {
    #[default]
    Unit,
    Spell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    /// Copies of one card a legal deck may hold.
    pub fn max_copies(self) -> usize {
        match self {
            Rarity::Legendary => 1,
            _ => 3,
        }
    }
}

/// When an effect fires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectTrigger {
    /// On play.
    Warshout,
    /// On attack.
    Strike,
    /// On death.
    Deathblow,
    /// On killing an enemy unit.
    Deathstrike,
    /// Passive: enemies must attack taunt units first.
    Taunt,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetSelector {
    #[default]
    #[serde(rename = "SELF")]
    SelfUnit,
    Ally,
    Enemy,
    All,
    Any,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectAction {
    Damage,
    Heal,
    Buff,
    Draw,
    Root,
    ReduceCost,
    Push,
    Pull,
    Teleport,
    Discard,
    ReturnToHand,
    Resurrect,
    Stun,
    Summon,
}

impl EffectAction {
    /// Actions that act on the controller's resources instead of a chosen
    /// board target.
    pub fn is_untargeted(self) -> bool {
        matches!(self, EffectAction::Draw | EffectAction::ReduceCost)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EffectArea {
    Single,
    All,
    Adjacent,
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CardLocation {
    Field,
    Hand,
    Graveyard,
}

/// Controller relative to the acting player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerFilter {
    #[serde(rename = "SELF")]
    Own,
    Enemy,
    Any,
}

/// Narrows the candidate set of an effect. Every bound is optional; an empty
/// filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetFilter {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub card_type: Option<CardType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cost: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_attack: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attack: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_effect: Option<EffectTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<CardLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerFilter>,
    #[serde(default, rename = "inYAR")]
    pub in_yar: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_rooted: Option<bool>,
}

/// A declared effect on a card, copied onto every unit the card creates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CardEffect {
    pub trigger: EffectTrigger,
    #[serde(default)]
    pub target: TargetSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<EffectAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<TargetFilter>,
    #[serde(default)]
    pub requires_targeting: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<EffectArea>,
    /// Restrict targets to the acting player's area of ruling.
    #[serde(default)]
    pub yar: bool,
}

impl CardEffect {
    pub fn new(trigger: EffectTrigger, target: TargetSelector) -> Self {
        Self {
            trigger,
            target,
            value: None,
            action: None,
            filter: None,
            requires_targeting: false,
            area: None,
            yar: false,
        }
    }

    pub fn taunt() -> Self {
        Self::new(EffectTrigger::Taunt, TargetSelector::SelfUnit)
    }

    pub fn with_action(mut self, action: EffectAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_value(mut self, value: i32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_filter(mut self, filter: TargetFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_area(mut self, area: EffectArea) -> Self {
        self.area = Some(area);
        self
    }

    pub fn interactive(mut self) -> Self {
        self.requires_targeting = true;
        self
    }

    pub fn in_yar(mut self) -> Self {
        self.yar = true;
        self
    }

    /// The action this effect performs. An effect without an explicit action
    /// falls back to DAMAGE whatever its trigger; authors must set the action
    /// to get anything else.
    pub fn resolved_action(&self) -> EffectAction {
        if let Some(action) = self.action {
            return action;
        }
        log::warn!(
            "effect {:?} has no explicit action, falling back to DAMAGE",
            self.trigger
        );
        EffectAction::Damage
    }

    pub fn requires_yar(&self) -> bool {
        self.yar || self.filter.as_ref().is_some_and(|filter| filter.in_yar)
    }
}

/// Immutable card definition owned by the catalog. Decks, hands and
/// graveyards hold value copies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub cost: u32,
    #[serde(default, rename = "type")]
    pub card_type: CardType,
    #[serde(default = "default_archetype")]
    pub archetype: String,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<CardEffect>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_icon")]
    pub icon: String,
}

fn default_archetype() -> String {
    "Neutral".into()
}

fn default_icon() -> String {
    "🃏".into()
}

impl Card {
    pub fn unit(
        id: impl Into<CardId>,
        name: impl Into<String>,
        cost: u32,
        attack: i32,
        health: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cost,
            card_type: CardType::Unit,
            archetype: default_archetype(),
            rarity: Rarity::Common,
            attack: Some(attack),
            health: Some(health),
            effects: Vec::new(),
            description: String::new(),
            icon: default_icon(),
        }
    }

    pub fn spell(id: impl Into<CardId>, name: impl Into<String>, cost: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cost,
            card_type: CardType::Spell,
            archetype: default_archetype(),
            rarity: Rarity::Common,
            attack: None,
            health: None,
            effects: Vec::new(),
            description: String::new(),
            icon: default_icon(),
        }
    }

    pub fn with_archetype(mut self, archetype: impl Into<String>) -> Self {
        self.archetype = archetype.into();
        self
    }

    pub fn with_rarity(mut self, rarity: Rarity) -> Self {
        self.rarity = rarity;
        self
    }

    pub fn with_effect(mut self, effect: CardEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_text(mut self, description: impl Into<String>, icon: impl Into<String>) -> Self {
        self.description = description.into();
        self.icon = icon.into();
        self
    }

    pub fn has_trigger(&self, trigger: EffectTrigger) -> bool {
        self.effects.iter().any(|effect| effect.trigger == trigger)
    }

    /// Structural checks applied to user-authored cards before they enter a
    /// catalog. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Card must have a name".to_string());
        }
        if self.cost > 10 {
            errors.push("Card cost must be between 0 and 10".to_string());
        }
        if self.card_type == CardType::Unit {
            if self.attack.map_or(true, |attack| attack < 0) {
                errors.push("Unit must have non-negative attack".to_string());
            }
            if self.health.map_or(true, |health| health < 1) {
                errors.push("Unit must have at least 1 health".to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

static BASE_CARDS: Lazy<Vec<Card>> = Lazy::new(|| {
    vec![
        Card::unit("kriper", "Kriper", 1, 1, 1).with_text("A basic unit.", "🦎"),
        Card::unit("mercenary", "Mercenary", 2, 2, 2).with_text("A reliable fighter.", "⚔️"),
        Card::unit("guard", "Guard", 3, 2, 4)
            .with_effect(CardEffect::taunt())
            .with_text("Taunt. Enemies must attack this unit first.", "🛡️"),
        Card::unit("berserker", "Berserker", 4, 4, 3)
            .with_archetype("Nether")
            .with_rarity(Rarity::Rare)
            .with_effect(
                CardEffect::new(EffectTrigger::Strike, TargetSelector::Enemy)
                    .with_action(EffectAction::Damage)
                    .with_value(1),
            )
            .with_text("Strike: Deal 1 extra damage to the unit it attacks.", "🗡️"),
        Card::unit("warchief", "Warchief", 5, 3, 3)
            .with_rarity(Rarity::Rare)
            .with_effect(
                CardEffect::new(EffectTrigger::Warshout, TargetSelector::Ally)
                    .with_action(EffectAction::Buff)
                    .with_area(EffectArea::All)
                    .with_value(1),
            )
            .with_text("Warshout: Give all other friendly units +1/+1.", "👑"),
        Card::unit("titan", "Titan", 6, 6, 6)
            .with_rarity(Rarity::Epic)
            .with_text("A massive unit.", "🗿"),
    ]
});

/// Immutable registry of card definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardCatalog {
    cards: BTreeMap<CardId, Card>,
    /// Insertion order, so preset decks come out in a stable order.
    order: Vec<CardId>,
}

impl CardCatalog {
    pub fn new(cards: impl IntoIterator<Item = Card>) -> Self {
        let mut catalog = Self::default();
        for card in cards {
            catalog.insert(card);
        }
        catalog
    }

    /// The built-in card set.
    pub fn base() -> Self {
        Self::new(BASE_CARDS.iter().cloned())
    }

    /// Base cards plus user-authored ones. Custom cards that fail
    /// [`Card::validate`] are logged and left out; a custom card reusing a
    /// base id replaces it.
    pub fn with_custom(custom: impl IntoIterator<Item = Card>) -> Self {
        let mut catalog = Self::base();
        for card in custom {
            match card.validate() {
                Ok(()) => catalog.insert(card),
                Err(errors) => {
                    log::warn!("skipping invalid custom card {}: {}", card.id, errors.join("; "))
                }
            }
        }
        catalog
    }

    fn insert(&mut self, card: Card) {
        if !self.cards.contains_key(&card.id) {
            self.order.push(card.id.clone());
        }
        self.cards.insert(card.id.clone(), card);
    }

    pub fn get(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.order.iter().filter_map(|id| self.cards.get(id))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_catalog_contains_starting_unit() {
        let catalog = CardCatalog::base();
        let kriper = catalog.get("kriper").expect("kriper should be a base card");
        assert_eq!(kriper.cost, 1);
        assert_eq!(kriper.card_type, CardType::Unit);
        assert_eq!(catalog.cards().next().map(|card| card.id.as_str()), Some("kriper"));
    }

    #[test]
    fn missing_action_falls_back_to_damage() {
        let effect = CardEffect::new(EffectTrigger::Warshout, TargetSelector::Enemy).with_value(2);
        assert_eq!(effect.resolved_action(), EffectAction::Damage);
        let heal = effect.clone().with_action(EffectAction::Heal);
        assert_eq!(heal.resolved_action(), EffectAction::Heal);
    }

    #[test]
    fn custom_cards_are_validated() {
        let good = Card::unit("imp", "Imp", 1, 1, 1).with_archetype("Nether");
        let bad = Card::unit("ghost", "", 12, -1, 0);
        let catalog = CardCatalog::with_custom(vec![good, bad.clone()]);
        assert!(catalog.contains("imp"));
        assert!(!catalog.contains("ghost"));
        let errors = bad.validate().expect_err("invalid card should be rejected");
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn effect_json_uses_original_field_names() {
        let json = r#"{"trigger":"WARSHOUT","target":"SELF","value":2,"action":"REDUCE_COST",
            "filter":{"archetype":"Nether","inYAR":true},"requiresTargeting":false}"#;
        let effect: CardEffect = serde_json::from_str(json).expect("effect should parse");
        assert_eq!(effect.target, TargetSelector::SelfUnit);
        assert_eq!(effect.action, Some(EffectAction::ReduceCost));
        assert!(effect.requires_yar());
    }
}

//! Deck assembly from presets or user-built lists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cards::{Card, CardCatalog, CardId, EffectTrigger, Rarity};
use super::config::GameConfig;

/// Built-in deck recipes. Each derives copy counts from the catalog, so new
/// base cards show up in presets automatically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeckPreset {
    #[default]
    BalancedStarter,
    AggroRush,
    ControlDefense,
}

impl DeckPreset {
    pub const ALL: [DeckPreset; 3] = [
        DeckPreset::BalancedStarter,
        DeckPreset::AggroRush,
        DeckPreset::ControlDefense,
    ];

    pub fn id(self) -> &'static str {
        match self {
            DeckPreset::BalancedStarter => "balanced-starter",
            DeckPreset::AggroRush => "aggro-rush",
            DeckPreset::ControlDefense => "control-defense",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            DeckPreset::BalancedStarter => "Balanced Starter",
            DeckPreset::AggroRush => "Aggro Rush",
            DeckPreset::ControlDefense => "Control Defense",
        }
    }

    /// Unknown ids fall back to the balanced starter.
    pub fn from_id(id: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|preset| preset.id() == id)
            .unwrap_or_else(|| {
                log::warn!("unknown deck preset {id}, using balanced-starter");
                DeckPreset::BalancedStarter
            })
    }

    /// Copies of `card` this recipe puts in the deck.
    pub fn copies(self, card: &Card) -> usize {
        match self {
            DeckPreset::BalancedStarter => match card.rarity {
                Rarity::Common => 3,
                Rarity::Rare => 2,
                _ => 1,
            },
            DeckPreset::AggroRush => match card.cost {
                1 => 4,
                0..=3 => 3,
                4 | 5 => 2,
                _ => 0,
            },
            DeckPreset::ControlDefense => {
                if card.has_trigger(EffectTrigger::Taunt) || card.cost >= 5 {
                    3
                } else {
                    2
                }
            }
        }
    }
}

/// One line of a user-built deck. `card` holds a stored copy of the
/// definition, used when the id is no longer in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeckEntry {
    pub card_id: CardId,
    #[serde(default = "one")]
    pub quantity: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
}

fn one() -> usize {
    1
}

impl DeckEntry {
    pub fn new(card_id: impl Into<CardId>, quantity: usize) -> Self {
        Self {
            card_id: card_id.into(),
            quantity,
            card: None,
        }
    }

    pub fn stored(card: Card, quantity: usize) -> Self {
        Self {
            card_id: card.id.clone(),
            quantity,
            card: Some(card),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomDeck {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub entries: Vec<DeckEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DeckSource {
    Preset { preset: DeckPreset },
    Custom { deck: CustomDeck },
}

impl Default for DeckSource {
    fn default() -> Self {
        DeckSource::Preset {
            preset: DeckPreset::default(),
        }
    }
}

impl From<DeckPreset> for DeckSource {
    fn from(preset: DeckPreset) -> Self {
        DeckSource::Preset { preset }
    }
}

impl DeckSource {
    pub fn name(&self) -> String {
        match self {
            DeckSource::Preset { preset } => preset.display_name().to_string(),
            DeckSource::Custom { deck } => deck.name.clone(),
        }
    }
}

/// Expands `source` into an unshuffled list of card copies, padded with the
/// starting unit up to the configured minimum.
pub fn build_deck(catalog: &CardCatalog, source: &DeckSource, config: &GameConfig) -> Vec<Card> {
    let mut deck = Vec::new();
    match source {
        DeckSource::Preset { preset } => {
            for card in catalog.cards() {
                let copies = preset.copies(card);
                deck.extend(std::iter::repeat(card).take(copies).cloned());
            }
        }
        DeckSource::Custom { deck: custom } => {
            for entry in &custom.entries {
                let card = match (catalog.get(&entry.card_id), &entry.card) {
                    (Some(card), _) => card,
                    (None, Some(stored)) => {
                        log::info!("using stored card data for {}", stored.name);
                        stored
                    }
                    (None, None) => {
                        log::error!("could not resolve card {} in deck {}", entry.card_id, custom.name);
                        continue;
                    }
                };
                deck.extend(std::iter::repeat(card).take(entry.quantity).cloned());
            }
        }
    }

    if deck.len() < config.min_deck_size {
        match catalog.get(&config.starting_unit_card) {
            Some(filler) => {
                log::warn!(
                    "deck {} has only {} cards, padding with {}",
                    source.name(),
                    deck.len(),
                    filler.name
                );
                let missing = config.min_deck_size - deck.len();
                deck.extend(std::iter::repeat(filler).take(missing).cloned());
            }
            None => log::warn!(
                "deck {} is undersized and {} is not in the catalog",
                source.name(),
                config.starting_unit_card
            ),
        }
    }

    log::info!("built deck {} with {} cards", source.name(), deck.len());
    deck
}

/// Deck-building rules: size bounds and per-rarity copy limits.
pub fn validate_deck(cards: &[Card], config: &GameConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    if cards.len() < config.min_deck_size {
        errors.push(format!(
            "Deck must contain at least {} cards",
            config.min_deck_size
        ));
    }
    if cards.len() > config.max_deck_size {
        errors.push(format!(
            "Deck cannot contain more than {} cards",
            config.max_deck_size
        ));
    }

    let mut counts: BTreeMap<&str, (usize, &Card)> = BTreeMap::new();
    for card in cards {
        counts.entry(card.id.as_str()).or_insert((0, card)).0 += 1;
    }
    for (count, card) in counts.values() {
        let limit = card.rarity.max_copies();
        if *count > limit {
            errors.push(format!(
                "{} can only have {} {} in deck",
                card.name,
                limit,
                if limit == 1 { "copy" } else { "copies" }
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

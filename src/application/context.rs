//! Bounded conversation history plus the facts established so far.

use crate::domain::{ConversationTurn, LocationRef, MessageRole, RoutePreference};
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;

const SUMMARY_TURNS: usize = 3;
const SUMMARY_TURN_CHARS: usize = 100;
const EMPTY_SUMMARY: &str = "No context available";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("context capacity must be at least one turn")]
    InvalidCapacity,
    #[error("conversation turns must not be empty")]
    EmptyTurn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionFact {
    Origin(LocationRef),
    Destination(LocationRef),
    Preference(RoutePreference),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionFacts {
    pub origin: Option<LocationRef>,
    pub destination: Option<LocationRef>,
    pub preference: Option<RoutePreference>,
}

impl SessionFacts {
    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.destination.is_none() && self.preference.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ContextStore {
    capacity: usize,
    turns: VecDeque<ConversationTurn>,
    facts: SessionFacts,
}

impl ContextStore {
    pub fn new(capacity: usize) -> Result<Self, ContextError> {
        if capacity == 0 {
            return Err(ContextError::InvalidCapacity);
        }
        Ok(Self {
            capacity,
            turns: VecDeque::with_capacity(capacity),
            facts: SessionFacts::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a turn, evicting the oldest ones beyond capacity.
    pub fn add_turn(&mut self, role: MessageRole, text: &str) -> Result<(), ContextError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ContextError::EmptyTurn);
        }
        self.turns.push_back(ConversationTurn::new(role, text));
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
        Ok(())
    }

    pub fn set_fact(&mut self, fact: SessionFact) {
        match fact {
            SessionFact::Origin(origin) => self.facts.origin = Some(origin),
            SessionFact::Destination(destination) => self.facts.destination = Some(destination),
            SessionFact::Preference(preference) => self.facts.preference = Some(preference),
        }
    }

    pub fn facts(&self) -> &SessionFacts {
        &self.facts
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.facts.is_empty()
    }

    /// Deterministic rendering of the facts and the most recent turns.
    /// Timestamps are not included.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if let Some(origin) = &self.facts.origin {
            lines.push(format!("Start location: {}", describe(origin)));
        }
        if let Some(destination) = &self.facts.destination {
            lines.push(format!("End location: {}", describe(destination)));
        }
        if let Some(preference) = self.facts.preference {
            lines.push(format!("Route preference: {preference}"));
        }

        let skip = self.turns.len().saturating_sub(SUMMARY_TURNS);
        let recent: Vec<&ConversationTurn> = self.turns.iter().skip(skip).collect();
        if !recent.is_empty() {
            lines.push("Recent conversation:".to_string());
            for turn in recent {
                lines.push(format!("  {}: {}", turn.role.as_str(), truncate(&turn.text)));
            }
        }

        if lines.is_empty() {
            EMPTY_SUMMARY.to_string()
        } else {
            lines.join("\n")
        }
    }

    pub fn reset(&mut self) {
        self.turns.clear();
        self.facts = SessionFacts::default();
    }
}

fn describe(location: &LocationRef) -> String {
    match location.coordinate() {
        Some(coord) => format!(
            "{} ({:.6}, {:.6})",
            location.name(),
            coord.longitude,
            coord.latitude
        ),
        None => format!("{} (unresolved)", location.name()),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= SUMMARY_TURN_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(SUMMARY_TURN_CHARS).collect();
    format!("{head}...")
}

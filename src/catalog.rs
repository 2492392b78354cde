use serde::Serialize;

use crate::models::Mood;

/// A user-selectable quiz category.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CategoryInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub emoji: &'static str,
    pub description: &'static str,
}

pub const CATEGORIES: &[CategoryInfo] = &[
    CategoryInfo {
        id: "mathe",
        name: "Mathe",
        emoji: "🔢",
        description: "Mathematische Rätsel und Aufgaben",
    },
    CategoryInfo {
        id: "geografie",
        name: "Geografie",
        emoji: "🌍",
        description: "Länder, Hauptstädte und Geografie",
    },
    CategoryInfo {
        id: "geschichte",
        name: "Name Recall (Historische)",
        emoji: "⌛",
        description: "Historische Persönlichkeiten und Ereignisse",
    },
    CategoryInfo {
        id: "logik",
        name: "Logikrätsel",
        emoji: "🧩",
        description: "Knifflige Denkaufgaben",
    },
    CategoryInfo {
        id: "wortschatz",
        name: "Wortschatz/Rechtschreibung",
        emoji: "📚",
        description: "Sprachliche Herausforderungen",
    },
    CategoryInfo {
        id: "trivia",
        name: "Daily Trivia",
        emoji: "🎯",
        description: "Tägliche Wissensfragen",
    },
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MoodInfo {
    pub id: Mood,
    pub emoji: &'static str,
    pub label: &'static str,
}

pub const MOODS: &[MoodInfo] = &[
    MoodInfo {
        id: Mood::Sad,
        emoji: "😔",
        label: "Nicht so gut",
    },
    MoodInfo {
        id: Mood::Neutral,
        emoji: "😊",
        label: "Ganz gut",
    },
    MoodInfo {
        id: Mood::Happy,
        emoji: "🤩",
        label: "Fantastisch!",
    },
];

pub fn category_name(id: &str) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|category| category.id == id)
        .map(|category| category.name)
}

/// Map category identifiers to the display names stored on questions.
/// Unknown identifiers are dropped; order of first appearance is kept.
pub fn map_category_ids(ids: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in ids.iter().filter_map(|id| category_name(id)) {
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{Mood, Selection};

/// Per-user ephemeral selections (mood, category identifiers) that a
/// browser client would keep in local storage between screens.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    selections: Arc<RwLock<HashMap<String, Selection>>>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_mood(&self, user_id: &str, mood: Mood) {
        let mut selections = self.selections.write().await;
        selections.entry(user_id.to_string()).or_default().mood = Some(mood);
    }

    pub async fn set_categories(&self, user_id: &str, category_ids: Vec<String>) {
        let mut selections = self.selections.write().await;
        selections.entry(user_id.to_string()).or_default().category_ids = category_ids;
    }

    pub async fn get(&self, user_id: &str) -> Selection {
        self.selections
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn clear(&self, user_id: &str) {
        self.selections.write().await.remove(user_id);
    }
}

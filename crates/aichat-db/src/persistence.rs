use std::sync::Arc;

use aichat_store::SettingsPersistence;
use aichat_types::settings::ConversationSettings;

use crate::Database;

/// Writes settings changes through to the local database.
pub struct DbSettingsPersistence {
    db: Arc<Database>,
}

impl DbSettingsPersistence {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SettingsPersistence for DbSettingsPersistence {
    fn save(&self, settings: &ConversationSettings) -> anyhow::Result<()> {
        self.db.save_settings(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aichat_store::{Dispatcher, SettingsStore};

    #[test]
    fn settings_store_writes_through() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = SettingsStore::with_initial(
            Dispatcher::new(),
            ConversationSettings::default(),
            Some(Arc::new(DbSettingsPersistence::new(db.clone()))),
        );

        store.set_speed(0.75);
        let saved = db.load_settings().unwrap().unwrap();
        assert_eq!(saved.speed, 0.75);
        assert_eq!(saved.language, "en-US");
    }
}

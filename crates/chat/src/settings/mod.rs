pub mod state;

pub use state::{
    DEFAULT_GREETING, SETTING_FIELDS, SETTINGS_FILE_NAME, SessionSettings, SettingsError, SettingsStore,
};

use std::fs;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub parallel: bool,
    pub initial_path: String,
    pub step_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallel: false,
            initial_path: "/".into(),
            step_delay_ms: 150,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    parallel: Option<bool>,
    initial_path: Option<String>,
    step_delay_ms: Option<u64>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("demo.toml") {
        if let Ok(file_cfg) = toml::from_str::<FileSettings>(&raw) {
            apply_file_settings(&mut settings, file_cfg);
        }
    }

    if let Ok(v) = std::env::var("APP__PARALLEL") {
        if let Ok(parsed) = v.parse() {
            settings.parallel = parsed;
        }
    }
    if let Ok(v) = std::env::var("APP__INITIAL_PATH") {
        settings.initial_path = v;
    }
    if let Ok(v) = std::env::var("APP__STEP_DELAY_MS") {
        if let Ok(parsed) = v.parse() {
            settings.step_delay_ms = parsed;
        }
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(parallel) = file_cfg.parallel {
        settings.parallel = parallel;
    }
    if let Some(initial_path) = file_cfg.initial_path {
        settings.initial_path = initial_path;
    }
    if let Some(step_delay_ms) = file_cfg.step_delay_ms {
        settings.step_delay_ms = step_delay_ms;
    }
}

//! The Settings tab: client preferences edited through a form binding.

use anyhow::{Context, Result};
use serde_json::Value as Json;
use swarmview_core::form::{CheckBox, FormBinding, SpinBox};
use swarmview_core::ClientConfig;

const POLL_STEP_MS: i64 = 250;

/// Editable preferences, in display order: config key, label.
const FIELDS: [(&str, &str); 3] = [
    ("poll_interval_ms", "Poll interval (ms)"),
    ("sidebar_show_zero", "Show empty filters"),
    ("sidebar_show_trackers", "Show trackers"),
];

pub struct SettingsForm {
    form: FormBinding,
    cursor: usize,
}

impl SettingsForm {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut form = FormBinding::new();
        form.bind("poll_interval_ms", SpinBox::new(POLL_STEP_MS, 60_000));
        form.bind("sidebar_show_zero", CheckBox::default());
        form.bind("sidebar_show_trackers", CheckBox::default());
        let mut settings = Self { form, cursor: 0 };
        settings.load(config)?;
        Ok(settings)
    }

    /// Refill every control from `config`.
    pub fn load(&mut self, config: &ClientConfig) -> Result<()> {
        let document = serde_json::to_value(config).context("Failed to encode preferences")?;
        self.form.to_widgets(&document, "");
        Ok(())
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn move_cursor(&mut self, delta: isize) {
        self.cursor = self.cursor.saturating_add_signed(delta).min(FIELDS.len() - 1);
    }

    /// `(label, value)` for each row of the tab.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        FIELDS
            .iter()
            .map(|&(name, label)| {
                let value = match self.form.widget(name).map(|w| w.get_value()) {
                    Some(Json::Bool(true)) => "[x]".to_string(),
                    Some(Json::Bool(false)) => "[ ]".to_string(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                (label, value)
            })
            .collect()
    }

    /// Step the control under the cursor: flip a check box, move a number
    /// by one step in the direction of `delta`.
    pub fn adjust(&mut self, delta: isize) {
        let (name, _) = FIELDS[self.cursor];
        let Some(widget) = self.form.widget_mut(name) else {
            return;
        };
        let next = match widget.get_value() {
            Json::Bool(checked) => Json::Bool(!checked),
            Json::Number(n) => {
                let step = if delta < 0 { -POLL_STEP_MS } else { POLL_STEP_MS };
                Json::from(n.as_i64().unwrap_or(0).saturating_add(step))
            }
            _ => return,
        };
        widget.set_value(&next);
    }

    /// `config` with the form's values written over it.
    pub fn apply(&self, config: &ClientConfig) -> Result<ClientConfig> {
        let shape = serde_json::to_value(config).context("Failed to encode preferences")?;
        let edited = self.form.from_widgets(&shape, "");
        serde_json::from_value(edited).context("Failed to decode edited preferences")
    }
}

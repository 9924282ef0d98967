use crate::core::config::data::Settings;
use crate::core::config::keys::{format_bool, SettingKey};

impl Settings {
    /// Display value for one key. The API key is never echoed back.
    pub fn display_value(&self, key: SettingKey) -> String {
        match key {
            SettingKey::EndpointUrl => self.endpoint_url.clone(),
            SettingKey::ApiKey => {
                if self.api_key.is_empty() {
                    "(unset)".to_string()
                } else {
                    "(set)".to_string()
                }
            }
            SettingKey::Temperature => self.temperature.to_string(),
            SettingKey::TopP => self.top_p.to_string(),
            SettingKey::MaxTokens => self.max_tokens.to_string(),
            SettingKey::Stream => format_bool(self.stream).to_string(),
            SettingKey::SystemMessage => {
                if self.system_message.is_empty() {
                    "(unset)".to_string()
                } else {
                    format!("{:?}", self.system_message)
                }
            }
        }
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        for key in SettingKey::ALL {
            println!("  {key}: {}", self.display_value(key));
        }
    }
}

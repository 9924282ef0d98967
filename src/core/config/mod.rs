pub mod data;
pub mod io;
pub mod keys;
pub mod printing;

pub use data::Settings;
pub use keys::{SettingError, SettingKey};

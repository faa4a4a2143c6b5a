pub mod main_settings;
pub mod paths;

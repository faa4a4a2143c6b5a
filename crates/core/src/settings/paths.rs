use std::env;
use std::path::{Path, PathBuf};

use crate::shared::constants::{
    ANONYMIZER_PARAMETERS_FOLDER_ENV, CONFIG_FOLDER_ENV, MAIN_SETTINGS_FILE_NAME,
};

const APP_FOLDER_NAME: &str = "blanket";
const ANONYMIZER_PARAMETERS_FOLDER_NAME: &str = "anonymizer_parameters";

/// Configuration root: `$BLANKET_CONFIG_FOLDER`, else the platform config
/// directory, else the working directory.
pub fn config_folder() -> PathBuf {
    resolve_config_folder(env::var_os(CONFIG_FOLDER_ENV).map(PathBuf::from))
}

/// Folder holding the per-strategy parameters files.
pub fn anonymizer_parameters_folder() -> PathBuf {
    anonymizer_parameters_folder_in(&config_folder())
}

/// `$BLANKET_ANONYMIZER_PARAMETERS_FOLDER`, else the parameters subfolder of
/// `config_folder`.
pub fn anonymizer_parameters_folder_in(config_folder: &Path) -> PathBuf {
    resolve_parameters_folder(
        env::var_os(ANONYMIZER_PARAMETERS_FOLDER_ENV).map(PathBuf::from),
        config_folder,
    )
}

pub fn main_settings_path() -> PathBuf {
    config_folder().join(MAIN_SETTINGS_FILE_NAME)
}

fn resolve_config_folder(override_folder: Option<PathBuf>) -> PathBuf {
    override_folder.unwrap_or_else(|| {
        dirs::config_dir()
            .map(|d| d.join(APP_FOLDER_NAME))
            .unwrap_or_else(|| PathBuf::from(APP_FOLDER_NAME))
    })
}

fn resolve_parameters_folder(override_folder: Option<PathBuf>, config_folder: &Path) -> PathBuf {
    override_folder.unwrap_or_else(|| config_folder.join(ANONYMIZER_PARAMETERS_FOLDER_NAME))
}

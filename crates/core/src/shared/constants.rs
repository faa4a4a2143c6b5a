pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Frame rate written when the source video reports none.
pub const FALLBACK_FPS: f64 = 30.0;

/// File mode applied to saved media when access is restricted.
pub const RESTRICTED_FILE_MODE: u32 = 0o700;

pub const CONFIG_FOLDER_ENV: &str = "BLANKET_CONFIG_FOLDER";
pub const ANONYMIZER_PARAMETERS_FOLDER_ENV: &str = "BLANKET_ANONYMIZER_PARAMETERS_FOLDER";
pub const MAIN_SETTINGS_FILE_NAME: &str = "main_settings.json";

pub fn is_image_path(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

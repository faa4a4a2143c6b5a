pub mod constants;
pub mod error;
pub mod frame;
pub mod shape_cache;
pub mod video_metadata;

pub mod anonymization;
pub mod detection;
pub mod geometry;
pub mod pipeline;
pub mod settings;
pub mod shared;
pub mod video;

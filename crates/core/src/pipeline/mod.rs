pub mod anonymize_image_use_case;
pub mod anonymize_video_use_case;
pub mod batch_anonymize_use_case;
pub mod pipeline_logger;
pub mod pipeline_options;

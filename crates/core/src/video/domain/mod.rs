pub mod image_primitive;
pub mod image_writer;
pub mod video_primitive;
pub mod video_reader;
pub mod video_writer;

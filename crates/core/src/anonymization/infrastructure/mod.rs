pub mod anonymizer_cache;
pub mod anonymizer_registry;
pub mod black_box_anonymizer;
pub mod conditioned_facefusion_anonymizer;
pub mod facefusion_anonymizer;
pub mod gaussian;
pub mod gaussian_blur_anonymizer;
pub mod pixelation_anonymizer;
pub mod process_runner;
pub mod retry;
pub mod roi;
pub mod sdwebui_client;
pub mod stable_diffusion_anonymizer;

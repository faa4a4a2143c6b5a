use std::io::Cursor;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::anonymization::domain::anonymizer_settings::AnonymizerSettings;
use crate::shared::error::{BlanketError, BlanketResult};
use crate::shared::frame::Frame;

use super::retry::{with_retry, RetryConfig};

const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";
const DEFAULT_SERVER_PORT: u16 = 7861;
const DEFAULT_ENDPOINT: &str = "sdapi/v1/img2img";
const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// One mask-guided inpainting call.
pub struct InpaintRequest<'a> {
    pub image: &'a Frame,
    pub mask: &'a GrayImage,
    pub padding: u32,
}

/// Narrow contract to an external inpainting service.
pub trait InpaintingClient: Send + Sync {
    /// Returns the first image produced by the service.
    fn inpaint(&self, request: &InpaintRequest<'_>) -> BlanketResult<Frame>;
}

/// Connection and payload settings for a Stable Diffusion web UI server.
#[derive(Debug, Clone, PartialEq)]
pub struct SdWebUiConfig {
    pub server_address: String,
    pub server_port: u16,
    pub endpoint: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl SdWebUiConfig {
    pub fn from_settings(settings: &AnonymizerSettings) -> BlanketResult<Self> {
        let defaults = RetryConfig::default();
        Ok(Self {
            server_address: settings
                .extra_or("server_address", DEFAULT_SERVER_ADDRESS.to_string())?,
            server_port: settings.extra_or("server_port", DEFAULT_SERVER_PORT)?,
            endpoint: settings.extra_or("endpoint", DEFAULT_ENDPOINT.to_string())?,
            payload: settings.extra_or("payload", serde_json::Map::new())?,
            timeout: Duration::from_secs(
                settings.extra_or("timeout_seconds", DEFAULT_TIMEOUT_SECONDS)?,
            ),
            retry: RetryConfig {
                max_retries: settings.extra_or("max_retries", defaults.max_retries)?,
                base_delay_ms: settings.extra_or("retry_base_delay_ms", defaults.base_delay_ms)?,
                ..defaults
            },
        })
    }

    pub fn url(&self) -> String {
        let address = self.server_address.trim_end_matches('/');
        let endpoint = self.endpoint.trim_start_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            format!("{address}:{}/{endpoint}", self.server_port)
        } else {
            format!("http://{address}:{}/{endpoint}", self.server_port)
        }
    }
}

#[derive(Deserialize)]
struct InpaintResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Blocking JSON-over-HTTP client for the web UI's img2img endpoint.
pub struct SdWebUiClient {
    config: SdWebUiConfig,
    http: reqwest::blocking::Client,
}

impl SdWebUiClient {
    pub fn new(config: SdWebUiConfig) -> BlanketResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BlanketError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &SdWebUiConfig {
        &self.config
    }

    /// Payload template plus the image, mask and padding fields.
    pub fn build_body(&self, request: &InpaintRequest<'_>) -> BlanketResult<serde_json::Value> {
        let mut body = self.config.payload.clone();
        body.insert(
            "init_images".into(),
            serde_json::Value::Array(vec![encode_frame_png(request.image)?.into()]),
        );
        body.insert("mask".into(), encode_mask_png(request.mask)?.into());
        body.insert("inpaint_full_res_padding".into(), request.padding.into());
        Ok(serde_json::Value::Object(body))
    }

    fn post_once(&self, url: &str, body: &serde_json::Value, index: usize) -> BlanketResult<Frame> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let parsed: InpaintResponse = response
            .json()
            .map_err(|e| BlanketError::external(format!("invalid inpainting response: {e}"), false))?;
        let first = parsed
            .images
            .first()
            .ok_or_else(|| BlanketError::external("inpainting response contained no images", false))?;
        decode_frame_png(first, index)
    }

    fn transport_error(&self, e: reqwest::Error) -> BlanketError {
        if e.is_timeout() {
            BlanketError::Timeout(self.config.timeout)
        } else {
            BlanketError::external(format!("inpainting request failed: {e}"), e.is_connect())
        }
    }
}

impl InpaintingClient for SdWebUiClient {
    fn inpaint(&self, request: &InpaintRequest<'_>) -> BlanketResult<Frame> {
        let url = self.config.url();
        let body = self.build_body(request)?;
        let index = request.image.index();
        with_retry(&self.config.retry, "inpainting request", || {
            self.post_once(&url, &body, index)
        })
    }
}

/// Server errors and throttling are transient; other statuses are not.
fn status_error(status: StatusCode, body: &str) -> BlanketError {
    let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
    let snippet: String = body.chars().take(200).collect();
    BlanketError::external(format!("inpainting service returned {status}: {snippet}"), retryable)
}

fn encode_png(image: DynamicImage) -> BlanketResult<String> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| BlanketError::InvalidState(format!("PNG encoding failed: {e}")))?;
    Ok(STANDARD.encode(buf))
}

pub fn encode_frame_png(frame: &Frame) -> BlanketResult<String> {
    if frame.channels() != 3 {
        return Err(BlanketError::InvalidState(format!(
            "expected an RGB frame, got {} channels",
            frame.channels()
        )));
    }
    let rgb = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| BlanketError::InvalidState("frame buffer does not match its size".into()))?;
    encode_png(DynamicImage::ImageRgb8(rgb))
}

pub fn encode_mask_png(mask: &GrayImage) -> BlanketResult<String> {
    encode_png(DynamicImage::ImageLuma8(mask.clone()))
}

pub fn decode_frame_png(encoded: &str, index: usize) -> BlanketResult<Frame> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| BlanketError::external(format!("invalid base64 image: {e}"), false))?;
    let rgb = image::load_from_memory(&bytes)
        .map_err(|e| BlanketError::external(format!("undecodable image: {e}"), false))?
        .to_rgb8();
    let (w, h) = rgb.dimensions();
    Ok(Frame::new(rgb.into_raw(), w, h, 3, index))
}

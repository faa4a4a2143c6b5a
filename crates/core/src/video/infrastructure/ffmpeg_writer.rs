use std::path::Path;

use ffmpeg_next::codec::encoder::video::Encoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

use crate::shared::constants::FALLBACK_FPS;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_writer::VideoWriter;

const VIDEO_STREAM_INDEX: usize = 0;

/// Encodes RGB frames into an MPEG-4 video stream via ffmpeg-next.
pub struct FfmpegWriter {
    session: Option<EncodeSession>,
}

struct EncodeSession {
    octx: Output,
    encoder: Encoder,
    scaler: scaling::Context,
    width: u32,
    height: u32,
    fps: i32,
    frame_count: usize,
}

// Safety: FfmpegWriter is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegWriter {}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self { session: None }
    }
}

impl Default for FfmpegWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-number frame rate for the encoder time base.
fn encoder_fps(fps: f64) -> i32 {
    match fps.round() as i32 {
        n if n > 0 => n,
        _ => FALLBACK_FPS as i32,
    }
}

impl VideoWriter for FfmpegWriter {
    fn open(
        &mut self,
        path: &Path,
        metadata: &VideoMetadata,
    ) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut octx = ffmpeg_next::format::output(path)?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;
        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;

        let fps = encoder_fps(metadata.fps);
        encoder_ctx.set_width(metadata.width);
        encoder_ctx.set_height(metadata.height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        octx.write_header()?;

        let scaler = scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            metadata.width,
            metadata.height,
            ffmpeg_next::format::Pixel::YUV420P,
            metadata.width,
            metadata.height,
            scaling::Flags::BILINEAR,
        )?;

        self.session = Some(EncodeSession {
            octx,
            encoder,
            scaler,
            width: metadata.width,
            height: metadata.height,
            fps,
            frame_count: 0,
        });
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let session = self.session.as_mut().ok_or("FfmpegWriter: not opened")?;
        if (frame.width(), frame.height()) != (session.width, session.height) || frame.channels() != 3 {
            return Err(format!(
                "frame {}x{}x{} does not match stream {}x{}x3",
                frame.width(),
                frame.height(),
                frame.channels(),
                session.width,
                session.height
            )
            .into());
        }

        let mut rgb_frame = Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            session.width,
            session.height,
        );
        let stride = rgb_frame.stride(0);
        let row_len = session.width as usize * 3;
        let data = rgb_frame.data_mut(0);
        for (row, src) in frame.data().chunks_exact(row_len).enumerate() {
            let dst_start = row * stride;
            data[dst_start..dst_start + row_len].copy_from_slice(src);
        }

        let mut yuv_frame = Video::empty();
        session.scaler.run(&rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(session.frame_count as i64));

        session.encoder.send_frame(&yuv_frame)?;
        session.drain_packets()?;
        session.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session.encoder.send_eof()?;
        session.drain_packets()?;
        session.octx.write_trailer()?;
        Ok(())
    }
}

impl EncodeSession {
    fn drain_packets(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let ost_time_base = self
            .octx
            .stream(VIDEO_STREAM_INDEX)
            .ok_or("FfmpegWriter: output stream missing")?
            .time_base();

        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(VIDEO_STREAM_INDEX);
            encoded.rescale_ts(ffmpeg_next::Rational(1, self.fps), ost_time_base);
            encoded.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }
}

use std::io::{Read, Write};

use anyhow::Context as _;
use ffmpeg_next::{Rational, format::Pixel};

use crate::{
    codec::{CodedPacket, FrameEncoder, Recv, read_full, recv_from},
    frame::RawVideoFrame,
    layout::{FramePlanes, FramePlanesMut, ImageLayout},
    packet::RawPacket,
};

/// Sequence end code terminating an MPEG-1/MPEG-2 elementary stream.
pub const MPEG_SEQUENCE_END_CODE: [u8; 4] = [0x00, 0x00, 0x01, 0xb7];

pub const DEFAULT_BIT_RATE: usize = 400_000;
pub const DEFAULT_GOP_SIZE: u32 = 10;

/// Returns the trailer a raw byte stream of `codec_id` must end with.
pub fn sequence_end_code(codec_id: ffmpeg_next::codec::Id) -> Option<&'static [u8]> {
    match codec_id {
        ffmpeg_next::codec::Id::MPEG1VIDEO | ffmpeg_next::codec::Id::MPEG2VIDEO => {
            Some(&MPEG_SEQUENCE_END_CODE)
        }
        _ => None,
    }
}

/// True for codecs where every frame is a standalone picture (mjpeg, png...).
pub fn is_intra_only(codec_id: ffmpeg_next::codec::Id) -> bool {
    let descriptor = unsafe { ffmpeg_next::ffi::avcodec_descriptor_get(codec_id.into()) };
    if descriptor.is_null() {
        return false;
    }
    unsafe { (*descriptor).props & ffmpeg_next::ffi::AV_CODEC_PROP_INTRA_ONLY as i32 != 0 }
}

pub fn find_encoder(codec_name: &str) -> anyhow::Result<ffmpeg_next::Codec> {
    ffmpeg_next::encoder::find_by_name(codec_name)
        .ok_or_else(|| anyhow::anyhow!("codec not found: {}", codec_name))
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub fps: i32,
    pub bit_rate: usize,
    pub gop_size: u32,
    pub max_b_frames: usize,
    pub codec: String,
    pub pixel_format: Pixel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            bit_rate: DEFAULT_BIT_RATE,
            gop_size: DEFAULT_GOP_SIZE,
            max_b_frames: 1,
            codec: "mpeg1video".to_string(),
            pixel_format: Pixel::YUV420P,
        }
    }
}

impl Settings {
    /// Fixed rate control: 400 kb/s, an intra frame every ten, one B-frame.
    pub fn fixed(codec: &str, pixel_format: Pixel, width: u32, height: u32, fps: i32) -> Self {
        Self {
            width,
            height,
            fps,
            codec: codec.to_string(),
            pixel_format,
            ..Default::default()
        }
    }

    /// Caller-chosen bit rate in kb/s. B-frames are turned off for intra-only
    /// codecs.
    pub fn with_bitrate_kbps(
        codec: &str,
        pixel_format: Pixel,
        width: u32,
        height: u32,
        fps: i32,
        bitrate_kbps: u32,
    ) -> anyhow::Result<Self> {
        let found = find_encoder(codec)?;
        let max_b_frames = if is_intra_only(found.id()) { 0 } else { 1 };
        Ok(Self {
            bit_rate: bitrate_kbps as usize * 1000,
            max_b_frames,
            ..Self::fixed(codec, pixel_format, width, height, fps)
        })
    }
}

/// A named FFmpeg video encoder opened with [`Settings`].
pub struct Encoder {
    inner: ffmpeg_next::codec::encoder::Video,
    codec_id: ffmpeg_next::codec::Id,
    settings: Settings,
}

impl Encoder {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        if settings.width == 0 || settings.height == 0 {
            anyhow::bail!("invalid video size {}x{}", settings.width, settings.height);
        }
        if settings.fps <= 0 {
            anyhow::bail!("invalid frame rate: {}", settings.fps);
        }
        let codec = find_encoder(&settings.codec)?;

        let encoder_ctx = ffmpeg_next::codec::Context::new_with_codec(codec);
        let mut encoder = encoder_ctx.encoder().video()?;
        encoder.set_bit_rate(settings.bit_rate);
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_time_base(Rational::new(1, settings.fps));
        encoder.set_frame_rate(Some(Rational::new(settings.fps, 1)));
        // a frame explicitly typed as I overrides the GOP
        encoder.set_gop(settings.gop_size);
        encoder.set_max_b_frames(settings.max_b_frames);
        encoder.set_format(settings.pixel_format);

        let inner = encoder.open_as(codec)?;
        log::info!(
            "encoder opened: {} {}x{} {:?} @{}fps, {} b/s, gop {}, {} b-frames",
            codec.name(),
            settings.width,
            settings.height,
            settings.pixel_format,
            settings.fps,
            settings.bit_rate,
            settings.gop_size,
            settings.max_b_frames
        );

        Ok(Self {
            inner,
            codec_id: codec.id(),
            settings,
        })
    }
}

impl FrameEncoder for Encoder {
    type Frame = RawVideoFrame;
    type Packet = RawPacket;

    fn alloc_frame(&self) -> anyhow::Result<RawVideoFrame> {
        RawVideoFrame::alloc(
            self.settings.pixel_format,
            self.settings.width,
            self.settings.height,
        )
    }

    fn send_frame(&mut self, frame: &mut RawVideoFrame, pts: i64) -> anyhow::Result<()> {
        frame.set_pts(Some(pts));
        self.inner.send_frame(frame.as_video())?;
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Recv<RawPacket>> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        let result = self.inner.receive_packet(&mut packet);
        recv_from(result, move || RawPacket::from(packet))
    }

    fn sequence_end_code(&self) -> Option<&'static [u8]> {
        sequence_end_code(self.codec_id)
    }
}

/// Populates an encoder-bound frame from raw input.
pub trait FrameFill {
    /// Layout of one image as stored in the input.
    fn layout(&self) -> &ImageLayout;

    /// Reads the next image into `frame`. Returns `false` once the input holds
    /// no further complete image.
    fn fill<R: Read + ?Sized, F: FramePlanesMut + ?Sized>(
        &mut self,
        input: &mut R,
        frame: &mut F,
    ) -> anyhow::Result<bool>;
}

fn warn_partial(read: usize, expected: usize) {
    if read > 0 {
        log::warn!(
            "ignoring trailing partial frame: {} of {} bytes",
            read,
            expected
        );
    }
}

/// Reads a luma plane and two quarter-size chroma planes straight into the
/// frame's planes.
pub struct PlanarReader {
    layout: ImageLayout,
}

impl PlanarReader {
    pub fn new(pixel_format: Pixel, width: u32, height: u32) -> Self {
        let layout = ImageLayout::planar_420(width, height);
        let matches = ImageLayout::new(pixel_format, width, height)
            .map(|actual| actual == layout)
            .unwrap_or(false);
        if !matches {
            log::warn!(
                "{:?} at {}x{} is not 4:2:0 planar, input is still read as {}x{} luma + 2x {}x{} chroma",
                pixel_format,
                width,
                height,
                width,
                height,
                width / 2,
                height / 2
            );
        }
        Self { layout }
    }
}

impl FrameFill for PlanarReader {
    fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    fn fill<R: Read + ?Sized, F: FramePlanesMut + ?Sized>(
        &mut self,
        input: &mut R,
        frame: &mut F,
    ) -> anyhow::Result<bool> {
        self.layout.check_frame(frame)?;
        let mut total = 0;
        for (index, plane) in self.layout.planes().iter().enumerate() {
            let stride = frame.stride(index);
            let data = frame.plane_mut(index);
            for row in 0..plane.rows {
                let start = row * stride;
                let read = read_full(input, &mut data[start..start + plane.row_bytes])
                    .context("reading input")?;
                total += read;
                if read < plane.row_bytes {
                    warn_partial(total, self.layout.size());
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// Reads one packed image of any supported pixel format and copies it into
/// the frame's planes.
pub struct PackedReader {
    layout: ImageLayout,
    buf: Vec<u8>,
}

impl PackedReader {
    pub fn new(pixel_format: Pixel, width: u32, height: u32) -> anyhow::Result<Self> {
        Ok(Self::from_layout(ImageLayout::new(pixel_format, width, height)?))
    }

    pub fn from_layout(layout: ImageLayout) -> Self {
        let buf = vec![0u8; layout.size()];
        Self { layout, buf }
    }
}

impl FrameFill for PackedReader {
    fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    fn fill<R: Read + ?Sized, F: FramePlanesMut + ?Sized>(
        &mut self,
        input: &mut R,
        frame: &mut F,
    ) -> anyhow::Result<bool> {
        let read = read_full(input, &mut self.buf).context("reading input")?;
        if read < self.buf.len() {
            warn_partial(read, self.buf.len());
            return Ok(false);
        }
        self.layout.unpack(&self.buf, frame)?;
        Ok(true)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EncodeStats {
    pub frames: u64,
    pub packets: u64,
    pub bytes_written: u64,
}

/// Everything one encode run needs: the raw input, the compressed output,
/// the encoder stage, the frame filler and the single frame reused for
/// every image.
pub struct EncodeSession<R, W, E: FrameEncoder, F> {
    input: R,
    output: W,
    stage: E,
    fill: F,
    frame: E::Frame,
    next_pts: i64,
    stats: EncodeStats,
}

impl<R, W, E, F> EncodeSession<R, W, E, F>
where
    R: Read,
    W: Write,
    E: FrameEncoder,
    F: FrameFill,
{
    /// Allocates the working frame and checks it can hold the input layout.
    pub fn new(input: R, output: W, stage: E, fill: F) -> anyhow::Result<Self> {
        let frame = stage.alloc_frame().context("allocating frame")?;
        fill.layout().check_frame(&frame)?;
        Ok(Self {
            input,
            output,
            stage,
            fill,
            frame,
            next_pts: 0,
            stats: EncodeStats::default(),
        })
    }

    /// Encodes every complete image of the input, flushes the encoder and
    /// appends the codec's end code, if any.
    pub fn run(mut self) -> anyhow::Result<EncodeStats> {
        loop {
            self.frame.make_writable()?;
            if !self.fill.fill(&mut self.input, &mut self.frame)? {
                break;
            }
            let pts = self.next_pts;
            self.next_pts += 1;
            self.stage
                .send_frame(&mut self.frame, pts)
                .context("sending frame to encoder")?;
            self.stats.frames += 1;
            self.drain()?;
        }

        self.stage.send_eof().context("flushing encoder")?;
        self.drain()?;

        if let Some(end_code) = self.stage.sequence_end_code() {
            self.output
                .write_all(end_code)
                .context("writing end code")?;
            self.stats.bytes_written += end_code.len() as u64;
        }
        self.output.flush().context("flushing output")?;

        log::info!(
            "encode finished: {} frames, {} packets, {} bytes written",
            self.stats.frames,
            self.stats.packets,
            self.stats.bytes_written
        );
        Ok(self.stats)
    }

    fn drain(&mut self) -> anyhow::Result<()> {
        loop {
            match self.stage.receive_packet().context("encoding")? {
                Recv::Ready(packet) => {
                    let data = packet.data();
                    log::trace!("packet pts {:?}: {} bytes", packet.pts(), data.len());
                    self.output.write_all(data).context("writing output")?;
                    self.stats.packets += 1;
                    self.stats.bytes_written += data.len() as u64;
                }
                Recv::Again | Recv::Eof => return Ok(()),
            }
        }
    }
}

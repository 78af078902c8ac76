use std::collections::BTreeMap;

use ffmpeg_next::{Rational, codec::Parameters, format::Pixel, format::stream};

/// Owned snapshot of one elementary stream of an opened container.
#[derive(Clone)]
pub struct AvStream {
    index: usize,
    parameters: Parameters,
    time_base: Rational,
    rate: Rational,
    duration: i64,
    tags: BTreeMap<String, String>,
}

impl AvStream {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn rate(&self) -> Rational {
        self.rate
    }

    /// Duration in `time_base` units, `None` when the container does not know.
    pub fn duration(&self) -> Option<i64> {
        if self.duration == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || self.duration < 0 {
            None
        } else {
            Some(self.duration)
        }
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn is_video(&self) -> bool {
        self.parameters.medium() == ffmpeg_next::media::Type::Video
    }

    pub fn is_audio(&self) -> bool {
        self.parameters.medium() == ffmpeg_next::media::Type::Audio
    }

    fn raw(&self) -> &ffmpeg_next::ffi::AVCodecParameters {
        unsafe { &*self.parameters.as_ptr() }
    }

    pub fn width(&self) -> u32 {
        self.raw().width.max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.raw().height.max(0) as u32
    }

    /// Bits per second, 0 when the container does not say.
    pub fn bit_rate(&self) -> i64 {
        self.raw().bit_rate
    }

    pub fn sample_rate(&self) -> u32 {
        self.raw().sample_rate.max(0) as u32
    }

    pub fn channels(&self) -> u32 {
        self.raw().ch_layout.nb_channels.max(0) as u32
    }

    /// Pixel format of a video stream; `AVCodecParameters` stores it as a
    /// plain int, so it goes through an unopened codec context.
    pub fn pixel_format(&self) -> Option<Pixel> {
        if !self.is_video() {
            return None;
        }
        let ctx = ffmpeg_next::codec::Context::from_parameters(self.parameters.clone()).ok()?;
        let pixel = Pixel::from(unsafe { (*ctx.as_ptr()).pix_fmt });
        if pixel == Pixel::None { None } else { Some(pixel) }
    }
}

impl From<stream::Stream<'_>> for AvStream {
    fn from(stream: stream::Stream<'_>) -> Self {
        let tags = stream
            .metadata()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            index: stream.index(),
            parameters: stream.parameters(),
            time_base: stream.time_base(),
            rate: stream.avg_frame_rate(),
            duration: stream.duration(),
            tags,
        }
    }
}

use std::collections::BTreeMap;
use std::ffi::CString;
use std::ptr;

use anyhow::Context as _;
use ffmpeg_next::ffi;

use crate::{
    metadata::{FormatInfo, MediaInfo, StreamInfo},
    stream::AvStream,
};

/// An opened container. Closed when dropped.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    url: String,
}

impl AvInput {
    /// Opens `url` and reads its header. Stream parameters may still be
    /// incomplete until [`AvInput::find_stream_info`] runs.
    pub fn open(url: &str) -> anyhow::Result<Self> {
        let curl = CString::new(url).map_err(|e| anyhow::anyhow!("invalid path {:?}: {}", url, e))?;
        let mut ctx: *mut ffi::AVFormatContext = ptr::null_mut();
        let ret = unsafe {
            ffi::avformat_open_input(&mut ctx, curl.as_ptr(), ptr::null(), ptr::null_mut())
        };
        if ret != 0 {
            return Err(ffmpeg_next::Error::from(ret))
                .with_context(|| format!("failed to open input stream {}", url));
        }
        log::debug!("opened input {}", url);

        Ok(Self {
            inner: unsafe { ffmpeg_next::format::context::Input::wrap(ctx) },
            url: url.to_string(),
        })
    }

    /// Reads packets as needed to fill in the parameters of every stream.
    pub fn find_stream_info(&mut self) -> anyhow::Result<()> {
        let ret = unsafe { ffi::avformat_find_stream_info(self.inner.as_mut_ptr(), ptr::null_mut()) };
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret))
                .with_context(|| format!("could not find stream information for {}", self.url));
        }
        Ok(())
    }

    pub fn streams(&self) -> Vec<AvStream> {
        self.inner.streams().map(AvStream::from).collect()
    }

    pub fn media_info(&self) -> MediaInfo {
        let input = &self.inner;
        let format = input.format();
        let tags: BTreeMap<String, String> = input
            .metadata()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let start_time = unsafe { (*input.as_ptr()).start_time };

        let streams = self.streams().iter().map(StreamInfo::from).collect();

        MediaInfo {
            format: FormatInfo {
                url: self.url.clone(),
                format_name: format.name().to_string(),
                format_long_name: format.description().to_string(),
                // AV_TIME_BASE = 1_000_000; both are in 1/AV_TIME_BASE seconds
                duration_sec: av_time_to_sec(input.duration()),
                start_time_sec: av_time_to_sec(start_time),
                bit_rate: input.bit_rate(),
                nb_streams: input.nb_streams(),
                tags,
            },
            streams,
        }
    }
}

fn av_time_to_sec(value: i64) -> Option<f64> {
    if value == ffi::AV_NOPTS_VALUE as i64 || value < 0 {
        None
    } else {
        Some(value as f64 / ffi::AV_TIME_BASE as f64)
    }
}

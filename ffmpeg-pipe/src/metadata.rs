//! Media file metadata (similar to ffprobe).

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::{input::AvInput, stream::AvStream};

/// Container-level section of a probe.
#[derive(Debug, Clone, Serialize)]
pub struct FormatInfo {
    pub url: String,
    /// Short demuxer name(s), comma separated when one demuxer covers several
    /// extensions.
    pub format_name: String,
    pub format_long_name: String,
    /// Seconds. Raw elementary streams usually leave it unset.
    pub duration_sec: Option<f64>,
    pub start_time_sec: Option<f64>,
    /// Bits per second over the whole file, 0 when the demuxer cannot tell.
    pub bit_rate: i64,
    pub nb_streams: u32,
    pub tags: BTreeMap<String, String>,
}

/// One elementary stream of a probed container.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub index: usize,
    /// Lowercase media type: `video`, `audio`, `subtitle`, `data`...
    pub codec_type: String,
    pub codec_name: String,
    /// `num/den` seconds per tick.
    pub time_base: String,
    /// In `time_base` ticks.
    pub duration_ts: Option<i64>,
    /// Average frame rate as `num/den`.
    pub rate: String,
    pub bit_rate: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pix_fmt: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    pub format: FormatInfo,
    pub streams: Vec<StreamInfo>,
}

impl From<&AvStream> for StreamInfo {
    fn from(stream: &AvStream) -> Self {
        let params = stream.parameters();
        let time_base = stream.time_base();
        let rate = stream.rate();

        let (width, height, pix_fmt) = if stream.is_video() {
            let pix_fmt = stream
                .pixel_format()
                .and_then(|p| p.descriptor())
                .map(|d| d.name().to_string());
            (Some(stream.width()), Some(stream.height()), pix_fmt)
        } else {
            (None, None, None)
        };
        let (sample_rate, channels) = if stream.is_audio() {
            (Some(stream.sample_rate()), Some(stream.channels()))
        } else {
            (None, None)
        };

        Self {
            index: stream.index(),
            codec_type: format!("{:?}", params.medium()).to_lowercase(),
            codec_name: params.id().name().to_string(),
            time_base: format!("{}/{}", time_base.numerator(), time_base.denominator()),
            duration_ts: stream.duration(),
            rate: format!("{}/{}", rate.numerator(), rate.denominator()),
            bit_rate: stream.bit_rate(),
            width,
            height,
            pix_fmt,
            sample_rate,
            channels,
            tags: stream.tags().clone(),
        }
    }
}

/// Writes `key=value`, skipping keys without a value.
fn line<T: fmt::Display>(f: &mut fmt::Formatter<'_>, key: &str, value: Option<T>) -> fmt::Result {
    match value {
        Some(value) => writeln!(f, "{}={}", key, value),
        None => Ok(()),
    }
}

fn section<F>(f: &mut fmt::Formatter<'_>, name: &str, body: F) -> fmt::Result
where
    F: FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    writeln!(f, "[{}]", name)?;
    body(f)?;
    writeln!(f, "[/{}]", name)
}

fn tags(f: &mut fmt::Formatter<'_>, tags: &BTreeMap<String, String>) -> fmt::Result {
    tags.iter()
        .try_for_each(|(key, value)| writeln!(f, "TAG:{}={}", key, value))
}

fn seconds(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.*}", precision, v))
}

impl fmt::Display for FormatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(f, "FORMAT", |f| {
            line(f, "filename", Some(&self.url))?;
            line(f, "format_name", Some(&self.format_name))?;
            line(f, "format_long_name", Some(&self.format_long_name))?;
            line(f, "start_time", Some(seconds(self.start_time_sec, 6)))?;
            line(f, "duration_sec", Some(seconds(self.duration_sec, 3)))?;
            line(f, "bit_rate", Some(self.bit_rate))?;
            line(f, "nb_streams", Some(self.nb_streams))?;
            tags(f, &self.tags)
        })
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(f, "STREAM", |f| {
            line(f, "index", Some(self.index))?;
            line(f, "codec_type", Some(&self.codec_type))?;
            line(f, "codec_name", Some(&self.codec_name))?;
            line(f, "time_base", Some(&self.time_base))?;
            line(f, "duration_ts", self.duration_ts)?;
            line(f, "rate", Some(&self.rate))?;
            line(f, "bit_rate", Some(self.bit_rate).filter(|b| *b > 0))?;
            line(f, "width", self.width)?;
            line(f, "height", self.height)?;
            line(f, "pix_fmt", self.pix_fmt.as_ref())?;
            line(f, "sample_rate", self.sample_rate)?;
            line(f, "channels", self.channels)?;
            tags(f, &self.tags)
        })
    }
}

/// ffprobe-like dump: one `[FORMAT]` section, then one `[STREAM]` per stream.
impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format)?;
        self.streams.iter().try_for_each(|s| write!(f, "{}", s))
    }
}

/// Opens a file, probes its streams and returns media metadata. The
/// container is closed before returning.
///
/// # Example
///
/// ```ignore
/// let info = ffmpeg_pipe::metadata::probe("input.mp4")?;
/// println!("{}", info);
/// ```
pub fn probe(path: &str) -> anyhow::Result<MediaInfo> {
    let mut input = AvInput::open(path)?;
    input.find_stream_info()?;
    Ok(input.media_info())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MediaInfo {
        MediaInfo {
            format: FormatInfo {
                url: "clip.mpg".to_string(),
                format_name: "mpegvideo".to_string(),
                format_long_name: "raw MPEG video".to_string(),
                duration_sec: None,
                start_time_sec: Some(0.0),
                bit_rate: 0,
                nb_streams: 1,
                tags: BTreeMap::from([("title".to_string(), "demo".to_string())]),
            },
            streams: vec![StreamInfo {
                index: 0,
                codec_type: "video".to_string(),
                codec_name: "mpeg1video".to_string(),
                time_base: "1/1200000".to_string(),
                duration_ts: None,
                rate: "25/1".to_string(),
                bit_rate: 400_000,
                width: Some(16),
                height: Some(16),
                pix_fmt: Some("yuv420p".to_string()),
                sample_rate: None,
                channels: None,
                tags: BTreeMap::new(),
            }],
        }
    }

    #[test]
    fn test_display_sections() {
        let text = sample().to_string();
        assert!(text.starts_with("[FORMAT]\nfilename=clip.mpg\n"));
        assert!(text.contains("duration_sec=N/A\n"));
        assert!(text.contains("TAG:title=demo\n"));
        assert!(text.contains("[STREAM]\nindex=0\ncodec_type=video\ncodec_name=mpeg1video\n"));
        assert!(text.contains("width=16\nheight=16\npix_fmt=yuv420p\n"));
        assert!(!text.contains("sample_rate="));
        assert!(text.ends_with("[/STREAM]\n"));
    }

    #[test]
    fn test_display_skips_unknown_stream_fields() {
        let mut info = sample();
        info.streams[0].bit_rate = 0;
        info.streams[0].pix_fmt = None;
        let text = info.to_string();
        assert!(text.contains("start_time=0.000000\n"));
        assert!(text.contains("bit_rate=0\nnb_streams=1\n"));
        assert!(!text.contains("pix_fmt="));
        assert_eq!(text.matches("bit_rate=").count(), 1);
    }

    #[test]
    fn test_probe_missing_file_fails() {
        assert!(probe("/nonexistent/clip.mp4").is_err());
    }
}

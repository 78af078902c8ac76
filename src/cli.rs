//! Command-line arguments shared by the demo binaries.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};
use ffmpeg_next::format::Pixel;

/// Exit status for bad arguments and for any failure without a library code.
pub const FAILURE_EXIT_CODE: i32 = 1;

pub fn parse_pixel_format(name: &str) -> Result<Pixel, String> {
    name.parse::<Pixel>()
        .map_err(|_| format!("unknown pixel format: {}", name))
}

/// Parses `args`, printing usage and exiting 1 on any mismatch. Help and
/// version requests exit 0.
pub fn parse_from_or_exit<T, I, S>(args: I) -> T
where
    T: Parser,
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => FAILURE_EXIT_CODE,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

pub fn parse_or_exit<T: Parser>() -> T {
    parse_from_or_exit(std::env::args_os())
}

/// The FFmpeg error code carried by `err`, or [`FAILURE_EXIT_CODE`].
pub fn library_exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<ffmpeg_next::Error>()
        .map(|e| i32::from(*e))
        .unwrap_or(FAILURE_EXIT_CODE)
}

/// Open a media container and print its stream metadata
#[derive(Parser, Debug)]
#[command(name = "open-info", version)]
pub struct OpenInfoArgs {
    pub input: PathBuf,

    /// Print the metadata as JSON instead of the section dump
    #[arg(long)]
    pub json: bool,
}

/// Decode a raw elementary stream into headerless raw video frames
#[derive(Parser, Debug)]
#[command(
    name = "decode",
    version,
    after_help = "Play back the output with:\n  ffplay -f rawvideo -video_size <WIDTH>x<HEIGHT> -framerate 30 -pixel_format <PIXEL_FORMAT> <OUTPUT>"
)]
pub struct DecodeArgs {
    pub input: PathBuf,

    pub output: PathBuf,

    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    /// e.g. yuv420p
    #[arg(value_parser = parse_pixel_format)]
    pub pixel_format: Pixel,

    /// Decoder name, e.g. h264 or mpeg1video
    pub codec: String,
}

/// Encode raw 4:2:0 planar frames with a fixed bit rate of 400 kb/s
#[derive(Parser, Debug)]
#[command(
    name = "encode",
    version,
    after_help = "Play back the output with:\n  ffplay <OUTPUT>"
)]
pub struct EncodeArgs {
    pub input: PathBuf,

    pub output: PathBuf,

    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    #[arg(value_parser = clap::value_parser!(i32).range(1..))]
    pub fps: i32,

    /// e.g. yuv420p
    #[arg(value_parser = parse_pixel_format)]
    pub pixel_format: Pixel,

    /// Encoder name, e.g. libx264 or mpeg1video
    pub codec: String,
}

/// Encode packed raw frames of any pixel format at a chosen bit rate
#[derive(Parser, Debug)]
#[command(
    name = "encode-bitrate",
    version,
    after_help = "Play back the output with:\n  ffplay <OUTPUT>"
)]
pub struct EncodeBitrateArgs {
    pub input: PathBuf,

    pub output: PathBuf,

    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    #[arg(value_parser = clap::value_parser!(i32).range(1..))]
    pub fps: i32,

    /// Target bit rate in kb/s
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub bitrate_kbps: u32,

    /// e.g. yuv420p or rgb24
    #[arg(value_parser = parse_pixel_format)]
    pub pixel_format: Pixel,

    /// Encoder name, e.g. libx264 or mjpeg
    pub codec: String,
}

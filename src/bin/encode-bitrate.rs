use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::Context as _;
use codec_demos::cli::{self, EncodeBitrateArgs};
use ffmpeg_pipe::encoder::{EncodeSession, EncodeStats, Encoder, PackedReader, Settings};

fn run(args: &EncodeBitrateArgs) -> anyhow::Result<EncodeStats> {
    let settings = Settings::with_bitrate_kbps(
        &args.codec,
        args.pixel_format,
        args.width,
        args.height,
        args.fps,
        args.bitrate_kbps,
    )?;
    let encoder = Encoder::new(settings)?;
    let fill = PackedReader::new(args.pixel_format, args.width, args.height)?;

    let input = File::open(&args.input)
        .with_context(|| format!("could not open {}", args.input.display()))?;
    let output = File::create(&args.output)
        .with_context(|| format!("could not open {}", args.output.display()))?;

    EncodeSession::new(BufReader::new(input), BufWriter::new(output), encoder, fill)?.run()
}

fn main() {
    codec_demos::init_logging();
    let args: EncodeBitrateArgs = cli::parse_or_exit();
    if let Err(e) = ffmpeg_pipe::init() {
        log::error!("{:#}", e);
        std::process::exit(cli::FAILURE_EXIT_CODE);
    }

    match run(&args) {
        Ok(stats) => log::info!(
            "encoded {} frames at {} kb/s into {} bytes at {}",
            stats.frames,
            args.bitrate_kbps,
            stats.bytes_written,
            args.output.display()
        ),
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(cli::FAILURE_EXIT_CODE);
        }
    }
}

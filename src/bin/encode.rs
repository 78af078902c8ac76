use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::Context as _;
use codec_demos::cli::{self, EncodeArgs};
use ffmpeg_pipe::encoder::{EncodeSession, EncodeStats, Encoder, PlanarReader, Settings};

fn run(args: &EncodeArgs) -> anyhow::Result<EncodeStats> {
    let settings = Settings::fixed(
        &args.codec,
        args.pixel_format,
        args.width,
        args.height,
        args.fps,
    );
    let encoder = Encoder::new(settings)?;
    let fill = PlanarReader::new(args.pixel_format, args.width, args.height);

    let input = File::open(&args.input)
        .with_context(|| format!("could not open {}", args.input.display()))?;
    let output = File::create(&args.output)
        .with_context(|| format!("could not open {}", args.output.display()))?;

    EncodeSession::new(BufReader::new(input), BufWriter::new(output), encoder, fill)?.run()
}

fn main() {
    codec_demos::init_logging();
    let args: EncodeArgs = cli::parse_or_exit();
    if let Err(e) = ffmpeg_pipe::init() {
        log::error!("{:#}", e);
        std::process::exit(cli::FAILURE_EXIT_CODE);
    }

    match run(&args) {
        Ok(stats) => log::info!(
            "encoded {} frames into {} bytes at {}",
            stats.frames,
            stats.bytes_written,
            args.output.display()
        ),
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(cli::FAILURE_EXIT_CODE);
        }
    }
}

use std::fs::File;
use std::io::BufWriter;

use anyhow::Context as _;
use codec_demos::cli::{self, DecodeArgs};
use ffmpeg_pipe::{
    decoder::{DecodeSession, DecodeStats, Decoder},
    layout::ImageLayout,
};

fn run(args: &DecodeArgs) -> anyhow::Result<DecodeStats> {
    // resolve everything that can fail on a bad name before touching files
    let decoder = Decoder::new(&args.codec, args.width, args.height)?;
    let layout = ImageLayout::new(args.pixel_format, args.width, args.height)?;

    let input = File::open(&args.input)
        .with_context(|| format!("could not open {}", args.input.display()))?;
    let output = File::create(&args.output)
        .with_context(|| format!("could not open {}", args.output.display()))?;

    DecodeSession::new(input, BufWriter::new(output), decoder, layout).run()
}

fn main() {
    codec_demos::init_logging();
    let args: DecodeArgs = cli::parse_or_exit();
    if let Err(e) = ffmpeg_pipe::init() {
        log::error!("{:#}", e);
        std::process::exit(cli::FAILURE_EXIT_CODE);
    }

    match run(&args) {
        Ok(stats) => log::info!(
            "wrote {} frames of {}x{} {:?} to {}",
            stats.frames,
            args.width,
            args.height,
            args.pixel_format,
            args.output.display()
        ),
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(cli::FAILURE_EXIT_CODE);
        }
    }
}

use codec_demos::cli::{self, OpenInfoArgs};
use ffmpeg_pipe::input::AvInput;

fn run(args: &OpenInfoArgs) -> anyhow::Result<()> {
    let path = args.input.to_string_lossy();
    let mut input = AvInput::open(&path)?;
    input.find_stream_info()?;

    let info = input.media_info();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print!("{}", info);
    }
    Ok(())
}

fn main() {
    codec_demos::init_logging();
    let args: OpenInfoArgs = cli::parse_or_exit();
    if let Err(e) = ffmpeg_pipe::init() {
        log::error!("{:#}", e);
        std::process::exit(cli::FAILURE_EXIT_CODE);
    }

    if let Err(e) = run(&args) {
        log::error!("{:#}", e);
        std::process::exit(cli::library_exit_code(&e));
    }
}

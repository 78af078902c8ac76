/// Registers FFmpeg components. Call once at startup before opening inputs
/// or looking up codecs.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod input;
pub mod layout;
pub mod metadata;
pub mod packet;
pub mod parser;
pub mod stream;

#[cfg(test)]
mod pipeline_test;

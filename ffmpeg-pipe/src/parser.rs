//! Bitstream parser wrapper.
//!
//! ffmpeg_next does not expose `AVCodecParserContext`, so this goes through
//! the raw bindings.

use std::ptr;

use bytes::Bytes;
use ffmpeg_next::ffi;

/// Splits an elementary stream into complete packets for one codec.
pub struct Parser {
    ctx: *mut ffi::AVCodecParserContext,
    // parsers may read past the end of their input, keep the tail zeroed
    scratch: Vec<u8>,
}

impl Parser {
    pub fn new(codec_id: ffmpeg_next::codec::Id) -> anyhow::Result<Self> {
        let raw_id: ffi::AVCodecID = codec_id.into();
        let ctx = unsafe { ffi::av_parser_init(raw_id as i32) };
        if ctx.is_null() {
            anyhow::bail!("parser not found for codec: {:?}", codec_id);
        }
        Ok(Self {
            ctx,
            scratch: Vec::new(),
        })
    }

    /// Feeds `data` to the parser. Returns the number of input bytes consumed
    /// and the packet completed by them, if any. An empty `data` flushes.
    ///
    /// # Safety
    /// `codec_ctx` must point to an open codec context of the same codec.
    pub unsafe fn parse(
        &mut self,
        codec_ctx: *mut ffi::AVCodecContext,
        data: &[u8],
    ) -> anyhow::Result<(usize, Option<Bytes>)> {
        let padding = ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
        self.scratch.clear();
        self.scratch.extend_from_slice(data);
        self.scratch.resize(data.len() + padding, 0);

        let in_ptr = if data.is_empty() {
            ptr::null()
        } else {
            self.scratch.as_ptr()
        };
        let mut out_ptr: *mut u8 = ptr::null_mut();
        let mut out_size: i32 = 0;
        let ret = unsafe {
            ffi::av_parser_parse2(
                self.ctx,
                codec_ctx,
                &mut out_ptr,
                &mut out_size,
                in_ptr,
                data.len() as i32,
                ffi::AV_NOPTS_VALUE as i64,
                ffi::AV_NOPTS_VALUE as i64,
                0,
            )
        };
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret).into());
        }

        let packet = if out_size > 0 && !out_ptr.is_null() {
            let slice = unsafe { std::slice::from_raw_parts(out_ptr, out_size as usize) };
            Some(Bytes::copy_from_slice(slice))
        } else {
            None
        };
        Ok((ret as usize, packet))
    }
}

impl Drop for Parser {
    fn drop(&mut self) {
        unsafe { ffi::av_parser_close(self.ctx) };
    }
}

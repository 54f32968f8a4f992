use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::CodecError;

/// Codec tags at the head of a `.vrcaz` envelope.
const CODEC_NONE: u8 = 0x00;
const CODEC_LZ4: u8 = 0x01;
const CODEC_XZ: u8 = 0x02;
const CODEC_ZSTD: u8 = 0x03;

/// Decodes the `.vrcaz` envelope at `source` into the canonical asset bundle
/// at `dest`.
///
/// The payload streams through the codec into `{dest}.tmp` and is renamed
/// into place only once fully written, so a crash mid-transcode never leaves
/// a partial canonical file. The source envelope is left untouched.
///
/// Decompression is CPU-bound; callers on an async runtime should wrap this
/// in `spawn_blocking`.
pub fn transcode(source: &Path, dest: &Path) -> Result<(), CodecError> {
    let file = File::open(source)?;
    let mut reader = BufReader::new(file);

    let mut tag = [0u8; 1];
    reader
        .read_exact(&mut tag)
        .map_err(|_| CodecError::EnvelopeInvalid)?;

    let tmp = tmp_path(dest);
    let result = decode_into(tag[0], reader, &tmp);
    if let Err(err) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(err);
    }

    std::fs::rename(&tmp, dest)?;
    tracing::debug!(
        source = %source.display(),
        dest = %dest.display(),
        codec = format_args!("{:#04x}", tag[0]),
        "transcoded asset bundle"
    );
    Ok(())
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn decode_into<R: Read>(tag: u8, reader: R, tmp: &Path) -> Result<(), CodecError> {
    let out = File::create(tmp)?;
    let mut writer = BufWriter::new(out);

    match tag {
        CODEC_NONE => {
            let mut reader = reader;
            io::copy(&mut reader, &mut writer)?;
        }
        CODEC_LZ4 => {
            let mut decoder = lz4_flex::frame::FrameDecoder::new(reader);
            io::copy(&mut decoder, &mut writer).map_err(CodecError::Decompress)?;
        }
        CODEC_XZ => {
            let mut decoder = liblzma::read::XzDecoder::new(reader);
            io::copy(&mut decoder, &mut writer).map_err(CodecError::Decompress)?;
        }
        CODEC_ZSTD => {
            let mut decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(CodecError::Decompress)?;
            io::copy(&mut decoder, &mut writer).map_err(CodecError::Decompress)?;
        }
        other => return Err(CodecError::UnsupportedCodec(other)),
    }

    let out = writer
        .into_inner()
        .map_err(|e| CodecError::Io(e.into_error()))?;
    out.sync_all()?;
    Ok(())
}

//! WAV file export functionality

use crate::backend::OplEngine;
use crate::formats::Song;
use crate::player::{PlaybackStats, SongRenderer};
use crate::{ChannelLayout, OplError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

fn wav_spec(sample_rate: u32, channels: ChannelLayout) -> hound::WavSpec {
    hound::WavSpec {
        channels: channels.count() as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn create_writer(
    path: &Path,
    sample_rate: u32,
    channels: ChannelLayout,
) -> Result<hound::WavWriter<BufWriter<File>>> {
    hound::WavWriter::create(path, wav_spec(sample_rate, channels))
        .map_err(|e| OplError::AudioFileError(format!("Failed to create WAV file: {}", e)))
}

fn write_pcm(writer: &mut hound::WavWriter<BufWriter<File>>, pcm: &[u8]) -> Result<()> {
    for bytes in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))
            .map_err(|e| OplError::AudioFileError(format!("Failed to write sample: {}", e)))?;
    }
    Ok(())
}

/// Render a song straight into a 16-bit WAV file
///
/// The file takes the renderer's sample rate and channel layout. Chunks are
/// written as they are rendered, so memory use does not grow with song length.
///
/// # Examples
///
/// ```no_run
/// use opl_bridge::{export_to_wav, load_song, BridgeConfig, SongRenderer};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let song = load_song("song.dro")?;
/// let mut renderer = SongRenderer::with_config(BridgeConfig::default())?;
///
/// export_to_wav(&mut renderer, &song, "output.wav")?;
/// # Ok(())
/// # }
/// ```
pub fn export_to_wav<E: OplEngine, P: AsRef<Path>>(
    renderer: &mut SongRenderer<E>,
    song: &Song,
    output_path: P,
) -> Result<PlaybackStats> {
    let path = output_path.as_ref();
    let (rate, channels) = (renderer.instance().sample_rate(), renderer.instance().channels());
    let mut writer = create_writer(path, rate, channels)?;

    let stats = renderer.play(song, |chunk| write_pcm(&mut writer, chunk))?;

    writer
        .finalize()
        .map_err(|e| OplError::AudioFileError(format!("Failed to finalize WAV file: {}", e)))?;
    log::debug!("wrote {} frames to {}", stats.frames, path.display());
    Ok(stats)
}

/// Write packed little-endian 16-bit PCM to a WAV file
pub fn write_pcm_wav<P: AsRef<Path>>(
    output_path: P,
    pcm: &[u8],
    sample_rate: u32,
    channels: ChannelLayout,
) -> Result<()> {
    let mut writer = create_writer(output_path.as_ref(), sample_rate, channels)?;
    write_pcm(&mut writer, pcm)?;
    writer
        .finalize()
        .map_err(|e| OplError::AudioFileError(format!("Failed to finalize WAV file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_matches_layout() {
        let spec = wav_spec(49_716, ChannelLayout::Stereo);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 49_716);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(wav_spec(44_100, ChannelLayout::Mono).channels, 1);
    }

    #[test]
    fn test_write_pcm_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcm.wav");
        let samples: [i16; 4] = [0, 1000, -1000, i16::MAX];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        write_pcm_wav(&path, &pcm, 22_050, ChannelLayout::Mono).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 22_050);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }
}

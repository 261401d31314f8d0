//! Integration tests for song loading, playback and WAV export
//!
//! Song files are assembled in memory, written to a temporary directory and
//! loaded back through the public API.

#![cfg(feature = "export-wav")]

use opl_bridge::formats::{detect_format, SongLoader};
use opl_bridge::{
    export_to_wav, load_song, BridgeConfig, Song, SongEvent, SongFormat, SongRenderer,
};
use std::path::Path;

/// A short two-note tune as (reg, val, delay) IMF records
const TUNE: &[(u8, u8, u16)] = &[
    (0x00, 0x00, 0),
    (0x01, 0x20, 0),
    (0x20, 0x01, 0),
    (0x23, 0x01, 0),
    (0x40, 0x10, 0),
    (0x43, 0x00, 0),
    (0x60, 0xF4, 0),
    (0x63, 0xF4, 0),
    (0x80, 0x77, 0),
    (0x83, 0x77, 0),
    (0xA0, 0x44, 0),
    (0xB0, 0x32, 140),
    (0xB0, 0x12, 28),
    (0xA0, 0x98, 0),
    (0xB0, 0x31, 140),
    (0xB0, 0x11, 252),
];

fn imf_type0() -> Vec<u8> {
    TUNE.iter()
        .flat_map(|&(reg, val, delay)| {
            let [lo, hi] = delay.to_le_bytes();
            [reg, val, lo, hi]
        })
        .collect()
}

fn imf_type1() -> Vec<u8> {
    let body = imf_type0();
    let mut data = (body.len() as u16).to_le_bytes().to_vec();
    data.extend_from_slice(&body);
    data
}

/// DRO v2 playing one OPL3 note on channel 9, right output only
fn dro_opl3() -> Vec<u8> {
    let codemap = [0x05u8, 0x23, 0x43, 0x63, 0x83, 0xA0, 0xB0, 0xC0];
    let pairs: [(u8, u8); 11] = [
        (0x80, 0x01), // 0x105: OPL3 on
        (0x81, 0x21), // 0x123
        (0x82, 0x00), // 0x143
        (0x83, 0xF0), // 0x163
        (0x84, 0x0F), // 0x183
        (0x85, 0x44), // 0x1A0
        (0x87, 0x20), // 0x1C0: right
        (0x86, 0x32), // 0x1B0: key on
        (0xFE, 99),   // 100 ms
        (0x86, 0x12), // key off
        (0xFF, 0),    // 256 ms
    ];
    let mut data = b"DBRAWOPL".to_vec();
    data.extend_from_slice(&2u16.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&(pairs.len() as u32).to_le_bytes());
    data.extend_from_slice(&356u32.to_le_bytes());
    data.extend_from_slice(&[2, 0, 0, 0xFE, 0xFF, codemap.len() as u8]);
    data.extend_from_slice(&codemap);
    for (reg, val) in pairs {
        data.extend_from_slice(&[reg, val]);
    }
    data
}

fn write_file(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn samples_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[test]
fn test_load_imf_both_types() {
    let dir = tempfile::tempdir().unwrap();
    let type0 = load_song(write_file(dir.path(), "tune.imf", &imf_type0())).unwrap();
    let type1 = load_song(write_file(dir.path(), "tune1.imf", &imf_type1())).unwrap();
    assert_eq!(type0, type1);
    assert_eq!(type0.tick_rate, 560);
    assert_eq!(type0.write_count(), TUNE.len());
    assert_eq!(type0.total_ticks(), 560);
    assert!(!type0.uses_opl3());
}

#[test]
fn test_wlf_uses_700hz() {
    let dir = tempfile::tempdir().unwrap();
    let song = load_song(write_file(dir.path(), "tune.wlf", &imf_type0())).unwrap();
    assert_eq!(song.tick_rate, 700);
    assert!((song.duration_secs() - 0.8).abs() < 1e-9);
}

#[test]
fn test_load_dro() {
    let dir = tempfile::tempdir().unwrap();
    let data = dro_opl3();
    assert_eq!(detect_format(&data, None), Some(SongFormat::Dro));
    // magic wins over a misleading extension
    let song = load_song(write_file(dir.path(), "capture.imf", &data)).unwrap();
    assert_eq!(song.tick_rate, 1000);
    assert_eq!(song.total_ticks(), 356);
    assert!(song.uses_opl3());
    assert_eq!(
        song.events[0],
        SongEvent::Write {
            reg: 0x105,
            val: 0x01
        }
    );
}

#[test]
fn test_render_imf_length_and_content() {
    let song = SongLoader::load_bytes(&imf_type0(), Some(Path::new("tune.imf"))).unwrap();
    let config = BridgeConfig::new(44_100, 2, 2).unwrap();
    let mut renderer = SongRenderer::with_config(config).unwrap();
    let out = renderer.render_song(&song).unwrap();

    // 560 ticks at 560 Hz is one second
    assert_eq!(out.len(), 44_100 * 4);
    let samples = samples_i16(&out);
    assert!(samples.iter().any(|&s| s != 0));
    assert!(samples.chunks_exact(2).all(|p| p[0] == p[1]));
}

#[test]
fn test_render_is_repeatable() {
    let song = SongLoader::load_bytes(&imf_type0(), Some(Path::new("tune.imf"))).unwrap();
    let mut renderer = SongRenderer::with_config(BridgeConfig::default()).unwrap();
    let first = renderer.render_song(&song).unwrap();
    let second = renderer.render_song(&song).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_render_dro_opl3_panning() {
    let song = SongLoader::load_bytes(&dro_opl3(), None).unwrap();
    let config = BridgeConfig::new(49_716, 2, 2).unwrap();
    let mut renderer = SongRenderer::with_config(config).unwrap();
    let out = renderer.render_song(&song).unwrap();
    assert_eq!(out.len(), 356 * 49_716 / 1000 * 4);

    let samples = samples_i16(&out);
    assert!(samples.chunks_exact(2).all(|p| p[0] == 0));
    assert!(samples.chunks_exact(2).any(|p| p[1] != 0));
}

#[test]
fn test_export_to_wav() {
    let dir = tempfile::tempdir().unwrap();
    let song = SongLoader::load_bytes(&imf_type0(), Some(Path::new("tune.imf"))).unwrap();
    let config = BridgeConfig::new(22_050, 2, 1).unwrap();
    let mut renderer = SongRenderer::with_config(config).unwrap();

    let wav = dir.path().join("tune.wav");
    let stats = export_to_wav(&mut renderer, &song, &wav).unwrap();
    assert_eq!(stats.frames, 22_050);
    assert_eq!(stats.writes, TUNE.len());

    let reader = hound::WavReader::open(&wav).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 22_050);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.duration(), 22_050);

    // the file holds exactly what an in-memory render produces
    let pcm = renderer.render_song(&song).unwrap();
    let from_file: Vec<i16> = hound::WavReader::open(&wav)
        .unwrap()
        .samples::<i16>()
        .map(|s| s.unwrap())
        .collect();
    assert_eq!(from_file, samples_i16(&pcm));
}

#[test]
fn test_empty_song_renders_nothing() {
    let mut renderer = SongRenderer::with_config(BridgeConfig::default()).unwrap();
    let song = Song::new(vec![SongEvent::Write { reg: 0xB0, val: 0x20 }], 560);
    assert!(renderer.render_song(&song).unwrap().is_empty());
}

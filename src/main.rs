//! `opl-render`: render OPL2/OPL3 register dumps to WAV.
//!
//! ```text
//! opl-render render song.dro -o song.wav
//! opl-render render keen.imf -o keen.wav --rate 44100 --channels 1
//! opl-render info wolf.wlf
//! opl-render tone -o a4.wav --freq 440 --seconds 2
//! ```
//!
//! Set `RUST_LOG=debug` (or `trace` for every register write) for details.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use opl_bridge::export::write_pcm_wav;
use opl_bridge::formats::{detect_format, SongEvent};
use opl_bridge::opl::operator::ChannelFrequency;
use opl_bridge::{
    export_to_wav, load_song, BridgeConfig, ChannelLayout, OplInstance, SongRenderer,
};

#[derive(Parser)]
#[command(name = "opl-render")]
#[command(about = "Render OPL2/OPL3 register dumps (IMF, DRO) to WAV")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a song file to WAV
    Render {
        /// Song file (.imf, .wlf or .dro)
        input: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Output sample rate in Hz
        #[arg(long)]
        rate: Option<u32>,

        /// Output channels (1 or 2)
        #[arg(long)]
        channels: Option<u8>,

        /// Override the song's tick rate in Hz
        #[arg(long)]
        tick_rate: Option<u32>,

        /// Bridge configuration as JSON; flags above take precedence
        #[arg(long)]
        config: Option<PathBuf>,

        /// Leave OPL2 waveform select off unless the song enables it
        #[arg(long)]
        no_wave_select: bool,
    },

    /// Show what a song file contains
    Info {
        /// Song file (.imf, .wlf or .dro)
        input: PathBuf,
    },

    /// Render a sustained test tone on channel 0
    Tone {
        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Tone pitch in Hz
        #[arg(long, default_value_t = 440.0)]
        freq: f64,

        /// Length in seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,

        /// Output sample rate in Hz
        #[arg(long, default_value_t = 44_100)]
        rate: u32,

        /// Output channels (1 or 2)
        #[arg(long, default_value_t = 2)]
        channels: u8,
    },
}

fn load_config(
    path: Option<&Path>,
    rate: Option<u32>,
    channels: Option<u8>,
) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            BridgeConfig::from_json(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => BridgeConfig::default(),
    };
    if let Some(rate) = rate {
        config = config.with_sample_rate(rate);
    }
    if let Some(channels) = channels {
        config = config.with_channels(ChannelLayout::try_from(channels)?);
    }
    config.validate()?;
    Ok(config)
}

fn render(
    input: &Path,
    output: &Path,
    config: BridgeConfig,
    tick_rate: Option<u32>,
    wave_select: bool,
) -> Result<()> {
    let mut song = load_song(input).with_context(|| format!("loading {}", input.display()))?;
    if let Some(rate) = tick_rate {
        song.tick_rate = rate;
    }

    let mut renderer = SongRenderer::with_config(config)?;
    renderer.set_wave_select(wave_select);
    println!(
        "Rendering {} ({:.1}s) at {} Hz, {}...",
        input.display(),
        song.duration_secs(),
        config.sample_rate,
        config.channels
    );
    let stats = export_to_wav(&mut renderer, &song, output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Wrote {} frames ({} register writes) to {}",
        stats.frames,
        stats.writes,
        output.display()
    );
    Ok(())
}

fn info(input: &Path) -> Result<()> {
    let data = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let Some(format) = detect_format(&data, Some(input)) else {
        bail!("{}: unrecognized song format", input.display());
    };
    let song = load_song(input)?;

    let mut keyed = [false; 18];
    for event in &song.events {
        if let SongEvent::Write { reg, val } = *event {
            let low = reg & 0xFF;
            if (0xB0..=0xB8).contains(&low) && val & 0x20 != 0 {
                keyed[(reg >> 8) as usize * 9 + (low - 0xB0) as usize] = true;
            }
        }
    }
    let channels: Vec<String> = keyed
        .iter()
        .enumerate()
        .filter(|(_, k)| **k)
        .map(|(c, _)| c.to_string())
        .collect();

    println!("File:      {}", input.display());
    println!("Format:    {}", format);
    println!("Tick rate: {} Hz", song.tick_rate);
    println!("Events:    {} ({} writes)", song.events.len(), song.write_count());
    println!("Duration:  {:.2}s", song.duration_secs());
    println!("OPL3:      {}", if song.uses_opl3() { "yes" } else { "no" });
    println!("Channels:  {}", channels.join(" "));
    Ok(())
}

fn tone(output: &Path, freq: f64, seconds: f64, rate: u32, channels: u8) -> Result<()> {
    let Some(pitch) = ChannelFrequency::from_hz(freq) else {
        bail!("{freq} Hz is outside the OPL pitch range");
    };
    let mut opl = OplInstance::new(rate, 2, channels)?;
    opl.write_register(0xA0, (pitch.fnum & 0xFF) as u8);
    opl.write_register(0xB0, 0x20 | (pitch.block << 2) | (pitch.fnum >> 8) as u8);

    let total = (seconds.max(0.0) * rate as f64) as usize;
    let max = opl.config().buffer_policy.max_frames;
    let min = opl.config().buffer_policy.min_frames;
    let mut pcm = Vec::with_capacity(total * opl.frame_size());
    let mut left = total;
    while left > 0 {
        let n = left.min(max).max(min);
        let chunk = opl.render_frames(n)?;
        let keep = left.min(n) * opl.frame_size();
        pcm.extend_from_slice(&chunk[..keep]);
        left -= left.min(n);
    }

    write_pcm_wav(output, &pcm, rate, opl.channels())?;
    println!(
        "Wrote {:.2}s of {:.1} Hz (F-number {:#05x}, block {}) to {}",
        seconds,
        pitch.hz(),
        pitch.fnum,
        pitch.block,
        output.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match args.command {
        Command::Render {
            input,
            output,
            rate,
            channels,
            tick_rate,
            config,
            no_wave_select,
        } => {
            let config = load_config(config.as_deref(), rate, channels)?;
            render(&input, &output, config, tick_rate, !no_wave_select)
        }
        Command::Info { input } => info(&input),
        Command::Tone {
            output,
            freq,
            seconds,
            rate,
            channels,
        } => tone(&output, freq, seconds, rate, channels),
    }
}

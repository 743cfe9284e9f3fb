//! WAV decoding through rodio's decoder

use std::io::Cursor;

use log::debug;
use rodio::{Decoder, Source};

use super::AssetError;

/// Decoded interleaved 16-bit samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Interleaved channel count
    pub channels: u16,
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved samples
    pub samples: Vec<i16>,
}

impl AudioClip {
    /// Length in frames
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }
}

/// Decode a whole WAV file
pub fn decode_wav(bytes: Vec<u8>, path: &str) -> Result<AudioClip, AssetError> {
    let decoder = Decoder::new_wav(Cursor::new(bytes)).map_err(|e| AssetError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<i16> = decoder.collect();

    debug!("Decoded {} samples of {} ({} channels, {} Hz)", samples.len(), path, channels, sample_rate);
    Ok(AudioClip {
        channels,
        sample_rate,
        samples,
    })
}

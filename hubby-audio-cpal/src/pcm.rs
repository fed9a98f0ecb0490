//! Conversions between cpal's float samples and the byte layout the engines use.
//!
//! 16-bit PCM is signed little-endian; 8-bit PCM is unsigned with a 128 bias.

/// Append `samples` to `out` encoded at `bits_per_sample`.
pub fn encode_samples<I>(samples: I, bits_per_sample: u16, out: &mut Vec<u8>)
where
    I: IntoIterator<Item = f32>,
{
    for s in samples {
        let s = s.clamp(-1.0, 1.0);
        match bits_per_sample {
            8 => out.push((s * 127.0 + 128.0).round() as u8),
            _ => out.extend_from_slice(&((s * i16::MAX as f32).round() as i16).to_le_bytes()),
        }
    }
}

/// Decode whole samples from `bytes`; a trailing partial sample is ignored.
pub fn decode_samples(bytes: &[u8], bits_per_sample: u16) -> Vec<f32> {
    match bits_per_sample {
        8 => bytes.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        _ => bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
            .collect(),
    }
}

/// Re-interleave `samples` from `from` channels to `to` channels.
///
/// Mono is duplicated into every output channel; multichannel to mono
/// averages; otherwise channels are dropped or zero-filled.
pub fn remap_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let (from, to) = (from as usize, to as usize);
    let mut out = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame.get(c).copied().unwrap_or(0.0)));
        }
    }
    out
}

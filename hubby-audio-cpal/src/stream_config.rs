use cpal::{SampleFormat, SampleRate, SupportedStreamConfig, SupportedStreamConfigRange};

use hubby_audio_core::AudioFormatSpec;

/// How well a supported range serves `format`. Higher is better; `None`
/// means the range cannot run at the requested rate at all.
///
/// Prefers the exact channel count, then integer formats matching the
/// requested bit depth, then f32.
pub fn config_score(range: &SupportedStreamConfigRange, format: &AudioFormatSpec) -> Option<i32> {
    let rate = format.sample_rate_hz;
    if !(range.min_sample_rate().0..=range.max_sample_rate().0).contains(&rate) {
        return None;
    }

    let mut score = 0;
    if range.channels() == format.channels() {
        score += 100;
    } else if range.channels() == 1 || range.channels() == 2 {
        score += 50;
    }
    score += match (range.sample_format(), format.bits_per_sample) {
        (SampleFormat::I16, 16) | (SampleFormat::U8, 8) => 50,
        (SampleFormat::F32, _) => 40,
        (SampleFormat::I16, _) => 30,
        (SampleFormat::I32, _) => 20,
        (SampleFormat::U16, _) | (SampleFormat::U8, _) => 10,
        _ => 0,
    };
    Some(score)
}

/// Pick the best range for `format` and pin it to the requested rate.
pub fn select_config<I>(ranges: I, format: &AudioFormatSpec) -> Option<SupportedStreamConfig>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    ranges
        .into_iter()
        .filter_map(|range| config_score(&range, format).map(|score| (score, range)))
        .max_by_key(|(score, _)| *score)
        .map(|(_, range)| range.with_sample_rate(SampleRate(format.sample_rate_hz)))
}

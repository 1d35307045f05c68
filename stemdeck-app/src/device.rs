//! Output device configuration

use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleFormat, SampleRate, SupportedStreamConfig, SupportedStreamConfigRange};

/// Pick an f32 configuration, at `sample_rate` when some range covers it,
/// else at the highest rate an f32 range offers
///
/// The render callback only writes f32, so other formats are never chosen.
pub fn pick_output_config<I>(ranges: I, sample_rate: u32) -> Option<SupportedStreamConfig>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    let rate = SampleRate(sample_rate);
    let f32_ranges: Vec<_> = ranges
        .into_iter()
        .filter(|r| r.sample_format() == SampleFormat::F32)
        .collect();

    if let Some(range) = f32_ranges
        .iter()
        .find(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
    {
        return Some(range.clone().with_sample_rate(rate));
    }
    f32_ranges
        .into_iter()
        .max_by_key(|r| r.max_sample_rate())
        .map(SupportedStreamConfigRange::with_max_sample_rate)
}

pub fn output_config(device: &cpal::Device, sample_rate: u32) -> anyhow::Result<SupportedStreamConfig> {
    let ranges = device
        .supported_output_configs()
        .context("querying output configurations")?;
    pick_output_config(ranges, sample_rate).ok_or_else(|| anyhow!("device offers no f32 output format"))
}

/// Rate the default output device will run at when asked for `sample_rate`
pub fn device_sample_rate(sample_rate: u32) -> anyhow::Result<u32> {
    let device = cpal::default_host()
        .default_output_device()
        .context("no audio output device found")?;
    Ok(output_config(&device, sample_rate)?.sample_rate().0)
}

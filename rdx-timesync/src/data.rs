//! Telemetry channels and GPS fixes, as handed over by the data loader.
//!
//! Raw payload parsing happens elsewhere. This module only normalizes
//! timestamps, orders samples and collapses duplicates so that every series
//! here is strictly increasing in time.

use crate::axis::{TimeAxis, Timestamped};
use crate::common::Millis;
use crate::components::resolver::NearestTimeResolver;
use crate::time::RawTimestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Digital,
    Analog,
}

/// An analog reading aggregated over its sampling period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogValue {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// A single timestamped value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample<V> {
    pub time: Millis,
    pub value: V,
}

impl<V> Timestamped for Sample<V> {
    fn timestamp(&self) -> Option<Millis> {
        Some(self.time)
    }
}

/// Orders raw samples and keeps the last value for each duplicated timestamp.
fn normalize<V, I>(raw: I) -> Vec<Sample<V>>
where
    I: IntoIterator<Item = (RawTimestamp, V)>,
{
    let mut samples: Vec<Sample<V>> = raw
        .into_iter()
        .filter_map(|(stamp, value)| Some(Sample { time: stamp.to_millis()?, value }))
        .collect();
    // Stable, so equal timestamps keep their arrival order.
    samples.sort_by_key(|sample| sample.time);

    let mut collapsed: Vec<Sample<V>> = Vec::with_capacity(samples.len());
    for sample in samples {
        match collapsed.last_mut() {
            Some(previous) if previous.time == sample.time => *previous = sample,
            _ => collapsed.push(sample),
        }
    }
    collapsed
}

fn nearest_in<'a, V>(
    samples: &'a [Sample<V>],
    time: Millis,
    resolver: &NearestTimeResolver,
) -> Option<&'a Sample<V>> {
    resolver
        .resolve_by(samples, |sample| sample.time, time)
        .map(|index| &samples[index])
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSamples {
    Digital(Vec<Sample<bool>>),
    Analog(Vec<Sample<AnalogValue>>),
}

/// The value of one channel at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    Digital(bool),
    Analog(AnalogValue),
}

/// A named time series. Channels may be sparse relative to the global axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    name: String,
    samples: ChannelSamples,
}

impl Channel {
    pub fn digital<I>(name: impl Into<String>, raw: I) -> Self
    where
        I: IntoIterator<Item = (RawTimestamp, bool)>,
    {
        Self {
            name: name.into(),
            samples: ChannelSamples::Digital(normalize(raw)),
        }
    }

    pub fn analog<I>(name: impl Into<String>, raw: I) -> Self
    where
        I: IntoIterator<Item = (RawTimestamp, AnalogValue)>,
    {
        Self {
            name: name.into(),
            samples: ChannelSamples::Analog(normalize(raw)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        match self.samples {
            ChannelSamples::Digital(_) => ChannelKind::Digital,
            ChannelSamples::Analog(_) => ChannelKind::Analog,
        }
    }

    pub fn samples(&self) -> &ChannelSamples {
        &self.samples
    }

    pub fn len(&self) -> usize {
        match &self.samples {
            ChannelSamples::Digital(s) => s.len(),
            ChannelSamples::Analog(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn timestamps(&self) -> Vec<Millis> {
        match &self.samples {
            ChannelSamples::Digital(s) => s.iter().map(|x| x.time).collect(),
            ChannelSamples::Analog(s) => s.iter().map(|x| x.time).collect(),
        }
    }

    /// The channel's own sample closest to `time`, with that sample's timestamp.
    pub fn sample_near(
        &self,
        time: Millis,
        resolver: &NearestTimeResolver,
    ) -> Option<(Millis, ChannelValue)> {
        match &self.samples {
            ChannelSamples::Digital(s) => {
                nearest_in(s, time, resolver).map(|x| (x.time, ChannelValue::Digital(x.value)))
            }
            ChannelSamples::Analog(s) => {
                nearest_in(s, time, resolver).map(|x| (x.time, ChannelValue::Analog(x.value)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
}

/// Vehicle positions over time, used by the map highlighter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsTrack {
    fixes: Vec<Sample<GpsFix>>,
}

impl GpsTrack {
    pub fn new<I>(raw: I) -> Self
    where
        I: IntoIterator<Item = (RawTimestamp, GpsFix)>,
    {
        Self {
            fixes: normalize(raw),
        }
    }

    pub fn fixes(&self) -> &[Sample<GpsFix>] {
        &self.fixes
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn fix_near(&self, time: Millis, resolver: &NearestTimeResolver) -> Option<&Sample<GpsFix>> {
        nearest_in(&self.fixes, time, resolver)
    }
}

/// Everything one load produces. Replaced wholesale on reload.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub channels: Vec<Channel>,
    pub gps: GpsTrack,
}

impl Dataset {
    /// Merges every channel and the GPS track into one axis.
    pub fn time_axis(&self) -> TimeAxis {
        let mut builder = TimeAxis::builder().add_source(self.gps.fixes());
        for channel in &self.channels {
            builder = match &channel.samples {
                ChannelSamples::Digital(s) => builder.add_source(s.as_slice()),
                ChannelSamples::Analog(s) => builder.add_source(s.as_slice()),
            };
        }
        builder.build()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }
}

//! Console views and a synthetic drive recording for the bundled binaries.
//!
//! `ConsoleConsumer` prints what a real view would draw, coloured with the
//! configured channel palette, so a session can be followed in a terminal.

use crate::common::{ConsumerId, ConsumerRole, Millis};
use crate::components::consumer::{ChartConsumer, CursorConsumer};
use crate::components::resolver::NearestTimeResolver;
use crate::config::{ChannelColor, PaletteConfig};
use crate::data::{AnalogValue, Channel, ChannelValue, Dataset, GpsFix, GpsTrack};
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::time::{format_millis, RawTimestamp};
use colored::{ColoredString, Colorize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Start of the synthetic recording.
pub const DEMO_START: Millis = 1_760_000_000_000;

/// Builds a drive of `seconds` length: an ignition flag every 5 s, speed every
/// second, engine rpm every 500 ms and a GPS fix every 2 s.
///
/// A few raw samples are deliberately messy (a text timestamp, a duplicate and
/// an unparseable one) so the normalization path is exercised too.
pub fn demo_dataset(seconds: i64) -> Dataset {
    let seconds = seconds.max(1);
    let at = |ms: i64| RawTimestamp::from(DEMO_START + ms);

    let mut ignition: Vec<(RawTimestamp, bool)> = (0..=seconds / 5)
        .map(|i| (at(i * 5_000), i % 4 != 3))
        .collect();
    ignition.push((RawTimestamp::from("not a time"), false));

    let mut speed: Vec<(RawTimestamp, AnalogValue)> = (0..=seconds)
        .map(|s| {
            let avg = 50.0 + 30.0 * (s as f64 / 20.0).sin();
            (at(s * 1_000), AnalogValue { avg, min: avg - 2.5, max: avg + 2.5 })
        })
        .collect();
    // A late correction for the first sample; the last value wins.
    speed.push((at(0), AnalogValue { avg: 0.0, min: 0.0, max: 0.0 }));

    let rpm = (0..=seconds * 2).map(|h| {
        let avg = 1_800.0 + 900.0 * (h as f64 / 15.0).cos();
        (at(h * 500), AnalogValue { avg, min: avg - 40.0, max: avg + 40.0 })
    });

    let mut gps: Vec<(RawTimestamp, GpsFix)> = (0..=seconds / 2)
        .map(|i| {
            let step = i as f64;
            (
                at(i * 2_000),
                GpsFix { lat: 48.137 + step * 1.5e-4, lon: 11.575 + step * 2.0e-4 },
            )
        })
        .collect();
    if let Some((_, first)) = gps.first().cloned() {
        let text = format!("{}", DEMO_START + 1_000);
        gps.push((RawTimestamp::Text(text), first));
    }

    Dataset {
        channels: vec![
            Channel::digital("ignition", ignition),
            Channel::analog("speed", speed),
            Channel::analog("rpm", rpm),
        ],
        gps: GpsTrack::new(gps),
    }
}

/// What a console consumer shows.
enum View {
    Channel(Channel),
    Map(GpsTrack),
    Clock,
}

/// A terminal stand-in for a real view.
pub struct ConsoleConsumer {
    name: String,
    role: ConsumerRole,
    view: View,
    color: Option<ChannelColor>,
    resolver: NearestTimeResolver,
    range: Option<(Millis, Millis)>,
    muted: Arc<AtomicBool>,
}

impl ConsoleConsumer {
    /// A chart or readout for one channel, or `None` if the dataset lacks it.
    pub fn channel(
        role: ConsumerRole,
        dataset: &Dataset,
        channel: &str,
        palette: &PaletteConfig,
    ) -> Option<Self> {
        let found = dataset.channel(channel)?.clone();
        Some(Self {
            name: format!("{}:{}", role_label(role), channel),
            role,
            view: View::Channel(found),
            color: Some(palette.color_for(channel).clone()),
            resolver: NearestTimeResolver::exact(),
            range: None,
            muted: Arc::default(),
        })
    }

    /// The map highlighter, or `None` if the dataset has no GPS fixes.
    pub fn map(dataset: &Dataset) -> Option<Self> {
        if dataset.gps.is_empty() {
            return None;
        }
        Some(Self {
            name: "map".to_string(),
            role: ConsumerRole::MapHighlighter,
            view: View::Map(dataset.gps.clone()),
            color: None,
            resolver: NearestTimeResolver::exact(),
            range: None,
            muted: Arc::default(),
        })
    }

    /// A view that only shows the cursor time, such as the timeline marker.
    pub fn clock(role: ConsumerRole, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role,
            view: View::Clock,
            color: None,
            resolver: NearestTimeResolver::exact(),
            range: None,
            muted: Arc::default(),
        }
    }

    /// Shares a switch that silences this consumer's output.
    pub fn with_mute(mut self, muted: Arc<AtomicBool>) -> Self {
        self.muted = muted;
        self
    }

    pub fn role(&self) -> ConsumerRole {
        self.role
    }

    /// The last range a chart view was given.
    pub fn visible_range(&self) -> Option<(Millis, Millis)> {
        self.range
    }

    fn paint(&self, text: &str) -> ColoredString {
        match self.color.as_ref().and_then(|c| console_rgb(&c.border_color)) {
            Some((r, g, b)) => text.truecolor(r, g, b),
            None => text.cyan(),
        }
    }

    fn print(&self, line: String) {
        if !self.muted.load(Ordering::Relaxed) {
            println!("  {} {}", self.paint(&format!("[{}]", self.name)), line);
        }
    }

    fn describe(&self, time: Millis) -> anyhow::Result<String> {
        match &self.view {
            View::Channel(channel) => {
                let (at, value) = channel
                    .sample_near(time, &self.resolver)
                    .ok_or(SyncError::NoData)?;
                let value = match value {
                    ChannelValue::Digital(on) => (if on { "ON" } else { "OFF" }).to_string(),
                    ChannelValue::Analog(v) => {
                        format!("{:.1} ({:.1}..{:.1})", v.avg, v.min, v.max)
                    }
                };
                Ok(format!("{} @ {}", value.bold(), format_millis(at)))
            }
            View::Map(track) => {
                let fix = track
                    .fix_near(time, &self.resolver)
                    .ok_or_else(|| SyncError::MissingTarget("map marker".to_string()))?;
                Ok(format!(
                    "marker at {:.5}, {:.5} @ {}",
                    fix.value.lat,
                    fix.value.lon,
                    format_millis(fix.time)
                ))
            }
            View::Clock => Ok(format_millis(time).bold().to_string()),
        }
    }
}

impl CursorConsumer for ConsoleConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, time: Millis, nearest: usize) -> anyhow::Result<()> {
        let line = self.describe(time)?;
        self.print(format!("{} {}", line, format!("#{nearest}").dimmed()));
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        self.print("cleared".dimmed().to_string());
        Ok(())
    }

    fn as_chart(&mut self) -> Option<&mut dyn ChartConsumer> {
        if self.role.is_chart() {
            Some(self)
        } else {
            None
        }
    }
}

impl ChartConsumer for ConsoleConsumer {
    fn set_visible_range(&mut self, start: Millis, end: Millis) -> anyhow::Result<()> {
        self.range = Some((start, end));
        self.print(format!(
            "range {} .. {}",
            format_millis(start),
            format_millis(end)
        ));
        Ok(())
    }
}

/// Registers one console view per role against `dataset`. Missing channels
/// or GPS are skipped with a warning.
pub fn register_console_views(
    engine: &SyncEngine,
    dataset: &Dataset,
    muted: &Arc<AtomicBool>,
) -> Vec<(ConsumerRole, ConsumerId)> {
    let palette = &engine.config().palette;
    let views = [
        (ConsumerRole::PrimaryChart, Some("speed")),
        (ConsumerRole::SecondaryChart, Some("rpm")),
        (ConsumerRole::DigitalReadout, Some("ignition")),
        (ConsumerRole::AnalogReadout, Some("speed")),
        (ConsumerRole::MapHighlighter, None),
        (ConsumerRole::TimelineMarker, None),
        (ConsumerRole::FloatingLabel, None),
    ];
    let mut registered = Vec::new();
    for (role, channel) in views {
        let consumer = match (role, channel) {
            (_, Some(channel)) => ConsoleConsumer::channel(role, dataset, channel, palette),
            (ConsumerRole::MapHighlighter, None) => ConsoleConsumer::map(dataset),
            (_, None) => Some(ConsoleConsumer::clock(role, role_label(role))),
        };
        let consumer = consumer.map(|c| {
            Box::new(c.with_mute(muted.clone())) as Box<dyn CursorConsumer>
        });
        if let Some(id) = engine.register_optional(role, consumer) {
            registered.push((role, id));
        }
    }
    registered
}

fn role_label(role: ConsumerRole) -> &'static str {
    match role {
        ConsumerRole::PrimaryChart => "chart",
        ConsumerRole::SecondaryChart => "chart2",
        ConsumerRole::DigitalReadout => "digital",
        ConsumerRole::AnalogReadout => "analog",
        ConsumerRole::MapHighlighter => "map",
        ConsumerRole::TimelineMarker => "timeline",
        ConsumerRole::FloatingLabel => "label",
    }
}

/// Reads `#rrggbb`, `rgb(r, g, b)` or `rgba(r, g, b, a)`.
fn console_rgb(css: &str) -> Option<(u8, u8, u8)> {
    let css = css.trim();
    if let Some(hex) = css.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let v = u32::from_str_radix(hex, 16).ok()?;
        return Some(((v >> 16) as u8, (v >> 8) as u8, v as u8));
    }
    let inner = css
        .strip_prefix("rgba(")
        .or_else(|| css.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim().parse::<u8>().ok());
    Some((parts.next()??, parts.next()??, parts.next()??))
}

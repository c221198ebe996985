use anyhow::Result;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use timesync::demo::{demo_dataset, register_console_views, DEMO_START};
use timesync::prelude::*;
use timesync::{ENGINE_NAME, VERSION as LIB_VERSION};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Width of the imaginary scrubber track, in pixels.
const TRACK_WIDTH: f64 = 1_000.0;

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    let rule = "-".repeat(72);
    println!("{}", ENGINE_NAME.cyan().bold());
    println!("{}", rule.dimmed());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", rule.dimmed());
}

/// Prints viewport changes and consumer failures as they happen.
fn spawn_event_listener(engine: &SyncEngine, verbose: Arc<AtomicBool>) {
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::ViewportChanged { start_label, end_label, origin, .. } => {
                    println!("<-- [VIEWPORT] {} .. {} ({:?})", start_label, end_label, origin);
                }
                SyncEvent::ConsumerFailed { name, reason, .. } => {
                    println!("<-- [FAILED] {}: {}", name.red(), reason);
                }
                SyncEvent::DispatchDropped { source, .. } => {
                    println!("<-- [DROPPED] dispatch from {}", source);
                }
                other if verbose.load(Ordering::Relaxed) => {
                    println!("<-- [EVENT] {:?}", other);
                }
                _ => {}
            }
        }
    });
}

/// Mutable shell session: the loaded data and the views registered for it.
struct Session {
    engine: SyncEngine,
    muted: Arc<AtomicBool>,
    origin: Millis,
    views: Vec<(ConsumerRole, ConsumerId)>,
}

impl Session {
    fn load_demo(&mut self, seconds: i64) {
        for (_, id) in self.views.drain(..) {
            self.engine.unregister(id);
        }
        let dataset = demo_dataset(seconds);
        self.views = register_console_views(&self.engine, &dataset, &self.muted);
        self.origin = DEMO_START;
        match self.engine.load_dataset(&dataset) {
            Some((start, end)) => println!(
                "--> Loaded {} s of data ({} .. {}), {} views.",
                seconds,
                format_millis(start),
                format_millis(end),
                self.views.len()
            ),
            None => println!("--> Dataset is empty."),
        }
    }

    fn primary_chart(&self) -> Option<ConsumerId> {
        self.views
            .iter()
            .find(|(role, _)| *role == ConsumerRole::PrimaryChart)
            .map(|(_, id)| *id)
    }

    /// Seconds from the start of the recording to epoch millis.
    fn at(&self, seconds: f64) -> Millis {
        self.origin + (seconds * 1_000.0).round() as Millis
    }

    fn print_state(&self) {
        let cursor = self.engine.cursor();
        let viewport = self.engine.scrubber().state();
        match cursor.time {
            Some(time) => println!(
                "Cursor:   {} (index {:?}, from {})",
                format_millis(time),
                cursor.index,
                cursor.source
            ),
            None => println!("Cursor:   hidden"),
        }
        println!(
            "Viewport: left {:.1}%, width {:.1}% ({:?})",
            viewport.left,
            viewport.width,
            self.engine.scrubber().scrub_state()
        );
        match self.engine.visible_range() {
            Some((start, end)) => {
                println!("Range:    {} .. {}", format_millis(start), format_millis(end))
            }
            None => println!("Range:    none"),
        }
        println!(
            "Axis:     {} timestamps, {} views",
            self.engine.axis().len(),
            self.views.len()
        );
    }
}

fn parse_target(word: &str) -> Option<ScrubTarget> {
    match word {
        "left" => Some(ScrubTarget::LeftHandle),
        "right" => Some(ScrubTarget::RightHandle),
        "body" | "center" => Some(ScrubTarget::Body),
        _ => None,
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  demo [S]                  - Loads an S-second synthetic drive (default 120).");
    println!("  hover <S>                 - Moves the cursor to S seconds, as a chart would.");
    println!("  track <X>                 - Hovers the timeline track at pixel X (0..1000).");
    println!("  leave                     - Pointer leaves the views; the cursor hides.");
    println!("  drag <left|right|body> <FROM> <TO> - Drags a viewport handle between pixels.");
    println!("  click <X>                 - Centers the viewport on track pixel X.");
    println!("  zoom <in|out|FACTOR>      - Zooms the viewport around its center.");
    println!("  reset                     - Shows the full time range again.");
    println!("  chart-range <S1> <S2>     - The primary chart reports a pan to S1..S2 seconds.");
    println!("  state                     - Shows cursor, viewport and range.");
    println!("  frame                     - Flushes pending frame work immediately.");
    println!("  mute | unmute             - Silences or restores the console views.");
    println!("  events <on|off>           - Prints every engine event.");
    println!("  exit                      - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let config = match env::args().nth(1) {
        Some(path) => SyncConfig::from_file(&path)?,
        None => SyncConfig::default(),
    };
    let engine = SyncEngine::new(config);
    let engine_handle = engine.clone();
    engine_handle.scrubber().resize(TRACK_WIDTH);

    let verbose = Arc::new(AtomicBool::new(false));
    spawn_event_listener(&engine_handle, verbose.clone());

    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    tokio::spawn(async move {
        if let Err(e) = engine.run().await {
            eprintln!("\nEngine stopped with an error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut session = Session {
        engine: engine_handle,
        muted: Arc::new(AtomicBool::new(false)),
        origin: DEMO_START,
        views: Vec::new(),
    };
    session.load_demo(120);

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CommandHighlighter));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        let line = match readline {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting syncshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };
        let number = |i: usize| args.get(i).and_then(|s| s.parse::<f64>().ok());
        let engine = &session.engine;

        match *command {
            "demo" => {
                let seconds = args.get(1).and_then(|s| s.parse::<i64>().ok()).unwrap_or(120);
                session.load_demo(seconds);
            }
            "hover" => match number(1) {
                Some(seconds) => {
                    if !engine.hover_time(session.at(seconds), SourceKind::Chart) {
                        println!("--> Throttled.");
                    }
                }
                None => println!("Usage: hover <SECONDS>"),
            },
            "track" => match number(1) {
                Some(x) => {
                    if !engine.hover_track(x, TRACK_WIDTH, SourceKind::Timeline) {
                        println!("--> Ignored (throttled or no data).");
                    }
                }
                None => println!("Usage: track <X>"),
            },
            "leave" => engine.pointer_leave(),
            "drag" => match (args.get(1).and_then(|w| parse_target(w)), number(2), number(3)) {
                (Some(target), Some(from), Some(to)) => {
                    let scrubber = engine.scrubber();
                    match scrubber.pointer_down(Some(target), from) {
                        Ok(_) => {
                            // A few intermediate moves, like a real pointer.
                            for step in 1..=4 {
                                scrubber.pointer_move(from + (to - from) * step as f64 / 4.0);
                            }
                            scrubber.pointer_up();
                        }
                        Err(err) => println!("--> {}", err),
                    }
                }
                _ => println!("Usage: drag <left|right|body> <FROM_X> <TO_X>"),
            },
            "click" => match number(1) {
                Some(x) => {
                    engine.scrubber().click_track(x);
                }
                None => println!("Usage: click <X>"),
            },
            "zoom" => match args.get(1).copied() {
                Some("in") => {
                    engine.scrubber().zoom_in();
                }
                Some("out") => {
                    engine.scrubber().zoom_out();
                }
                Some(factor) => match factor.parse::<f64>() {
                    Ok(factor) if factor > 0.0 => {
                        engine.scrubber().zoom(factor);
                    }
                    _ => println!("Error: '{}' is not a positive zoom factor.", factor),
                },
                None => println!("Usage: zoom <in|out|FACTOR>"),
            },
            "reset" => {
                engine.scrubber().reset();
            }
            "chart-range" => match (number(1), number(2)) {
                (Some(from), Some(to)) => {
                    let reporter = session.primary_chart();
                    if engine
                        .scrubber()
                        .on_chart_range_changed(reporter, session.at(from), session.at(to))
                        .is_none()
                    {
                        println!("--> Chart range ignored.");
                    }
                }
                _ => println!("Usage: chart-range <START_S> <END_S>"),
            },
            "state" => session.print_state(),
            "frame" => {
                let report = engine.run_frame();
                if report.is_idle() {
                    println!("--> Nothing pending.");
                } else {
                    println!("--> {:?}", report);
                }
            }
            "mute" => session.muted.store(true, Ordering::Relaxed),
            "unmute" => session.muted.store(false, Ordering::Relaxed),
            "events" => match args.get(1).copied() {
                Some("on") => verbose.store(true, Ordering::Relaxed),
                Some("off") => verbose.store(false, Ordering::Relaxed),
                _ => println!("Usage: events <on|off>"),
            },
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line),
        }
    }

    Ok(())
}

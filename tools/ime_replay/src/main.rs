//! Replay a scripted IME session through the bridge and print each frame.
//!
//! Usage:
//!   cargo run -p ime_replay -- tools/ime_replay/scripts/demo.toml
//!   cargo run -p ime_replay -- tools/ime_replay/scripts/demo.toml --json
//!   cargo run -p ime_replay -- --dump-config

use anyhow::Context as _;
use clap::Parser;
use imebridge_core::native::{
    RawMessage, GCS_COMPOSITION_ALL, GCS_RESULT_ALL, IMN_CHANGECANDIDATE, IMN_CLOSECANDIDATE,
    IMN_OPENCANDIDATE,
};
use imebridge_core::{
    BridgeConfig, Changes, CommitBuffer, CompositionAttribute, GlyphPolicy, ImeBridge, ImeEvent,
    ImeSnapshot, SyntheticBackend,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ime_replay")]
#[command(about = "Replay a scripted IME session and print what a renderer would draw")]
struct Args {
    /// TOML script to replay
    script: Option<PathBuf>,

    /// Print frames as JSON lines
    #[arg(long)]
    json: bool,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log: Option<String>,

    /// Print the default bridge configuration and exit
    #[arg(long)]
    dump_config: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Script {
    #[serde(default)]
    config: BridgeConfig,
    #[serde(default, rename = "step")]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
enum Step {
    Composition {
        text: String,
        #[serde(default)]
        reading: String,
        #[serde(default)]
        attributes: Vec<CompositionAttribute>,
        #[serde(default)]
        clauses: Vec<usize>,
        cursor: Option<usize>,
    },
    Candidates {
        items: Vec<String>,
        #[serde(default)]
        page_start: u32,
        #[serde(default = "default_page_size")]
        page_size: u32,
        #[serde(default)]
        selection: u32,
    },
    CloseCandidates,
    EndComposition,
    Commit {
        text: String,
    },
    /// Char message with a raw key code
    Key {
        code: u32,
    },
    /// Plain text typed outside a composition, one char message per UTF-16 unit
    Type {
        text: String,
    },
    Enable {
        enabled: bool,
    },
    Toggle,
}

fn default_page_size() -> u32 {
    9
}

#[derive(Debug, Serialize)]
struct Frame {
    step: usize,
    enabled: bool,
    changes: Changes,
    composition: Vec<FrameChar>,
    cursor: usize,
    reading: String,
    candidates: Vec<String>,
    page: Option<String>,
    typed: String,
    accepted: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FrameChar {
    ch: char,
    color: &'static str,
    /// Drawn with the script font rather than the fallback font
    script_font: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.dump_config {
        print!("{}", BridgeConfig::default().to_toml_string()?);
        return Ok(());
    }

    let Some(path) = args.script else {
        anyhow::bail!("no script given; pass a TOML script or --dump-config");
    };
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let script: Script =
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;

    replay(script, args.json)
}

fn replay(script: Script, json: bool) -> anyhow::Result<()> {
    let glyphs = script.config.glyphs.clone();
    let mut bridge = ImeBridge::new(SyntheticBackend::new(), script.config)?;
    let events = bridge.subscribe_channel();
    let mut typed = CommitBuffer::new();

    for (index, step) in script.steps.into_iter().enumerate() {
        tracing::info!(step = index, ?step, "replaying");
        run_step(&mut bridge, step)?;

        let mut accepted = Vec::new();
        for event in events.try_iter() {
            if let ImeEvent::Result(result) = event {
                if let Some(text) = typed.apply(&result) {
                    accepted.push(text);
                }
            }
        }

        let changes = bridge.take_changes();
        let frame = draw(index + 1, &bridge.snapshot(), changes, &glyphs, &typed, accepted);
        if json {
            println!("{}", serde_json::to_string(&frame)?);
        } else {
            print_frame(&frame);
        }
    }

    bridge.dispose()?;
    Ok(())
}

fn run_step(bridge: &mut ImeBridge<SyntheticBackend>, step: Step) -> anyhow::Result<()> {
    match step {
        Step::Composition {
            text,
            reading,
            attributes,
            clauses,
            cursor,
        } => {
            let cursor = cursor.unwrap_or_else(|| text.chars().count());
            let backend = bridge.backend_mut();
            backend.set_composition(&text, &attributes, &clauses, cursor);
            backend.set_reading(&reading, &[]);
            bridge.handle_message(RawMessage::composition(GCS_COMPOSITION_ALL));
        }
        Step::Candidates {
            items,
            page_start,
            page_size,
            selection,
        } => {
            let command = if bridge.candidates().is_empty() {
                IMN_OPENCANDIDATE
            } else {
                IMN_CHANGECANDIDATE
            };
            bridge
                .backend_mut()
                .set_candidates(&items, page_start, page_size, selection);
            bridge.handle_message(RawMessage::notify(command));
        }
        Step::CloseCandidates => {
            bridge.handle_message(RawMessage::notify(IMN_CLOSECANDIDATE));
        }
        Step::EndComposition => {
            bridge.backend_mut().clear_composition();
            bridge.handle_message(RawMessage::end_composition());
        }
        Step::Commit { text } => {
            bridge.backend_mut().set_result(&text);
            bridge.handle_message(RawMessage::composition(GCS_RESULT_ALL));
        }
        Step::Key { code } => {
            bridge.handle_message(RawMessage::char(code));
        }
        Step::Type { text } => {
            for unit in text.encode_utf16() {
                bridge.handle_message(RawMessage::char(unit as u32));
            }
        }
        Step::Enable { enabled } => bridge.set_enabled(enabled)?,
        Step::Toggle => {
            bridge.toggle_enabled()?;
        }
    }
    Ok(())
}

fn attribute_color(attr: CompositionAttribute) -> &'static str {
    match attr {
        CompositionAttribute::Converted => "LightGreen",
        CompositionAttribute::FixedConverted => "Gray",
        CompositionAttribute::Input => "Orange",
        CompositionAttribute::InputError => "Red",
        CompositionAttribute::TargetConverted => "Yellow",
        CompositionAttribute::TargetNotConverted => "SkyBlue",
    }
}

fn draw(
    step: usize,
    snapshot: &ImeSnapshot,
    changes: Changes,
    glyphs: &GlyphPolicy,
    typed: &CommitBuffer,
    accepted: Vec<String>,
) -> Frame {
    // Disabled bridges keep stale state; a renderer ignores it
    let visible = snapshot.enabled;
    let composition = if visible {
        snapshot
            .composition
            .chars_with_attributes()
            .map(|(ch, attr)| {
                let ch = glyphs.substitute(ch);
                FrameChar {
                    ch,
                    color: attribute_color(attr),
                    script_font: glyphs.in_script_range(ch),
                }
            })
            .collect()
    } else {
        Vec::new()
    };
    let candidates = if visible {
        snapshot
            .candidates
            .page_entries()
            .map(|(label, item)| format!("{}.{}", label, display_candidate(glyphs, item)))
            .collect()
    } else {
        Vec::new()
    };

    Frame {
        step,
        enabled: snapshot.enabled,
        changes,
        composition,
        cursor: snapshot.composition.cursor_position(),
        reading: snapshot.composition.reading_text().to_string(),
        candidates,
        page: visible.then(|| snapshot.page_indicator()).flatten(),
        typed: typed.text().to_string(),
        accepted,
    }
}

/// Candidates whose first char cannot be drawn are shown as the placeholder.
fn display_candidate(glyphs: &GlyphPolicy, item: &str) -> String {
    match item.chars().next() {
        Some(first) if glyphs.substitute(first) != first => glyphs.placeholder.to_string(),
        _ => item.to_string(),
    }
}

fn print_frame(frame: &Frame) {
    println!(
        "── step {} {}",
        frame.step,
        if frame.enabled { "" } else { "(ime disabled)" }
    );
    let text: String = frame.composition.iter().map(|c| c.ch).collect();
    let colors: Vec<&str> = frame.composition.iter().map(|c| c.color).collect();
    println!("  composition: {:?} cursor={} colors={:?}", text, frame.cursor, colors);
    let fallback = frame.composition.iter().filter(|c| !c.script_font).count();
    if fallback > 0 {
        println!("  fallback font: {} of {} chars", fallback, frame.composition.len());
    }
    if !frame.reading.is_empty() {
        println!("  reading:     {:?}", frame.reading);
    }
    if !frame.candidates.is_empty() {
        let page = frame.page.as_deref().unwrap_or("");
        println!("  candidates:  {} {}", frame.candidates.join("  "), page);
    }
    println!("  typed:       {:?}", frame.typed);
    for text in &frame.accepted {
        println!("  accepted:    {:?}", text);
    }
}

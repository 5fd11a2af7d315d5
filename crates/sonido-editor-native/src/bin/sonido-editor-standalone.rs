//! Sonido editor standalone host.
//!
//! Opens one or more standalone editor windows and plays the part of a
//! plugin host: it calls `idle` at display rate from the main thread until
//! every window has been closed (or Ctrl+C).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use sonido_editor::egui;
use sonido_editor::{EditorConfig, InstanceState};
use sonido_editor_native::{NativeEditor, native_editor, shared_subsystem};

/// Host idle period, about 60 Hz.
const IDLE_INTERVAL: Duration = Duration::from_millis(16);

/// Open standalone sonido editor windows.
#[derive(Parser, Debug)]
#[command(name = "sonido-editor-standalone")]
#[command(about = "Open standalone sonido editor windows")]
#[command(version)]
struct Args {
    /// Number of editor windows to open
    #[arg(short = 'n', long, default_value = "1")]
    count: usize,

    /// Window width in logical pixels (overrides the config file)
    #[arg(long)]
    width: Option<u32>,

    /// Window height in logical pixels (overrides the config file)
    #[arg(long)]
    height: Option<u32>,

    /// Editor configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cap each render thread at this many frames per second
    #[arg(long)]
    max_fps: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    // Initialize tracing subscriber; bridge legacy log:: calls from winit/glutin
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    tracing_log::LogTracer::init().ok();

    let args = Args::parse();
    let config = build_config(&args)?;
    tracing::info!(count = args.count, width = config.width, height = config.height, "starting editors");

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut editors: Vec<NativeEditor> = Vec::with_capacity(args.count);
    for index in 0..args.count {
        let title = format!("{} #{}", config.title, index + 1);
        let mut editor = native_editor(config.clone().with_title(title), None)
            .with_ui(demo_ui(index))
            .on_close_request(move || tracing::info!(editor = index + 1, "close control clicked"));
        editor.open()?;
        editors.push(editor);
    }

    while running.load(Ordering::SeqCst) && editors.iter().any(|e| e.state() == InstanceState::Open) {
        for editor in &mut editors {
            editor.idle();
            // A failed render loop ends the session; the host closes it.
            if editor.state() == InstanceState::Open && editor.last_error().is_some() {
                editor.close();
            }
        }
        thread::sleep(IDLE_INTERVAL);
    }

    for editor in &mut editors {
        editor.close();
    }
    tracing::info!(refs = shared_subsystem().ref_count(), "all editors closed");
    Ok(())
}

fn build_config(args: &Args) -> anyhow::Result<EditorConfig> {
    let mut config = match &args.config {
        Some(path) => EditorConfig::load(path)?,
        None => EditorConfig::default(),
    };
    let width = args.width.unwrap_or(config.width);
    let height = args.height.unwrap_or(config.height);
    config = config.with_size(width, height);
    if args.max_fps.is_some() {
        config = config.with_max_fps(args.max_fps);
    }
    config.validate()?;
    Ok(config)
}

/// Per-window demo content: a gain knob and a frame counter.
fn demo_ui(index: usize) -> impl FnMut(&egui::Context) + Send + 'static {
    let mut gain_db = 0.0_f32;
    let mut frames = 0_u64;
    move |ctx| {
        frames += 1;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(format!("Editor {}", index + 1));
            ui.add(egui::Slider::new(&mut gain_db, -60.0..=12.0).text("gain (dB)"));
            ui.label(format!("frames drawn: {frames}"));
            let size = ctx.screen_rect().size();
            ui.label(format!("logical size: {:.0} x {:.0}", size.x, size.y));
        });
    }
}

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use matte_config::MatteConfig;
use matte_core::BackendKind;
use matte_session::{Session, SessionEvent, SessionOptions, SurfaceSource};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

mod synthetic;
use synthetic::SyntheticEngine;

/// Minimal track for the synthetic engine: one band per dialogue line.
const DEMO_TRACK: &str = "\
[Script Info]
Title: matte demo
YCbCr Matrix: TV.601

[Events]
Dialogue: 0,0:00:00.00,0:10:00.00,Default,,0,0,0,,First band
Dialogue: 0,0:00:00.00,0:10:00.00,Default,,0,0,0,,Second band
Dialogue: 0,0:00:00.00,0:10:00.00,Default,,0,0,0,,Third band
";

fn session_options(config: &MatteConfig) -> SessionOptions {
    SessionOptions {
        width: config.rendering.width,
        height: config.rendering.height,
        prefer: BackendKind::from_label(&config.rendering.backend),
        debug_timing: config.rendering.debug_timing,
        time_offset: config.playback.time_offset,
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let config = MatteConfig::load();
    let options = session_options(&config);

    if std::env::args().any(|a| a == "--software") {
        run_headless(options)
    } else {
        run_windowed(options)
    }
}

/// Drive the software backend without a window and dump frames as PNGs.
fn run_headless(mut options: SessionOptions) -> Result<()> {
    options.prefer = Some(BackendKind::Software);
    let (width, height) = (options.width, options.height);
    let engine = SyntheticEngine::new(width, height);
    let mut session = Session::spawn(Box::new(engine), SurfaceSource::Cpu, options)
        .context("software session failed to start")?;
    session.set_track(DEMO_TRACK.to_string());

    std::fs::create_dir_all("matte-frames")?;
    let mut dumped = 0usize;
    for frame_index in 0..90u32 {
        session.frame_presented(f64::from(frame_index) / 30.0, width, height);
        for event in wait_for_render(&mut session)? {
            let SessionEvent::Frame(frame) = event else {
                continue;
            };
            if frame_index % 15 == 0 {
                let path = format!("matte-frames/frame_{frame_index:03}.png");
                image::save_buffer(
                    &path,
                    frame.data(),
                    frame.width(),
                    frame.height(),
                    image::ExtendedColorType::Rgba8,
                )
                .with_context(|| format!("writing {path}"))?;
                dumped += 1;
            }
        }
    }
    session.shutdown();
    println!("wrote {dumped} frames to matte-frames/");
    Ok(())
}

/// Poll until the in-flight render completes, collecting events on the way.
fn wait_for_render(session: &mut Session) -> Result<Vec<SessionEvent>> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        let mut done = false;
        for event in session.poll() {
            match &event {
                SessionEvent::RenderDone { .. } => done = true,
                SessionEvent::EngineFailed(msg) => bail!("layout engine failed: {msg}"),
                SessionEvent::Frame(_) => {}
            }
            seen.push(event);
        }
        if done {
            return Ok(seen);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    bail!("render did not complete in time");
}

/// Composite onto a winit window, pretending the window is the video area.
fn run_windowed(options: SessionOptions) -> Result<()> {
    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("matte demo")
        .build(&event_loop)?;
    // Leak the window to satisfy wgpu surface lifetime; event loop never returns.
    let window: &'static winit::window::Window = Box::leak(Box::new(window));

    let instance = wgpu::Instance::default();
    let surface = instance.create_surface(window)?;

    let engine = SyntheticEngine::new(options.width, options.height);
    let mut session = Session::spawn(
        Box::new(engine),
        SurfaceSource::Gpu { instance, surface },
        options,
    )
    .context("no compositing backend came up")?;
    log::info!("compositing with the {} backend", session.backend_kind().name());
    session.set_track(DEMO_TRACK.to_string());

    // bring the surface to the real window size before the first frame
    let mut size = window.inner_size();
    if size.width > 0 && size.height > 0 {
        session.resize(size.width, size.height, size.width, size.height);
    }

    let clock = Instant::now();
    event_loop.run(move |event, target| match event {
        Event::WindowEvent {
            event: WindowEvent::CloseRequested,
            window_id,
        } if window_id == window.id() => {
            target.exit();
        }
        Event::WindowEvent {
            event: WindowEvent::Resized(new_size),
            window_id,
        } if window_id == window.id() => {
            size = new_size;
            if size.width > 0 && size.height > 0 {
                session.resize(size.width, size.height, size.width, size.height);
            }
        }
        Event::AboutToWait => {
            // stand-in for the video element's frame-presented callback
            session.frame_presented(clock.elapsed().as_secs_f64(), size.width, size.height);
            for event in session.poll() {
                if let SessionEvent::EngineFailed(msg) = event {
                    log::error!("layout engine failed: {msg}");
                    target.exit();
                }
            }
            target.set_control_flow(ControlFlow::WaitUntil(
                Instant::now() + Duration::from_millis(16),
            ));
        }
        _ => {}
    })?;

    Ok(())
}

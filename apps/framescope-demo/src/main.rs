//! Instrumented host-application simulator.
//!
//! Stands in for a real rendering host: a ~60 Hz render loop plus background
//! worker threads, all instrumented with nested scopes, publishing snapshots
//! over TCP for the dashboard.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p framescope-demo
//! cargo run -p framescope-demo -- --port 4242 --duration 30
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use framescope::{profile_scope, Profiler};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Default port for the snapshot server.
const DEFAULT_PORT: u16 = 4242;

/// Target render frame duration (~60 Hz).
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// How often the latest snapshot is broadcast to connected dashboards.
const BROADCAST_INTERVAL: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (port, duration_secs) = parse_args();

    let profiler = Arc::new(Profiler::new());
    profiler.start()?;
    let server = profiler.serve(port)?;
    info!("demo host running, dashboard port {}", port);

    let running = Arc::new(AtomicBool::new(true));

    // Background workers, mirroring a host's logic/streaming threads.
    let logic = spawn_worker("logic", Arc::clone(&profiler), Arc::clone(&running), logic_tick);
    let streaming = spawn_worker(
        "streaming",
        Arc::clone(&profiler),
        Arc::clone(&running),
        streaming_tick,
    );

    render_loop(&profiler, &server, &running, duration_secs);

    running.store(false, Ordering::Relaxed);
    logic.join().ok();
    streaming.join().ok();
    server.stop();
    profiler.stop()?;
    Ok(())
}

fn parse_args() -> (u16, u64) {
    let args: Vec<String> = std::env::args().collect();
    let mut port = DEFAULT_PORT;
    let mut duration = 0u64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    if let Ok(p) = args[i + 1].parse() {
                        port = p;
                    }
                    i += 1;
                }
            }
            "--duration" | "-d" => {
                if i + 1 < args.len() {
                    if let Ok(d) = args[i + 1].parse() {
                        duration = d;
                    }
                    i += 1;
                }
            }
            "--help" => {
                println!("Framescope demo host");
                println!();
                println!("Usage: framescope-demo [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --port <PORT>     Snapshot server port (default: 4242)");
                println!("  -d, --duration <SEC>  Run time in seconds, 0 = forever (default: 0)");
                println!("      --help            Show this help message");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    (port, duration)
}

/// Render thread: nested frame scopes at ~60 Hz, with a little deterministic
/// jitter so the dashboard has something to show.
fn render_loop(
    profiler: &Arc<Profiler>,
    server: &framescope::IpcServer,
    running: &AtomicBool,
    duration_secs: u64,
) {
    profiler.mark_render_thread();

    let started = Instant::now();
    let mut last_broadcast = Instant::now();
    let mut frame: u64 = 0;

    while running.load(Ordering::Relaxed) {
        let frame_start = Instant::now();
        {
            profile_scope!(profiler.as_ref(), "Frame");
            {
                profile_scope!(profiler.as_ref(), "PollInput");
                busy_for(Duration::from_micros(150));
            }
            {
                profile_scope!(profiler.as_ref(), "Update");
                {
                    profile_scope!(profiler.as_ref(), "UpdateCursor");
                    busy_for(Duration::from_micros(300 + (frame % 5) * 80));
                }
                {
                    profile_scope!(profiler.as_ref(), "UpdateHotkeys");
                    busy_for(Duration::from_micros(100));
                }
            }
            {
                profile_scope!(profiler.as_ref(), "Render");
                {
                    profile_scope!(profiler.as_ref(), "DrawOverlay");
                    busy_for(Duration::from_micros(900 + (frame % 9) * 120));
                }
                {
                    profile_scope!(profiler.as_ref(), "DrawText");
                    busy_for(Duration::from_micros(250));
                }
            }
            {
                profile_scope!(profiler.as_ref(), "Present");
                busy_for(Duration::from_micros(200));
            }
        }

        if last_broadcast.elapsed() >= BROADCAST_INTERVAL {
            server.broadcast(&profiler.display_data());
            last_broadcast = Instant::now();
        }

        if duration_secs > 0 && started.elapsed() >= Duration::from_secs(duration_secs) {
            break;
        }

        frame += 1;
        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_INTERVAL {
            thread::sleep(FRAME_INTERVAL - elapsed);
        }
    }
}

fn spawn_worker(
    name: &'static str,
    profiler: Arc<Profiler>,
    running: Arc<AtomicBool>,
    tick: fn(&Profiler, u64),
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name(format!("demo-{name}"))
        .spawn(move || {
            let mut iteration: u64 = 0;
            while running.load(Ordering::Relaxed) {
                tick(profiler.as_ref(), iteration);
                iteration += 1;
                thread::sleep(FRAME_INTERVAL);
            }
        })
        .expect("failed to spawn worker thread")
}

/// ~60 Hz logic checks that do not need the render context.
fn logic_tick(profiler: &Profiler, iteration: u64) {
    profile_scope!(profiler, "LogicTick");
    {
        profile_scope!(profiler, "PollGraphicsHook");
        busy_for(Duration::from_micros(120));
    }
    {
        profile_scope!(profiler, "CheckWorldState");
        busy_for(Duration::from_micros(80 + (iteration % 3) * 60));
    }
}

fn streaming_tick(profiler: &Profiler, iteration: u64) {
    profile_scope!(profiler, "ScreenCacheRefresh");
    busy_for(Duration::from_micros(400 + (iteration % 11) * 50));
}

/// Spin for roughly the given duration, standing in for real work.
fn busy_for(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

//! `tether serve`: serve a document root and service the main run loop.

use anyhow::{anyhow, Context};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use tether_engine::{Bridge, ContextHandle, RunLoop, ServerConfig, TetherConfig};
use tether_http::FileServer;
use tether_sdk::ClassRegistry;

pub struct ServeArgs {
    pub root: Option<PathBuf>,
    pub overlays: Vec<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub config: Option<PathBuf>,
}

pub fn execute(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let settings = server_settings(config.server, &args)?;
    let root = settings
        .root
        .clone()
        .ok_or_else(|| anyhow!("No document root: pass <ROOT> or set server.root in the config file"))?;

    let bridge = Bridge::from_config(ClassRegistry::new(), &config.bridge)
        .context("Failed to start the bridge")?;

    let server = FileServer::with_overlays(&root, settings.overlays.clone()).host(settings.host.clone());
    let port = server
        .start(settings.port)
        .with_context(|| format!("Failed to serve {}", root.display()))?;

    println!("Serving {} on http://{}:{}/", root.display(), settings.host, port);
    for overlay in settings.overlays.iter().rev() {
        println!("  overlay: {}", overlay.display());
    }

    let main_loop = RunLoop::new("main");
    watch_stdin(main_loop.handle())?;
    main_loop.run();

    server.stop();
    drop(bridge);
    tracing::info!("serve finished");
    Ok(())
}

/// Stop `main` when a `quit` line arrives on stdin
fn watch_stdin(main: ContextHandle) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("tether-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if is_quit(&line) {
                    main.stop();
                    break;
                }
            }
        })
        .context("Failed to watch stdin")?;
    Ok(())
}

fn is_quit(line: &str) -> bool {
    matches!(line.trim(), "quit" | "exit")
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TetherConfig> {
    match path {
        Some(path) => TetherConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(TetherConfig::default()),
    }
}

/// Config file settings with command-line flags applied on top.
///
/// Overlays given on the command line come after the file's, so they win.
fn server_settings(mut config: ServerConfig, args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    if let Some(root) = &args.root {
        config.root = Some(root.clone());
    }
    config.overlays.extend(args.overlays.iter().cloned());
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    config.validate()?;
    Ok(config)
}

//! Check that the external render tools are available.

use reelcut_common::config::{config_file_path, EngineConfig};
use reelcut_render_engine::ffmpeg::command_exists;

pub fn run(config: &EngineConfig, ffmpeg: &str, ffprobe: &str) -> anyhow::Result<()> {
    println!("Reelcut System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;
    for (binary, role) in [(ffmpeg, "rendering and encoding"), (ffprobe, "source probing")] {
        if command_exists(binary) {
            println!("[OK] {binary} ({role})");
        } else {
            println!("[MISSING] {binary} ({role}): install ffmpeg or pass its path");
            ready = false;
        }
    }

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[WARN] Config: {} not found", config_path.display());
    }

    println!(
        "     Workers: {} (timeout {}s, {} attempt(s))",
        config.workers.effective_workers(),
        config.workers.segment_timeout_secs,
        config.workers.max_attempts()
    );

    println!();
    if ready {
        println!("All required tools are available. Reelcut is ready.");
        Ok(())
    } else {
        anyhow::bail!("required tools are missing")
    }
}

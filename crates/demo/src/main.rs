use anyhow::Result;
use clap::Parser;

use cubesync::{
    mode_data_for, CompressionMode, CubeScene, QuantizedSnapshot, SnapshotPipeline, TimeBase,
};

#[derive(Parser)]
#[command(name = "cubesync-demo")]
#[command(about = "Headless snapshot delta-compression demo")]
struct Args {
    #[arg(short, long, default_value_t = 5, help = "Compression mode index (0-7)")]
    mode: i32,

    #[arg(short, long, default_value_t = 10.0, help = "Simulated duration in seconds")]
    seconds: f32,

    #[arg(long, help = "Packet loss percentage override")]
    packet_loss: Option<f32>,

    #[arg(long, help = "Latency override in seconds")]
    latency: Option<f32>,

    #[arg(long, help = "Jitter override in seconds")]
    jitter: Option<f32>,

    #[arg(long, help = "Run every compression mode back to back")]
    all_modes: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.all_modes {
        let mut results = Vec::new();
        for mode in CompressionMode::ALL {
            results.push((mode, run_mode(mode, &args)));
        }
        log::info!("--- summary ---");
        for (mode, average) in results {
            log::info!("{:<28} {}", mode.description(), format_bandwidth(average));
        }
    } else {
        let mode = CompressionMode::from_index(args.mode)
            .ok_or_else(|| anyhow::anyhow!("invalid compression mode {}", args.mode))?;
        run_mode(mode, &args);
    }

    Ok(())
}

/// Drives the pipeline at a simulated 60 Hz and returns the average measured
/// bandwidth in kbps (after a one-second warmup).
fn run_mode(mode: CompressionMode, args: &Args) -> f32 {
    let mut mode_data = mode_data_for(mode);
    if let Some(packet_loss) = args.packet_loss {
        mode_data.packet_loss = packet_loss;
    }
    if let Some(latency) = args.latency {
        mode_data.latency = latency;
    }
    if let Some(jitter) = args.jitter {
        mode_data.jitter = jitter;
    }

    let mut scene = CubeScene::new();
    let initial = QuantizedSnapshot::quantize(scene.snapshot());
    let mut pipeline = SnapshotPipeline::with_mode_data(mode, mode_data, initial);

    let mut time = TimeBase {
        time: 0.0,
        delta_time: 1.0 / 60.0,
    };
    let ticks = (args.seconds * 60.0).max(60.0) as u64;

    let mut bandwidth_sum = 0.0f64;
    let mut bandwidth_samples = 0u64;

    log::info!(
        "[{}] {} ticks, loss {:.1}%, latency {:.0} ms, jitter {:.0} ms",
        mode.description(),
        ticks,
        pipeline.mode_data().packet_loss,
        pipeline.mode_data().latency * 1000.0,
        pipeline.mode_data().jitter * 1000.0,
    );

    for tick in 0..ticks {
        pipeline.update(time, scene.snapshot());

        if tick >= 60 {
            bandwidth_sum += pipeline.bandwidth_kbps() as f64;
            bandwidth_samples += 1;
        }
        if tick % 60 == 59 {
            log::info!(
                "[{}] t = {:.0}s, bandwidth {}",
                mode.description(),
                time.time + 1.0 / 60.0,
                format_bandwidth(pipeline.bandwidth_kbps())
            );
        }

        time.advance();
        scene.update(time.delta_time);
    }

    if bandwidth_samples > 0 {
        (bandwidth_sum / bandwidth_samples as f64) as f32
    } else {
        0.0
    }
}

fn format_bandwidth(kbps: f32) -> String {
    if kbps < 1024.0 {
        format!("{:.0} kbps", kbps)
    } else {
        format!("{:.2} mbps", kbps / 1000.0)
    }
}

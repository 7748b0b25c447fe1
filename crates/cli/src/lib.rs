use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gpu_residency::ResidencyConfig;
use gpu_resources::{
    HeadlessDevice, IndexBufferDesc, IndexFormat, ResidencyMode, ResourceCache, ResourceError,
    ResourceId, ResourceType, TextureDesc, VertexBufferDesc,
};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "residency-sim")]
#[command(about = "Frame-by-frame simulator for the GPU residency manager")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a seeded texture and buffer workload and print JSON statistics.
    Simulate(SimulateArgs),
    /// Print the effective residency configuration as TOML.
    Config {
        /// Configuration file; defaults to the environment.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// Frames to run
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Video memory budget in MB; the free-memory cushion is capped at a quarter of it
    #[arg(long, value_name = "MB")]
    budget_mb: Option<u64>,
    /// Cached textures to create
    #[arg(long, default_value_t = 48)]
    textures: usize,
    /// Size of each texture in KB before any downsizing
    #[arg(long, value_name = "KB", default_value_t = 1024)]
    texture_kb: u32,
    /// Vertex and index buffer pairs to create
    #[arg(long, default_value_t = 16)]
    buffers: usize,
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Pages re-evaluated per frame
    #[arg(long)]
    updates: Option<usize>,
    /// Lose the device at the start of this frame
    #[arg(long, value_name = "FRAME")]
    device_loss_at: Option<u64>,
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Simulate(args) => {
            let report = simulate(&args)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml());
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ResidencyConfig> {
    let config = match path {
        Some(path) => ResidencyConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => ResidencyConfig::from_env().context("failed to read config from environment")?,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    frames: u64,
    seed: u64,
    resources: usize,
    budget_bytes: u64,
    resident_bytes: u64,
    resident_pages: usize,
    utilization: f64,
    pressure: String,
    binds: u64,
    bind_failures: u64,
    page_ins: u64,
    page_outs: u64,
    page_in_failures: u64,
    page_out_failures: u64,
    dropped_priority_changes: u64,
    device_losses: u64,
    kinds: Vec<KindReport>,
    priority_levels: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct KindReport {
    kind: String,
    pages_in: usize,
    pages_out: usize,
    memory_in: u64,
    memory_out: u64,
}

/// How often a resource is bound.
#[derive(Debug, Clone, Copy)]
enum Heat {
    /// Every frame
    Hot,
    /// Roughly one frame in four
    Warm,
    /// Rarely
    Cold,
}

impl Heat {
    fn for_index(index: usize, count: usize) -> Self {
        if index * 8 < count {
            Heat::Hot
        } else if index * 2 < count {
            Heat::Warm
        } else {
            Heat::Cold
        }
    }

    fn bound_this_frame(self, rng: &mut StdRng) -> bool {
        match self {
            Heat::Hot => true,
            Heat::Warm => rng.gen_bool(0.25),
            Heat::Cold => rng.gen_bool(0.02),
        }
    }
}

fn simulate(args: &SimulateArgs) -> Result<SimulationReport> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(mb) = args.budget_mb {
        config = config.with_maximum_memory_mb(mb);
        config.minimum_memory = config.minimum_memory.min(config.maximum_memory / 4);
    }
    if let Some(updates) = args.updates {
        config = config.with_updates_per_frame(updates);
    }
    config.validate().context("invalid configuration")?;

    let budget_bytes = config.maximum_memory;
    let mut cache = ResourceCache::new(config, HeadlessDevice::new())
        .context("failed to set up the resource cache")?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let workload = create_workload(&mut cache, args, &mut rng)?;
    info!(
        "simulating {} frames over {} resources",
        args.frames,
        workload.len()
    );

    let (mut binds, mut bind_failures) = (0u64, 0u64);
    for frame in 1..=args.frames {
        cache.begin_frame();

        if args.device_loss_at == Some(frame) {
            cache.device_mut().lose();
            let invalidated = cache
                .on_device_lost()
                .context("failed to recover the device")?;
            info!("frame {frame}: device lost, {invalidated} pages invalidated");
        }

        for &(id, heat) in &workload {
            if !heat.bound_this_frame(&mut rng) {
                continue;
            }
            match cache.bind(id) {
                Ok(_) => binds += 1,
                Err(
                    ResourceError::OutOfVideoMemory { .. }
                    | ResourceError::DeviceLost
                    | ResourceError::PayloadUnavailable(_)
                    | ResourceError::Device(_),
                ) => bind_failures += 1,
                Err(error) => {
                    return Err(error).with_context(|| format!("frame {frame}: bind failed"))
                }
            }
        }

        cache.end_frame();
        debug!(
            "frame {frame}: {} bytes resident",
            cache.stats().memory_used
        );
    }

    let stats = cache.stats();
    let kinds = cache
        .manager()
        .kind_statistics()
        .into_iter()
        .filter_map(|statistics| {
            let resource_type = ResourceType::from_kind(statistics.kind)?;
            Some(KindReport {
                kind: resource_type.to_string(),
                pages_in: statistics.pages_in,
                pages_out: statistics.pages_out,
                memory_in: statistics.memory_in,
                memory_out: statistics.memory_out,
            })
        })
        .collect();
    let priority_levels = cache.manager().priority_level_counts();

    Ok(SimulationReport {
        frames: args.frames,
        seed: args.seed,
        resources: cache.len(),
        budget_bytes,
        resident_bytes: stats.memory_used,
        resident_pages: stats.resident_pages,
        utilization: stats.utilization(),
        pressure: stats.pressure().to_string(),
        binds,
        bind_failures,
        page_ins: stats.lifetime_page_ins,
        page_outs: stats.lifetime_page_outs,
        page_in_failures: stats.page_in_failures,
        page_out_failures: stats.page_out_failures,
        dropped_priority_changes: stats.dropped_priority_changes,
        device_losses: cache.device_losses(),
        kinds,
        priority_levels,
    })
}

fn create_workload(
    cache: &mut ResourceCache<HeadlessDevice>,
    args: &SimulateArgs,
    rng: &mut StdRng,
) -> Result<Vec<(ResourceId, Heat)>> {
    let mut workload = Vec::with_capacity(args.textures + args.buffers * 2);

    // 256 RGBA8 texels per row makes each row exactly 1 KB
    let texture = TextureDesc::rgba8(256, args.texture_kb.max(1));
    for index in 0..args.textures {
        let (id, created) = cache
            .create_texture_or_smaller(texture, ResidencyMode::Cached)
            .with_context(|| format!("failed to create texture {index}"))?;
        if created != texture {
            debug!(
                "texture {index} downsized to {}x{}",
                created.width, created.height
            );
        }
        workload.push((id, Heat::for_index(index, args.textures)));
    }

    for index in 0..args.buffers {
        let vertices = VertexBufferDesc {
            vertex_count: rng.gen_range(256..4096),
            stride: 32,
        };
        let indices = IndexBufferDesc {
            index_count: rng.gen_range(256..8192),
            format: if rng.gen_bool(0.5) {
                IndexFormat::U16
            } else {
                IndexFormat::U32
            },
        };
        let heat = Heat::for_index(index, args.buffers);
        let vertex_id = cache
            .create_vertex_buffer(vertices, ResidencyMode::Cached)
            .with_context(|| format!("failed to create vertex buffer {index}"))?;
        let index_id = cache
            .create_index_buffer(indices, ResidencyMode::Cached)
            .with_context(|| format!("failed to create index buffer {index}"))?;
        workload.push((vertex_id, heat));
        workload.push((index_id, heat));
    }

    Ok(workload)
}

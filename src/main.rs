//! oxide-sdpa CLI
//!
//! # Commands
//!
//! - `kernel` - Run the streaming kernel on random operands of one kind
//! - `attention` - Run multi-head self-attention against a float reference
//! - `cross` - Project static K/V once and reuse it over several query steps

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use half::bf16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use oxide_sdpa::{
    init_lanes, reference, AttentionConfig, AttentionWeights, Element, ExecutionMode, FixedPoint,
    HeadPolicy, LaneCount, Matrix, MultiHeadAttention, NumericKind, SdpaConfig, StreamingSdpa, I4,
};

#[derive(Parser)]
#[command(name = "oxide-sdpa")]
#[command(version, about = "Streaming quantized scaled dot-product attention", long_about = None)]
struct Cli {
    /// Worker lanes for parallel execution ("auto" or a count)
    #[arg(long, default_value = "auto", global = true)]
    lanes: String,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Seed for generated operands and weights
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the streaming kernel and compare it with a float64 reference
    ///
    /// Examples:
    ///   oxide-sdpa kernel --kind i8 --seq-len 64 --head-dim 32 --scale 1
    ///   oxide-sdpa kernel --kind bf16 --rows-per-batch 16 --execution parallel
    Kernel {
        /// Operand kind: f64, f32, bf16, i32, i16, i8, i4
        #[arg(short, long, default_value = "i8")]
        kind: String,

        #[arg(long, default_value = "64")]
        seq_len: usize,

        /// Key/value rows (defaults to seq-len)
        #[arg(long)]
        kv_len: Option<usize>,

        #[arg(long, default_value = "32")]
        head_dim: usize,

        #[arg(short = 'p', long, default_value = "8")]
        rows_per_batch: usize,

        #[arg(long, default_value = "15")]
        frac_bits: u32,

        /// Attention divisor (defaults to sqrt(head-dim))
        #[arg(long)]
        scale: Option<f64>,

        /// serial or parallel
        #[arg(long, default_value = "serial")]
        execution: String,

        /// JSON kernel configuration; overrides the shape flags
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Multi-head self-attention (f32) against an independent per-head reference
    Attention {
        #[arg(long, default_value = "128")]
        seq_len: usize,

        #[arg(long, default_value = "256")]
        model_dim: usize,

        #[arg(long, default_value = "4")]
        num_heads: usize,

        #[arg(long, default_value = "64")]
        head_dim: usize,

        /// Share K/V between groups of heads
        #[arg(long)]
        kv_heads: Option<usize>,

        #[arg(short = 'p', long, default_value = "8")]
        rows_per_batch: usize,

        #[arg(long, default_value = "serial")]
        execution: String,

        /// JSON attention configuration; overrides the shape flags
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Cross-attention with static K/V reused over several steps
    Cross {
        #[arg(long, default_value = "64")]
        seq_len: usize,

        #[arg(long, default_value = "256")]
        model_dim: usize,

        #[arg(long, default_value = "77")]
        context_len: usize,

        #[arg(long, default_value = "128")]
        context_dim: usize,

        #[arg(long, default_value = "4")]
        num_heads: usize,

        #[arg(long, default_value = "64")]
        head_dim: usize,

        #[arg(short = 'p', long, default_value = "8")]
        rows_per_batch: usize,

        /// Query steps that reuse the projected context
        #[arg(short = 'n', long, default_value = "10")]
        steps: usize,

        #[arg(long, default_value = "serial")]
        execution: String,

        /// JSON attention configuration; overrides the shape flags
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct KernelReport {
    kind: NumericKind,
    config: SdpaConfig,
    pearson: f64,
    max_abs_error: f64,
    transient_footprint_bytes: usize,
    elapsed_ms: f64,
}

#[derive(Serialize)]
struct AttentionReport {
    config: AttentionConfig,
    max_relative_error: f64,
    elapsed_ms: f64,
}

#[derive(Serialize)]
struct CrossReport {
    config: AttentionConfig,
    projection_ms: f64,
    static_step_ms: Vec<f64>,
    mean_static_step_ms: f64,
    mean_dynamic_step_ms: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    init_lanes(LaneCount::from_str(&cli.lanes));
    let mut rng = StdRng::seed_from_u64(cli.seed);

    match cli.command {
        Commands::Kernel {
            kind,
            seq_len,
            kv_len,
            head_dim,
            rows_per_batch,
            frac_bits,
            scale,
            execution,
            config,
        } => {
            let kind = NumericKind::from_str(&kind)
                .with_context(|| format!("unknown numeric kind '{}'", kind))?;
            let config = match config {
                Some(path) => load_config::<SdpaConfig>(&path)?,
                None => {
                    let mut config = SdpaConfig::cross(seq_len, kv_len.unwrap_or(seq_len), head_dim)
                        .with_rows_per_batch(rows_per_batch)
                        .with_fixed_point(FixedPoint::new(frac_bits)?)
                        .with_execution(ExecutionMode::from_str(&execution));
                    if let Some(scale) = scale {
                        config = config.with_scale(scale);
                    }
                    config
                }
            };
            let report = match kind {
                NumericKind::F64 => run_kernel::<f64>(config, &mut rng)?,
                NumericKind::F32 => run_kernel::<f32>(config, &mut rng)?,
                NumericKind::Bf16 => run_kernel::<bf16>(config, &mut rng)?,
                NumericKind::I32 => run_kernel::<i32>(config, &mut rng)?,
                NumericKind::I16 => run_kernel::<i16>(config, &mut rng)?,
                NumericKind::I8 => run_kernel::<i8>(config, &mut rng)?,
                NumericKind::I4 => run_kernel::<I4>(config, &mut rng)?,
            };
            print_report(&report)
        }
        Commands::Attention {
            seq_len,
            model_dim,
            num_heads,
            head_dim,
            kv_heads,
            rows_per_batch,
            execution,
            config,
        } => {
            let config = match config {
                Some(path) => load_config::<AttentionConfig>(&path)?,
                None => {
                    let policy = match kv_heads {
                        Some(kv_heads) => HeadPolicy::SharedKv { kv_heads },
                        None => HeadPolicy::IndependentKv,
                    };
                    AttentionConfig::self_attention(seq_len, model_dim, num_heads, head_dim)
                        .with_head_policy(policy)
                        .with_rows_per_batch(rows_per_batch)
                        .with_execution(ExecutionMode::from_str(&execution))
                }
            };
            print_report(&run_attention(config, &mut rng)?)
        }
        Commands::Cross {
            seq_len,
            model_dim,
            context_len,
            context_dim,
            num_heads,
            head_dim,
            rows_per_batch,
            steps,
            execution,
            config,
        } => {
            let config = match config {
                Some(path) => load_config::<AttentionConfig>(&path)?,
                None => AttentionConfig::cross_attention(
                    seq_len,
                    model_dim,
                    context_len,
                    context_dim,
                    num_heads,
                    head_dim,
                )
                .with_rows_per_batch(rows_per_batch)
                .with_execution(ExecutionMode::from_str(&execution)),
            };
            if steps == 0 {
                bail!("--steps must be at least 1");
            }
            print_report(&run_cross(config, steps, &mut rng)?)
        }
    }
}

fn load_config<C: DeserializeOwned>(path: &Path) -> Result<C> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse config {}", path.display()))
}

fn print_report<R: Serialize>(report: &R) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Integer kinds draw whole values from a small symmetric range; float kinds
/// draw from [-1, 1).
fn random_matrix<T: Element>(rng: &mut StdRng, rows: usize, cols: usize) -> Matrix<T> {
    if !T::KIND.is_integer() {
        return Matrix::from_fn(rows, cols, |_, _| T::from_f64(rng.gen_range(-1.0..1.0)));
    }
    let amplitude: i64 = match T::KIND {
        NumericKind::I32 => 1024,
        NumericKind::I16 => 256,
        _ => 8,
    };
    Matrix::from_fn(rows, cols, |_, _| {
        T::from_f64(rng.gen_range(-amplitude..amplitude) as f64)
    })
}

fn run_kernel<T: Element>(config: SdpaConfig, rng: &mut StdRng) -> Result<KernelReport> {
    let kernel = StreamingSdpa::<T>::new(config).context("Failed to build kernel")?;
    let q = random_matrix::<T>(rng, config.query_len, config.head_dim);
    let k = random_matrix::<T>(rng, config.kv_len, config.head_dim);
    let v = random_matrix::<T>(rng, config.kv_len, config.head_dim);

    let start = Instant::now();
    let out = kernel.forward(&q, &k, &v)?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;

    let expected = reference::attention(&q, &k, &v, config.scale)?;
    let out = out.to_f64();
    let max_abs_error = out
        .as_slice()
        .iter()
        .zip(expected.as_slice())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);

    tracing::info!("kernel {} finished in {:.3} ms", T::KIND, elapsed_ms);

    Ok(KernelReport {
        kind: T::KIND,
        config,
        pearson: reference::pearson(out.as_slice(), expected.as_slice()),
        max_abs_error,
        transient_footprint_bytes: kernel.transient_footprint(),
        elapsed_ms,
    })
}

fn run_attention(config: AttentionConfig, rng: &mut StdRng) -> Result<AttentionReport> {
    let mha = MultiHeadAttention::<f32>::new(config.clone()).context("Failed to build attention")?;
    let bound = 1.0 / (config.model_dim as f32).sqrt();
    let weights = AttentionWeights::<f32>::generate(&config, || rng.gen_range(-bound..bound));
    let x = random_matrix::<f32>(rng, config.seq_len, config.model_dim);

    let start = Instant::now();
    let out = mha.forward(&x, &weights)?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;

    let expected = reference::multi_head(&config, &x, &x, &weights)?;
    let max_relative_error = reference::normwise_error(&out.to_f64(), &expected);

    Ok(AttentionReport {
        config,
        max_relative_error,
        elapsed_ms,
    })
}

fn run_cross(config: AttentionConfig, steps: usize, rng: &mut StdRng) -> Result<CrossReport> {
    let mha = MultiHeadAttention::<f32>::new(config.clone()).context("Failed to build attention")?;
    let bound = 1.0 / (config.model_dim.max(config.context_dim) as f32).sqrt();
    let weights = AttentionWeights::<f32>::generate(&config, || rng.gen_range(-bound..bound));
    let context = random_matrix::<f32>(rng, config.context_len, config.context_dim);

    let start = Instant::now();
    let kv = mha.project_static_kv(&context, &weights)?;
    let projection_ms = start.elapsed().as_secs_f64() * 1e3;

    let mut static_step_ms = Vec::with_capacity(steps);
    let mut dynamic_total_ms = 0.0;
    for step in 0..steps {
        let x = random_matrix::<f32>(rng, config.seq_len, config.model_dim);

        let start = Instant::now();
        mha.forward_with_kv(&x, &kv, &weights)?;
        static_step_ms.push(start.elapsed().as_secs_f64() * 1e3);

        let start = Instant::now();
        let fresh = mha.project_static_kv(&context, &weights)?;
        mha.forward_with_kv(&x, &fresh, &weights)?;
        dynamic_total_ms += start.elapsed().as_secs_f64() * 1e3;

        tracing::debug!("step {} static {:.3} ms", step, static_step_ms[step]);
    }

    let mean_static_step_ms = static_step_ms.iter().sum::<f64>() / steps as f64;
    Ok(CrossReport {
        config,
        projection_ms,
        static_step_ms,
        mean_static_step_ms,
        mean_dynamic_step_ms: dynamic_total_ms / steps as f64,
    })
}

/// gpudot – compute a dot product on a compute device and check it on the host.
///
///   gpudot                              → 65536 ones, i32, CPU backend
///   gpudot --elem f32 --fill random     → seeded random floats
///   gpudot --backend webgpu --len 1000000 → WebGPU device (needs `webgpu` feature)
///   gpudot --list-devices               → probe available devices and exit
///
/// Exit status is 0 on match, 2 on mismatch and 1 on any pipeline error.
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use gpudot::backend::Backend;
use gpudot::cpu::CpuBackend;
use gpudot::element::Element;
use gpudot::generate::Fill;
use gpudot::pipeline::{DotConfig, DotEngine, DEFAULT_EPSILON, DEFAULT_GROUP_SIZE};
use gpudot::verify::Verdict;
use gpudot::{BackendError, DotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Elem {
    I32,
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Host threads, always available.
    Cpu,
    /// wgpu device (Vulkan, Metal, DX12).
    Webgpu,
    /// OpenCL device.
    Opencl,
}

#[derive(Debug, Parser)]
#[command(name = "gpudot", version, about = "Dot product on a compute device, verified on the host")]
struct Cli {
    /// Number of elements in each input vector.
    #[arg(long, default_value_t = 65536)]
    len: usize,

    /// Element type.
    #[arg(long, value_enum, default_value_t = Elem::I32)]
    elem: Elem,

    /// How to fill the inputs: ones, ramp or random.
    #[arg(long, default_value = "ones")]
    fill: Fill,

    /// Seed for random fills.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Lanes per reduction group.
    #[arg(long, default_value_t = DEFAULT_GROUP_SIZE)]
    group_size: usize,

    /// Absolute float verification tolerance.
    #[arg(long, default_value_t = DEFAULT_EPSILON)]
    epsilon: f64,

    #[arg(long, value_enum, default_value_t = BackendKind::Cpu)]
    backend: BackendKind,

    /// List compute devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    fn fill(&self) -> Fill {
        match self.fill {
            Fill::Random { .. } => Fill::Random { seed: self.seed },
            other => other,
        }
    }

    fn config(&self) -> DotConfig {
        DotConfig::default()
            .with_group_size(self.group_size)
            .with_epsilon(self.epsilon)
    }
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn list_devices() {
    println!("Compute devices:");
    println!();
    println!("  BACKEND  NAME");
    println!("  -------  ----");
    println!("  cpu      host ({} threads)", rayon::current_num_threads());

    #[cfg(feature = "webgpu")]
    for dev in gpudot::webgpu::probe_devices() {
        println!(
            "  webgpu   {} [{}] gpu={} max_group={}",
            dev.name, dev.backend, dev.is_gpu, dev.max_work_group_size
        );
    }
    #[cfg(not(feature = "webgpu"))]
    println!("  webgpu   (not built; enable the `webgpu` feature)");

    #[cfg(feature = "opencl")]
    for dev in gpudot::opencl::probe_devices() {
        println!(
            "  opencl   {} [{}] gpu={} max_group={} mem={} MiB",
            dev.name,
            dev.vendor,
            dev.is_gpu,
            dev.max_work_group_size,
            dev.global_mem_size >> 20
        );
    }
    #[cfg(not(feature = "opencl"))]
    println!("  opencl   (not built; enable the `opencl` feature)");
}

fn run_typed<T, B>(backend: &B, cli: &Cli) -> DotResult<Verdict>
where
    T: Element,
    B: Backend<T> + ?Sized,
{
    let (a, b): (Vec<T>, Vec<T>) = cli.fill().pair(cli.len);
    let outcome = DotEngine::new(backend, cli.config()).run(&a, &b)?;

    println!("The CPU result is: {}", outcome.reference);
    println!("The GPU result is: {}", outcome.value);
    println!("{}", outcome.verdict);
    println!(
        "{} element(s) of {} on {}, padded to {}, {} reduction pass(es)",
        cli.len,
        T::KIND,
        backend.name(),
        outcome.padded_len,
        outcome.passes
    );
    println!("{}", outcome.timings);
    Ok(outcome.verdict)
}

fn run_on<B>(backend: &B, cli: &Cli) -> DotResult<Verdict>
where
    B: Backend<i32> + Backend<f32>,
{
    match cli.elem {
        Elem::I32 => run_typed::<i32, B>(backend, cli),
        Elem::F32 => run_typed::<f32, B>(backend, cli),
    }
}

fn run(cli: &Cli) -> DotResult<Verdict> {
    match cli.backend {
        BackendKind::Cpu => run_on(&CpuBackend::new(), cli),
        #[cfg(feature = "webgpu")]
        BackendKind::Webgpu => run_on(&gpudot::webgpu::WebGpuEngine::new()?, cli),
        #[cfg(feature = "opencl")]
        BackendKind::Opencl => run_on(&gpudot::opencl::OpenClEngine::new()?, cli),
        #[allow(unreachable_patterns)]
        other => Err(BackendError::Unsupported(format!(
            "backend {other:?} not compiled in; rebuild with `--features {}`",
            format!("{other:?}").to_lowercase()
        ))
        .into()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.log_level());

    if cli.list_devices {
        list_devices();
        return ExitCode::SUCCESS;
    }

    match run(&cli) {
        Ok(Verdict::Match) => ExitCode::SUCCESS,
        Ok(Verdict::Mismatch) => ExitCode::from(2),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use memspike::cli::{AnalyzeArgs, Cli, Commands, MonitorArgs, OutputFormat, RunArgs};
use memspike::config::Config;
use memspike::launcher::{self, LaunchSpec};
use memspike::monitor::{SamplingLoop, TerminationReason};
use memspike::recorder::TraceRecorder;
use memspike::report::{render_run_summary, AnalysisReport};
use memspike::sample::kb_to_mb;
use memspike::sampler::ProcfsProbe;
use memspike::{loader, monitor};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Conventional exit status after SIGINT
const EXIT_INTERRUPTED: u8 = 130;

/// Initialize tracing subscriber (RUST_LOG, or TRACE with --debug)
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file if given, then apply flag overrides
fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::default()),
    }
}

/// Ctrl+C flips the shared flag; the sampling loop notices it cooperatively
fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;
    Ok(interrupted)
}

/// Progress line printed whenever a running maximum advances
fn print_peak(sample: &memspike::sample::Sample, peaks: &monitor::PeakTracker) {
    eprintln!(
        "[{:6.2}s] Peak VmRSS: {:.1} MB (VmSize: {:.0} MB, VmData: {:.0} MB)",
        sample.elapsed_seconds,
        kb_to_mb(peaks.resident_kb),
        kb_to_mb(sample.virtual_size_kb),
        kb_to_mb(sample.data_segment_kb)
    );
}

fn exit_code_for(reason: TerminationReason) -> ExitCode {
    if reason == TerminationReason::Interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_monitor(args: MonitorArgs, mut config: Config) -> Result<ExitCode> {
    args.sampling.apply(&mut config);
    config.validate()?;

    let interrupted = install_interrupt_handler()?;
    let output = args.output_path();
    let recorder = TraceRecorder::open(&output)?;

    eprintln!(
        "Monitoring PID {} (interval: {}ms)",
        args.pid, config.monitor.interval_ms
    );
    eprintln!("Timeout: {}s", config.monitor.timeout_secs);
    eprintln!();

    let summary = SamplingLoop::new(args.pid, ProcfsProbe::new(), config.monitor)
        .with_cancel_flag(interrupted)
        .with_peak_callback(print_peak)
        .run(recorder)?;

    match summary.reason {
        TerminationReason::ProcessExited => eprintln!("Process {} terminated", args.pid),
        TerminationReason::ReadFailed => eprintln!("Process {} no longer readable", args.pid),
        TerminationReason::TimedOut => {
            eprintln!("Timeout reached ({}s)", config.monitor.timeout_secs)
        }
        TerminationReason::Interrupted => eprintln!("\nMonitoring interrupted by user"),
    }
    println!();
    print!("{}", render_run_summary(&summary));
    println!("Trace: {}", output.display());

    Ok(exit_code_for(summary.reason))
}

fn run_launch(args: RunArgs, mut config: Config) -> Result<ExitCode> {
    args.sampling.apply(&mut config);
    config.validate()?;

    let output_dir = args.output_dir.clone().unwrap_or_else(|| {
        PathBuf::from(format!("measurements_{}", launcher::unix_timestamp()))
    });
    let spec = LaunchSpec {
        command: args.command,
        output_dir,
        memory_limit_mb: args.memory_limit_mb,
        env: args.env,
    };

    println!("=== Integrated Memory Monitoring ===");
    println!("Command: {}", spec.command.join(" "));
    if let Some(limit) = spec.memory_limit_mb {
        println!("Memory limit: {} MB", limit);
    }
    println!("Output: {}", spec.output_dir.display());
    println!();

    let interrupted = install_interrupt_handler()?;
    let timeout_secs = config.monitor.timeout_secs;
    let outcome = launcher::run_with_monitoring(
        &spec,
        config.monitor,
        interrupted,
        |pid| eprintln!("Target PID: {}", pid),
        |summary| {
            match summary.reason {
                TerminationReason::Interrupted => {
                    eprintln!("\nMonitoring interrupted by user, terminating target")
                }
                TerminationReason::TimedOut => eprintln!(
                    "\nTimeout reached ({}s), waiting for target to exit",
                    timeout_secs
                ),
                _ => {}
            }
            println!();
            print!("{}", render_run_summary(summary));
        },
    )?;

    if let Some(status) = outcome.exit_status {
        eprintln!("Target exited with {}", status);
    }
    println!("Trace: {}", outcome.trace_path.display());
    println!("Recap: {}", outcome.recap_path.display());

    Ok(exit_code_for(outcome.summary.reason))
}

fn run_analyze(args: AnalyzeArgs, mut config: Config) -> Result<ExitCode> {
    args.apply(&mut config);
    config.validate()?;

    let trace = loader::load(&args.trace)
        .with_context(|| format!("Cannot analyze {}", args.trace.display()))?;
    let report = AnalysisReport::build(&args.trace, &trace, &config.spikes)
        .with_context(|| format!("Cannot analyze {}", args.trace.display()))?;

    match args.format {
        OutputFormat::Text => print!("{}", report.to_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = load_config(args.config.as_ref())?;

    match args.command {
        Commands::Monitor(monitor_args) => run_monitor(monitor_args, config),
        Commands::Run(run_args) => run_launch(run_args, config),
        Commands::Analyze(analyze_args) => run_analyze(analyze_args, config),
    }
}

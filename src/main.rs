//! Trialrig: rig control entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  ScriptedSource    QueueEventSource   LoggingOutputs           │
//! │  (EventSource)     (EventSource)      (OutputPort)             │
//! │  OscDispatcher     LogTrialSink       SerialDevice             │
//! │  (SoftCode)        (TrialSink)        (HardwarePort)           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            TrialRunner (pure logic)                    │    │
//! │  │  Machine · GlobalTimers · TrialLog                     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  StreamWorker / AmbientSensor / LightSensor (serial decoders)  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! trialrig demo
//! trialrig run task.json --inject 0.5:Port1In --inject 1.2:Port1Out
//! trialrig run task.json --live          # events typed on stdin
//! trialrig ambient --port /dev/ttyACM0 --count 5
//! trialrig stream --port /dev/ttyACM1 --seconds 10 --out stream.jsonl
//! trialrig light --port /dev/ttyACM2 --samples 200 --set 900:300
//! trialrig ports
//! ```

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tracing_subscriber::filter::LevelFilter;

use trialrig::adapters::jsonl::JsonlSink;
use trialrig::adapters::log_sink::{LogTelemetrySink, LogTrialSink};
use trialrig::adapters::osc::OscDispatcher;
use trialrig::adapters::outputs::LoggingOutputs;
use trialrig::adapters::queue_source::QueueEventSource;
use trialrig::adapters::serial_device::SerialDevice;
use trialrig::adapters::sim::ScriptedSource;
use trialrig::adapters::stream_task::StreamWorker;
use trialrig::app::context::TrialContext;
use trialrig::app::ports::{EventSource, TelemetrySink};
use trialrig::app::service::TrialRunner;
use trialrig::config::{RigConfig, SerialSettings};
use trialrig::events::{EventQueue, TrialEvent};
use trialrig::fsm::{
    GlobalTimerConfig, Machine, OutputChannel, State, StateMachineDescription, TrialLog,
};
use trialrig::serial::{AmbientSensor, LightSensor, StreamDecoder, Thresholds};
use trialrig::softcode::{BackgroundDispatcher, NullDispatcher, SoftCodeDispatch};

/// Behavioural trial rig controller
#[derive(Parser, Debug)]
#[command(name = "trialrig")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Rig configuration (JSON); missing file means defaults
    #[arg(short, long, default_value = "trialrig.json")]
    config: PathBuf,

    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulated global-timer ping-pong trial
    Demo,

    /// Run a state machine description
    Run {
        /// Description file (JSON)
        description: PathBuf,

        /// Scripted event as SECONDS:EVENT, e.g. 0.5:Port1In (repeatable)
        #[arg(short, long)]
        inject: Vec<String>,

        /// Real-time run; event names are read from stdin, `abort` aborts
        #[arg(long)]
        live: bool,

        /// Number of trials to run back to back
        #[arg(short, long, default_value = "1")]
        trials: u32,
    },

    /// Read the ambient module
    Ambient {
        /// Serial port (overrides config)
        #[arg(short, long)]
        port: Option<String>,

        /// Number of readings
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Pause between readings in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Append readings to a JSON-lines file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Record the sample stream
    Stream {
        /// Serial port (overrides config)
        #[arg(short, long)]
        port: Option<String>,

        /// Recording length in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Append samples to a JSON-lines file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Measure the light sensor and optionally set its thresholds
    Light {
        /// Serial port (overrides config)
        #[arg(short, long)]
        port: Option<String>,

        /// Readings per measurement
        #[arg(short = 'n', long, default_value = "100")]
        samples: usize,

        /// Thresholds to program, as LIGHT:DARK
        #[arg(long)]
        set: Option<String>,
    },

    /// List serial ports
    Ports,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logger init failed: {e}"))?;

    info!("Trialrig v{}", env!("CARGO_PKG_VERSION"));

    let config = RigConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Demo => run_demo(&config),
        Commands::Run {
            description,
            inject,
            live,
            trials,
        } => run_description(&config, &description, &inject, live, trials),
        Commands::Ambient {
            port,
            count,
            interval_ms,
            out,
        } => run_ambient(&config, port, count, Duration::from_millis(interval_ms), out),
        Commands::Stream { port, seconds, out } => {
            run_stream(&config, port, Duration::from_secs(seconds), out)
        }
        Commands::Light { port, samples, set } => run_light(&config, port, samples, set.as_deref()),
        Commands::Ports => {
            for name in SerialDevice::available() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

// ── Trials ────────────────────────────────────────────────────

/// Timer 1 runs for three seconds while two ports alternate every 250 ms;
/// its end edge exits from whichever port is lit.
fn demo_description() -> StateMachineDescription {
    let mut sma = StateMachineDescription::new();
    sma.set_global_timer(GlobalTimerConfig::new(1, Duration::from_secs(3)))
        .add_state(
            State::new("TimerTrig", Duration::from_millis(1))
                .on(TrialEvent::Tup, "Port1Lit")
                .output(OutputChannel::GlobalTimerTrig, 1),
        )
        .add_state(
            State::new("Port1Lit", Duration::from_millis(250))
                .on(TrialEvent::Tup, "Port3Lit")
                .on(TrialEvent::global_timer_end(1), "exit")
                .output(OutputChannel::Pwm(1), 255),
        )
        .add_state(
            State::new("Port3Lit", Duration::from_millis(250))
                .on(TrialEvent::Tup, "Port1Lit")
                .on(TrialEvent::global_timer_end(1), "exit")
                .output(OutputChannel::Pwm(3), 255),
        );
    sma
}

fn run_demo(config: &RigConfig) -> Result<()> {
    let machine = demo_description().build()?;
    let ctx = TrialContext::new(1, config.clone());
    let mut source = ScriptedSource::new();
    let log = run_trial(&ctx, &machine, &mut source, &mut NullDispatcher)?;
    print_export(&log)
}

fn run_description(
    config: &RigConfig,
    path: &Path,
    inject: &[String],
    live: bool,
    trials: u32,
) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let machine = StateMachineDescription::from_json(&text)
        .with_context(|| format!("parsing {}", path.display()))?
        .build()?;

    let mut dispatcher = softcode_dispatcher(config);
    let mut ctx = TrialContext::new(1, config.clone());

    if live {
        let queue = Arc::new(EventQueue::new());
        spawn_stdin_reader(Arc::clone(&queue))?;
        let mut source = QueueEventSource::new(queue);
        for _ in 0..trials {
            let log = run_trial(&ctx, &machine, &mut source, &mut dispatcher)?;
            print_export(&log)?;
            ctx = ctx.next();
        }
    } else {
        let script = inject
            .iter()
            .map(String::as_str)
            .map(parse_injection)
            .collect::<Result<Vec<_>>>()?;
        for _ in 0..trials {
            let mut source = script
                .iter()
                .fold(ScriptedSource::new(), |s, &(at, ev)| s.with_event(at, ev));
            let log = run_trial(&ctx, &machine, &mut source, &mut dispatcher)?;
            print_export(&log)?;
            ctx = ctx.next();
        }
    }
    Ok(())
}

fn run_trial(
    ctx: &TrialContext,
    machine: &Machine,
    source: &mut impl EventSource,
    dispatcher: &mut impl SoftCodeDispatch,
) -> Result<TrialLog> {
    let mut runner = TrialRunner::new(ctx);
    let mut outputs = LoggingOutputs::new();
    let mut sink = LogTrialSink::new();
    let log = runner.run(machine, source, &mut outputs, dispatcher, &mut sink)?;
    Ok(log)
}

fn softcode_dispatcher(config: &RigConfig) -> Box<dyn SoftCodeDispatch> {
    match OscDispatcher::new(&config.softcode) {
        Ok(osc) if config.softcode.background => Box::new(BackgroundDispatcher::spawn(osc)),
        Ok(osc) => Box::new(osc),
        Err(e) => {
            warn!("OSC endpoint {} unavailable ({}), soft codes disabled", config.softcode.endpoint(), e);
            Box::new(NullDispatcher)
        }
    }
}

/// `"0.5:Port1In"` → (500 ms, Port1In)
fn parse_injection(spec: &str) -> Result<(Duration, TrialEvent)> {
    let Some((secs, name)) = spec.split_once(':') else {
        bail!("injection '{spec}' is not SECONDS:EVENT");
    };
    let secs: f64 = secs.trim().parse().with_context(|| format!("bad time in '{spec}'"))?;
    let at = Duration::try_from_secs_f64(secs).with_context(|| format!("bad time in '{spec}'"))?;
    let event = name.trim().parse::<TrialEvent>()?;
    Ok((at, event))
}

fn spawn_stdin_reader(queue: Arc<EventQueue>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin-events".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("abort") {
                    queue.abort();
                    continue;
                }
                match line.parse::<TrialEvent>() {
                    Ok(event) => {
                        if !queue.push(event) {
                            warn!("Event queue full, dropped {}", event);
                        }
                    }
                    Err(e) => warn!("{}", e),
                }
            }
        })?;
    Ok(())
}

fn print_export(log: &TrialLog) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&log.export())?);
    Ok(())
}

// ── Serial modules ────────────────────────────────────────────

fn open_port(settings: &SerialSettings, port: Option<String>) -> Result<(SerialDevice, SerialSettings)> {
    let mut settings = settings.clone();
    if port.is_some() {
        settings.port = port;
    }
    let Some(path) = settings.port.clone() else {
        bail!("no serial port given; available: {:?}", SerialDevice::available());
    };
    let device = SerialDevice::open(&path, &settings).with_context(|| format!("opening {path}"))?;
    Ok((device, settings))
}

fn telemetry_sink(out: Option<PathBuf>, config: &RigConfig) -> Result<Box<dyn TelemetrySink + Send>> {
    match out.or_else(|| config.telemetry_path.clone()) {
        Some(path) => {
            let sink = JsonlSink::create(&path).with_context(|| format!("opening {}", path.display()))?;
            info!("Recording telemetry to {}", path.display());
            Ok(Box::new(sink))
        }
        None => Ok(Box::new(LogTelemetrySink)),
    }
}

fn run_ambient(
    config: &RigConfig,
    port: Option<String>,
    count: u32,
    interval: Duration,
    out: Option<PathBuf>,
) -> Result<()> {
    let (device, settings) = open_port(&config.ambient_sensor, port)?;
    let mut sensor = AmbientSensor::new(device, &settings);
    let mut sink = telemetry_sink(out, config)?;
    for i in 0..count {
        if i > 0 {
            std::thread::sleep(interval);
        }
        let sample = sensor.sample()?;
        sink.record(&sample);
    }
    Ok(())
}

fn run_stream(
    config: &RigConfig,
    port: Option<String>,
    length: Duration,
    out: Option<PathBuf>,
) -> Result<()> {
    let (device, settings) = open_port(&config.light_sensor, port)?;
    let decoder = StreamDecoder::new(device, &settings);
    let sink = telemetry_sink(out, config)?;
    let worker = StreamWorker::spawn(decoder, sink)?;

    let started = std::time::Instant::now();
    while started.elapsed() < length && !worker.is_finished() {
        std::thread::sleep(Duration::from_millis(50));
    }
    match worker.stop() {
        Ok(device) => {
            info!("Stream closed on {}", device.name());
            Ok(())
        }
        Err(failure) => Err(failure.error.into()),
    }
}

fn run_light(
    config: &RigConfig,
    port: Option<String>,
    samples: usize,
    set: Option<&str>,
) -> Result<()> {
    let (device, settings) = open_port(&config.light_sensor, port)?;
    let mut sensor = LightSensor::new(device, &settings);
    sensor.handshake()?;

    match sensor.measure(samples)? {
        Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
        None => warn!("No readings"),
    }

    if let Some(spec) = set {
        let Some((light, dark)) = spec.split_once(':') else {
            bail!("thresholds '{spec}' are not LIGHT:DARK");
        };
        let thresholds = Thresholds {
            light: light.trim().parse().context("bad light threshold")?,
            dark: dark.trim().parse().context("bad dark threshold")?,
        };
        sensor.set_thresholds(thresholds)?;
        info!("Thresholds set: light={} dark={}", thresholds.light, thresholds.dark);
    }
    Ok(())
}

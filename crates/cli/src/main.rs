// TimerBlink - Overflow-Driven Blinker
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod size_limited_writer;
mod vcd_trace;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use timerblink_config::{
    parse_frequency, parse_size, BoardConfig, Level, StopReason, TestAssertion, TestLimits,
    TestScript,
};
use timerblink_core::board::{RunLimits, RunOutcome};
use timerblink_core::firmware::{self, BlinkState, BlinkTiming, Prescaler};
use timerblink_core::signals::{PinEvent, PinRecorder};
use timerblink_core::Board;
use vcd_trace::VcdObserver;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";
const DEFAULT_RUN_OVERFLOWS: u64 = 3600;
const DEFAULT_MAX_VCD_SIZE: &str = "1MB";

#[derive(Parser, Debug)]
#[command(author, version, about = "Timer0 overflow blinker on a simulated ATmega328P", long_about = None)]
struct Cli {
    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot the blinker and simulate it for a while.
    Run(RunArgs),

    /// Deterministic, CI-friendly runner mode driven by a test script (YAML).
    Test(TestArgs),

    /// Print prescaler options and the blink timing each would give.
    Timing(TimingArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Board description (YAML). Defaults to an Arduino Uno.
    #[arg(short, long)]
    board: Option<PathBuf>,

    /// Stop after this many serviced overflows (default: 3600)
    #[arg(long, conflicts_with_all = ["duration_ms", "max_cycles"])]
    overflows: Option<u64>,

    /// Stop after this much simulated time
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Stop after this many CPU cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Write the indicator waveform to a VCD file
    #[arg(long)]
    vcd: Option<PathBuf>,

    /// Cap on the VCD file, e.g. "64KB"
    #[arg(long, default_value = DEFAULT_MAX_VCD_SIZE)]
    max_vcd_size: String,

    /// Write a board snapshot (JSON) after the run
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the summary as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Board description; overrides `inputs.board` in the script
    #[arg(short, long)]
    board: Option<PathBuf>,

    /// Directory to write test artifacts (result.json, snapshot.json, trace.vcd)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Override max cycles limit
    #[arg(long)]
    max_cycles: Option<u64>,
}

#[derive(Parser, Debug)]
struct TimingArgs {
    /// CPU clock, e.g. "16MHz"
    #[arg(long, default_value = "16MHz")]
    clock: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    cycles: u64,
    elapsed_secs: f64,
    serviced_overflows: u64,
    toggles: u64,
    stop_reason: StopReason,
    stop_reason_details: StopReasonDetails,
    limits: TestLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    assertions: Vec<AssertionResult>,
    board_hash: String,
    config: TestConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct StopReasonDetails {
    triggered_stop_condition: StopReason,
    triggered_limit: Option<NamedU64>,
    observed: Option<NamedU64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct NamedU64 {
    name: String,
    value: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AssertionResult {
    assertion: TestAssertion,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    observed: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct TestConfig {
    board: Option<PathBuf>,
    script: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    board: String,
    clock_hz: u64,
    stop_reason: StopReason,
    cycles: u64,
    elapsed_secs: f64,
    serviced_overflows: u64,
    toggles: Vec<PinEvent>,
    indicator_lit: bool,
    board_hash: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_interactive(args),
        Commands::Test(args) => run_test(args),
        Commands::Timing(args) => run_timing(args),
    }
}

/// Board config plus the bytes it was read from, for fingerprinting.
struct LoadedBoard {
    config: BoardConfig,
    hash: String,
}

fn load_board(path: Option<&Path>) -> anyhow::Result<LoadedBoard> {
    let (config, bytes) = match path {
        Some(path) => {
            info!("Loading board config: {:?}", path);
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read board config at {:?}", path))?;
            let text = String::from_utf8_lossy(&bytes);
            (BoardConfig::from_yaml(&text)?, bytes)
        }
        None => {
            info!("Using default board (Arduino Uno)");
            let config = BoardConfig::default();
            let bytes = serde_yaml::to_string(&config)?.into_bytes();
            (config, bytes)
        }
    };
    Ok(LoadedBoard {
        config,
        hash: sha256_hex(&bytes),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// A booted board with the blinker installed and a recorder attached.
struct Session {
    board: Board,
    state: Arc<BlinkState>,
    recorder: Arc<PinRecorder>,
    vcd: Option<Arc<VcdObserver>>,
    vcd_budget: Option<size_limited_writer::WriteBudget>,
}

impl Session {
    fn boot(config: &BoardConfig, vcd: Option<(&Path, u64)>) -> anyhow::Result<Self> {
        let mut board = Board::from_config(config)?;
        let state = Arc::new(BlinkState::new());
        let recorder = Arc::new(PinRecorder::new());
        board.add_observer(recorder.clone());

        let (vcd, vcd_budget) = match vcd {
            Some((path, max_bytes)) => {
                let (observer, budget) =
                    VcdObserver::create(path, board.indicator(), board.clock_hz(), max_bytes)
                        .with_context(|| format!("Failed to create VCD file {:?}", path))?;
                let observer = Arc::new(observer);
                board.add_observer(observer.clone());
                (Some(observer), Some(budget))
            }
            None => (None, None),
        };

        board.attach_blinker(state.clone());
        firmware::setup(&mut board);

        Ok(Self {
            board,
            state,
            recorder,
            vcd,
            vcd_budget,
        })
    }

    fn toggles(&self) -> Vec<PinEvent> {
        self.recorder.events_for(self.board.indicator())
    }

    fn finish(&self) {
        self.board.finish();
        if let Some(vcd) = &self.vcd {
            vcd.finish();
        }
        if let Some(budget) = &self.vcd_budget {
            if budget.truncated() {
                warn!(
                    "VCD trace truncated at {} bytes; raise the size cap to keep the full run",
                    budget.bytes_written()
                );
            }
        }
    }
}

fn run_interactive(args: RunArgs) -> ExitCode {
    info!("Starting TimerBlink");

    let loaded = match load_board(args.board.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let vcd_cap = match parse_size(&args.max_vcd_size) {
        Ok(cap) => cap,
        Err(e) => {
            error!("Invalid --max-vcd-size '{}': {:#}", args.max_vcd_size, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut session = match Session::boot(
        &loaded.config,
        args.vcd.as_deref().map(|path| (path, vcd_cap)),
    ) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut limits = RunLimits {
        max_overflows: args.overflows,
        max_cycles: args.max_cycles,
        duration: args.duration_ms.map(Duration::from_millis),
    };
    if limits == RunLimits::default() {
        limits.max_overflows = Some(DEFAULT_RUN_OVERFLOWS);
    }

    let outcome = match session.board.run_limited(&limits) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Simulation error: {}", e);
            session.finish();
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };
    session.finish();

    let summary = RunSummary {
        board: session.board.name().to_string(),
        clock_hz: session.board.clock_hz(),
        stop_reason: outcome.stop_reason,
        cycles: outcome.cycles,
        elapsed_secs: session.board.cycles_to_secs(outcome.cycles),
        serviced_overflows: outcome.overflows,
        toggles: session.toggles(),
        indicator_lit: session.board.indicator_lit(),
        board_hash: loaded.hash,
    };

    if args.json {
        match serde_json::to_string(&summary) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else {
        print_summary(&session.board, &summary);
    }

    if let Some(path) = &args.snapshot {
        if let Err(e) = write_json(path, &session.board.snapshot()) {
            error!("Failed to write snapshot {:?}: {:#}", path, e);
        }
    }

    ExitCode::from(EXIT_PASS)
}

fn print_summary(board: &Board, summary: &RunSummary) {
    println!("\n=== Indicator {} ===", board.indicator());
    for event in &summary.toggles {
        println!(
            "{:>12.6}s  cycle {:>12}  {:?}",
            board.cycles_to_secs(event.cycle),
            event.cycle,
            event.level
        );
    }
    println!("\n=== Summary ===");
    println!("Board:              {} @ {} Hz", summary.board, summary.clock_hz);
    println!("Stop reason:        {:?}", summary.stop_reason);
    println!("Simulated time:     {:.6} s", summary.elapsed_secs);
    println!("Cycles:             {}", summary.cycles);
    println!("Overflows serviced: {}", summary.serviced_overflows);
    println!("Toggles:            {}", summary.toggles.len());
    println!(
        "LED:                {}",
        if summary.indicator_lit { "on" } else { "off" }
    );
}

fn run_timing(args: TimingArgs) -> ExitCode {
    let clock_hz = match parse_frequency(&args.clock) {
        Ok(hz) => hz,
        Err(e) => {
            error!("Invalid --clock '{}': {}", args.clock, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let active = BlinkTiming::firmware(clock_hz).prescaler;
    println!(
        "{:>8} {:>8} {:>14} {:>14} {:>14}",
        "selector", "divisor", "overflow Hz", "toggle ms", "blink ms"
    );
    for prescaler in Prescaler::ALL {
        let timing = BlinkTiming::new(clock_hz, prescaler, firmware::OVERFLOW_THRESHOLD);
        println!(
            "{:>8} {:>8} {:>14.3} {:>14.3} {:>14.3}{}",
            prescaler.selector(),
            prescaler.divisor(),
            timing.overflow_hz(),
            timing.toggle_period_secs() * 1e3,
            timing.blink_period_secs() * 1e3,
            if prescaler == active { "  <- firmware" } else { "" }
        );
    }
    ExitCode::from(EXIT_PASS)
}

fn resolve_script_path(script_path: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        return p;
    }
    script_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(p)
}

fn build_stop_reason_details(
    stop_reason: StopReason,
    limits: &TestLimits,
    outcome: &RunOutcome,
) -> StopReasonDetails {
    let named = |name: &str, value: u64| NamedU64 {
        name: name.to_string(),
        value,
    };
    let (triggered_limit, observed) = match stop_reason {
        StopReason::MaxOverflows => (
            limits.max_overflows.map(|v| named("max_overflows", v)),
            Some(named("serviced_overflows", outcome.overflows)),
        ),
        StopReason::MaxCycles => (
            limits.max_cycles.map(|v| named("max_cycles", v)),
            Some(named("cycles", outcome.cycles)),
        ),
        StopReason::Duration => (
            limits.duration_ms.map(|v| named("duration_ms", v)),
            Some(named("cycles", outcome.cycles)),
        ),
        StopReason::ConfigError | StopReason::RuntimeError => (None, None),
    };

    StopReasonDetails {
        triggered_stop_condition: stop_reason,
        triggered_limit,
        observed,
    }
}

/// Where the board stood when `run_limited` returned an error.
fn runtime_error_outcome(board: &Board) -> RunOutcome {
    RunOutcome {
        stop_reason: StopReason::RuntimeError,
        cycles: board.cycles(),
        overflows: board.serviced_overflows(),
    }
}

fn evaluate_assertion(
    assertion: &TestAssertion,
    session: &mut Session,
    stop_reason: StopReason,
) -> AssertionResult {
    let toggles = session.toggles();
    let (passed, observed) = match assertion {
        TestAssertion::ToggleCount(a) => {
            let n = toggles.len() as u64;
            (n == a.toggle_count, serde_json::json!(n))
        }
        TestAssertion::IndicatorLevel(a) => {
            let level = if session.board.indicator_lit() {
                Level::High
            } else {
                Level::Low
            };
            (level == a.indicator_level, serde_json::json!(level))
        }
        TestAssertion::OverflowCounter(a) => {
            let n = session.state.read_overflows(&mut session.board);
            (n == a.overflow_counter, serde_json::json!(n))
        }
        TestAssertion::TogglePeriod(a) => {
            let intervals = session.recorder.intervals(session.board.indicator());
            if intervals.is_empty() {
                (false, serde_json::Value::Null)
            } else {
                let mean_cycles =
                    intervals.iter().sum::<u64>() as f64 / intervals.len() as f64;
                let ms = mean_cycles * 1e3 / session.board.clock_hz() as f64;
                let d = &a.toggle_period_ms;
                ((ms - d.expected).abs() <= d.tolerance, serde_json::json!(ms))
            }
        }
        TestAssertion::ExpectedStopReason(a) => (
            a.expected_stop_reason == stop_reason,
            serde_json::json!(stop_reason),
        ),
    };

    if !passed {
        warn!("Assertion failed: {:?} (observed {})", assertion, observed);
    }
    AssertionResult {
        assertion: assertion.clone(),
        passed,
        observed: Some(observed),
    }
}

fn run_test(args: TestArgs) -> ExitCode {
    let script = match TestScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, None, None, msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut resolved_limits = script.limits.clone();
    if args.max_cycles.is_some() {
        resolved_limits.max_cycles = args.max_cycles;
    }

    let board_path = args.board.clone().or_else(|| {
        script
            .inputs
            .board
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| resolve_script_path(&args.script, s))
    });

    let loaded = match load_board(board_path.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, board_path.as_ref(), Some(&resolved_limits), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let vcd_cap = match resolved_limits.max_vcd_size.as_deref().map(parse_size) {
        Some(Ok(cap)) => cap,
        Some(Err(e)) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, board_path.as_ref(), Some(&resolved_limits), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
        None => parse_size(DEFAULT_MAX_VCD_SIZE).unwrap_or(u64::MAX),
    };

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            let msg = format!("Failed to create output directory {:?}: {}", dir, e);
            error!("{}", msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    }
    let vcd_path = args.output_dir.as_ref().map(|d| d.join("trace.vcd"));

    let mut session = match Session::boot(
        &loaded.config,
        vcd_path.as_deref().map(|p| (p, vcd_cap)),
    ) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            write_config_error_outputs(&args, board_path.as_ref(), Some(&resolved_limits), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let limits = RunLimits {
        max_overflows: resolved_limits.max_overflows,
        max_cycles: resolved_limits.max_cycles,
        duration: resolved_limits.duration_ms.map(Duration::from_millis),
    };

    let outcome = match session.board.run_limited(&limits) {
        Ok(outcome) => outcome,
        Err(e) => {
            let msg = format!("Simulation error: {}", e);
            error!("{}", msg);
            session.finish();
            let failed = runtime_error_outcome(&session.board);
            let result = TestResult {
                result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
                status: "error".to_string(),
                cycles: session.board.cycles(),
                elapsed_secs: session.board.cycles_to_secs(session.board.cycles()),
                serviced_overflows: session.board.serviced_overflows(),
                toggles: session.toggles().len() as u64,
                stop_reason: failed.stop_reason,
                stop_reason_details: build_stop_reason_details(
                    failed.stop_reason,
                    &resolved_limits,
                    &failed,
                ),
                limits: resolved_limits,
                message: Some(msg),
                assertions: Vec::new(),
                board_hash: loaded.hash,
                config: TestConfig {
                    board: board_path,
                    script: args.script.clone(),
                },
            };
            write_outputs(&args, &result, &session.board);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    let assertion_results: Vec<AssertionResult> = script
        .assertions
        .iter()
        .map(|a| evaluate_assertion(a, &mut session, outcome.stop_reason))
        .collect();
    session.finish();

    let all_passed = assertion_results.iter().all(|a| a.passed);
    let status = if all_passed { "pass" } else { "fail" };

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        cycles: outcome.cycles,
        elapsed_secs: session.board.cycles_to_secs(outcome.cycles),
        serviced_overflows: outcome.overflows,
        toggles: session.toggles().len() as u64,
        stop_reason: outcome.stop_reason,
        stop_reason_details: build_stop_reason_details(
            outcome.stop_reason,
            &resolved_limits,
            &outcome,
        ),
        limits: resolved_limits,
        message: None,
        assertions: assertion_results,
        board_hash: loaded.hash,
        config: TestConfig {
            board: board_path,
            script: args.script.clone(),
        },
    };

    info!(
        "Test {}: {} overflows, {} toggles, stop reason {:?}",
        status, result.serviced_overflows, result.toggles, result.stop_reason
    );
    write_outputs(&args, &result, &session.board);

    if all_passed {
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_ASSERT_FAIL)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let f = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(f, value)?;
    Ok(())
}

fn write_outputs(args: &TestArgs, result: &TestResult, board: &Board) {
    let Some(output_dir) = &args.output_dir else {
        return;
    };
    if let Err(e) = write_json(&output_dir.join("result.json"), result) {
        error!("Failed to write result.json: {:#}", e);
    }
    if let Err(e) = write_json(&output_dir.join("snapshot.json"), &board.snapshot()) {
        error!("Failed to write snapshot.json: {:#}", e);
    }
}

fn write_config_error_outputs(
    args: &TestArgs,
    board_path: Option<&PathBuf>,
    limits: Option<&TestLimits>,
    message: String,
) {
    let Some(output_dir) = &args.output_dir else {
        return;
    };

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        cycles: 0,
        elapsed_secs: 0.0,
        serviced_overflows: 0,
        toggles: 0,
        stop_reason: StopReason::ConfigError,
        stop_reason_details: StopReasonDetails {
            triggered_stop_condition: StopReason::ConfigError,
            triggered_limit: None,
            observed: None,
        },
        limits: limits.cloned().unwrap_or_default(),
        message: Some(message),
        assertions: Vec::new(),
        board_hash: String::new(),
        config: TestConfig {
            board: board_path.cloned(),
            script: args.script.clone(),
        },
    };
    if let Err(e) = write_json(&output_dir.join("result.json"), &result) {
        error!("Failed to write result.json: {:#}", e);
    }
}

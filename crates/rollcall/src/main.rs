//! # Roll Call - student attendance client
//!
//! Desktop front end for the attendance API: sign-in, class enrollment,
//! QR check-in, and the face-liveness capture flow (frames are read from a
//! directory in place of a live camera).

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use rollcall::capture::{
    AdvancePolicy, CaptureDevices, CaptureSession, FlowObserver, FlowOutcome, ScreenState,
    UserAction,
};
use rollcall::config::{AppConfig, ConfigOverrides};
use rollcall::device::{DirectoryCamera, FixedLocator, GrantAll};
use rollcall::projection::project;
use rollcall::AppContext;
use rollcall_common::{ClassInfo, RegisterRequest, RollCallError};

/// Roll Call - student attendance client
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/rollcall.toml")]
    config: String,

    /// API base URL (overrides config)
    #[arg(long, env = "ROLLCALL_API_URL")]
    api_url: Option<String>,

    /// Credential store path (overrides config)
    #[arg(long, env = "ROLLCALL_STORAGE")]
    storage: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email or student ID
    Login {
        identifier: String,
        #[arg(long, env = "ROLLCALL_PASSWORD")]
        password: String,
    },
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        student_id: Option<String>,
        #[arg(long, env = "ROLLCALL_PASSWORD")]
        password: String,
    },
    /// Request a password reset
    ForgotPassword { identifier: String },
    /// Forget the stored session
    Logout,
    /// Show the signed-in student
    Whoami,
    /// List enrolled classes
    Classes {
        /// Ignore the cache
        #[arg(long)]
        refresh: bool,
    },
    /// List classes open for enrollment
    Available,
    Enroll { class_id: String },
    Unenroll { class_id: String },
    /// Validate scanned QR text
    Scan { qr: String },
    /// Mark attendance with a liveness check
    Attend {
        /// Scanned QR text
        #[arg(long, conflicts_with = "class_id", required_unless_present = "class_id")]
        qr: Option<String>,
        #[arg(long)]
        class_id: Option<String>,
        /// Directory of still frames standing in for the camera
        #[arg(long)]
        frames: PathBuf,
        /// Start each challenge without waiting for Enter
        #[arg(long)]
        auto: bool,
    },
    /// Attendance standing for a record
    Projection {
        #[arg(long)]
        attended: u32,
        #[arg(long)]
        total: u32,
        /// Minimum percentage (defaults to config)
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Roll Call");

    // Load configuration
    let overrides = ConfigOverrides {
        api_url: args.api_url.clone(),
        storage_path: args.storage.clone(),
    };
    let config = AppConfig::load(&args.config, &overrides)?;
    info!(path = %args.config, api = %config.api.base_url, "Configuration loaded");

    let ctx = AppContext::connect(config).await?;
    run(&ctx, args.command).await
}

async fn run(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::Login {
            identifier,
            password,
        } => {
            let user = ctx.session.login(&identifier, &password).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Command::Register {
            name,
            email,
            student_id,
            password,
        } => {
            let form = RegisterRequest {
                name,
                email,
                password,
                student_id,
            };
            let user = ctx.session.register(&form).await?;
            println!("Account created for {}", user.name);
        }
        Command::ForgotPassword { identifier } => {
            println!("{}", ctx.session.forgot_password(&identifier).await?);
        }
        Command::Logout => {
            ctx.sign_out().await;
            println!("Signed out");
        }
        Command::Whoami => match ctx.session.snapshot().await.user {
            Some(user) => {
                println!("{} <{}>", user.name, user.email);
                if let Some(student_id) = user.student_id {
                    println!("Student ID: {student_id}");
                }
            }
            None => println!("Not signed in"),
        },
        Command::Classes { refresh } => {
            require_session(ctx).await?;
            print_classes(&ctx.classes.fetch_enrolled(refresh).await?);
        }
        Command::Available => {
            require_session(ctx).await?;
            print_classes(&ctx.classes.fetch_available().await?);
        }
        Command::Enroll { class_id } => {
            require_session(ctx).await?;
            println!("{}", ctx.classes.enroll(&class_id).await?);
        }
        Command::Unenroll { class_id } => {
            require_session(ctx).await?;
            println!("{}", ctx.classes.unenroll(&class_id).await?);
        }
        Command::Scan { qr } => {
            require_session(ctx).await?;
            let check_in = ctx.check_in(&qr).await?;
            println!("Valid code for class {}", check_in.class_id);
            if let Some(schedule_id) = check_in.schedule_id {
                println!("Schedule: {schedule_id}");
            }
        }
        Command::Attend {
            qr,
            class_id,
            frames,
            auto,
        } => {
            require_session(ctx).await?;
            let class_id = match (qr, class_id) {
                (Some(qr), _) => ctx.check_in(&qr).await?.class_id,
                (None, Some(class_id)) => class_id,
                (None, None) => bail!("either --qr or --class-id is required"),
            };
            attend(ctx, class_id, frames, auto).await?;
        }
        Command::Projection {
            attended,
            total,
            threshold,
        } => {
            let threshold = threshold.unwrap_or(ctx.config.attendance.threshold);
            print_projection(attended, total, threshold)?;
        }
    }
    Ok(())
}

async fn require_session(ctx: &AppContext) -> Result<()> {
    if !ctx.session.is_authenticated().await {
        bail!("Not signed in. Run `rollcall login` first.");
    }
    Ok(())
}

fn print_classes(classes: &[ClassInfo]) {
    if classes.is_empty() {
        println!("No classes");
        return;
    }
    for class in classes {
        print!("{:<26} {:<10} {}", class.id, class.code, class.name);
        if let Some(ref instructor) = class.instructor {
            print!(" ({instructor})");
        }
        println!();
    }
}

fn print_projection(attended: u32, total: u32, threshold: f64) -> Result<()> {
    let p = project(attended, total, threshold)?;
    println!("Attendance: {:.1}% ({attended}/{total})", p.percentage);
    println!("Status:     {}", p.status);
    if p.classes_needed > 0 {
        println!("Attend the next {} classes to reach {threshold}%", p.classes_needed);
    } else {
        println!("You can miss {} classes and stay at {threshold}%", p.can_skip);
    }
    Ok(())
}

/// Terminal rendering of the capture screen
struct ConsoleObserver {
    /// Current screen, read by the keyboard task
    screen: watch::Sender<&'static str>,
    /// Presses Start on the first challenge when running unattended
    auto_start: Option<mpsc::Sender<UserAction>>,
}

impl FlowObserver for ConsoleObserver {
    fn on_state(&self, state: &ScreenState, session: Option<&CaptureSession>) {
        self.screen.send_replace(state.name());
        match state {
            ScreenState::Initializing => println!("Preparing liveness check..."),
            ScreenState::Ready => {
                let Some(session) = session else { return };
                if let Some(line) = ready_line(session) {
                    println!("{line}");
                }
                match &self.auto_start {
                    Some(tx) if session.current_index() == 0 => {
                        let _ = tx.try_send(UserAction::Start);
                    }
                    Some(_) => {}
                    None => println!("Press Enter when ready (q to quit)"),
                }
            }
            ScreenState::Capturing => println!("Capturing..."),
            ScreenState::Submitting => println!("Verifying attendance..."),
            ScreenState::Success { message } => println!("{message}"),
            ScreenState::Error { error } => {
                println!("Error: {}", error.user_message());
                println!("{}", error_prompt(error));
                if !error.is_retryable() {
                    // Enter no longer maps to Retry
                    self.screen.send_replace("halted");
                }
            }
            ScreenState::Countdown { .. } => {}
        }
    }

    fn on_tick(&self, remaining: u32) {
        println!("  {remaining}...");
    }
}

const PROGRESS_WIDTH: usize = 20;

fn progress_bar(progress: f64) -> String {
    let filled = (progress.clamp(0.0, 1.0) * PROGRESS_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(PROGRESS_WIDTH - filled))
}

/// Progress bar plus the current challenge's instruction
fn ready_line(session: &CaptureSession) -> Option<String> {
    let challenge = session.current_challenge()?;
    Some(format!(
        "{} {:>3.0}% {}: {}",
        progress_bar(session.progress()),
        session.progress() * 100.0,
        challenge.kind.label(),
        challenge.instruction_text()
    ))
}

fn error_prompt(error: &RollCallError) -> &'static str {
    if error.is_retryable() {
        "Press Enter to retry, q to quit"
    } else {
        "Press q to quit"
    }
}

async fn attend(ctx: &AppContext, class_id: String, frames: PathBuf, auto: bool) -> Result<()> {
    let camera = DirectoryCamera::open(&frames)
        .await
        .with_context(|| format!("Failed to open frames in {}", frames.display()))?;
    let location = &ctx.config.location;
    let devices = CaptureDevices {
        camera: Arc::new(camera),
        locator: Arc::new(FixedLocator::new(location.latitude, location.longitude)),
        permissions: Arc::new(GrantAll),
    };

    let mut settings = ctx.config.flow_settings();
    if auto && settings.machine.advance == AdvancePolicy::Manual {
        settings.machine.advance = AdvancePolicy::Automatic {
            delay: Duration::from_millis(ctx.config.capture.advance_delay_ms),
        };
    }

    let (action_tx, action_rx) = mpsc::channel(8);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let (screen_tx, screen_rx) = watch::channel(ScreenState::Initializing.name());

    let observer = Arc::new(ConsoleObserver {
        screen: screen_tx,
        auto_start: auto.then(|| action_tx.clone()),
    });
    let flow = ctx
        .capture_flow_with(devices, class_id, settings)
        .with_observer(observer);

    // Enter -> Start/Retry, q -> Dismiss
    let keys = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let action = match line.trim() {
                "q" | "quit" => UserAction::Dismiss,
                "c" => UserAction::CaptureNow,
                _ if *screen_rx.borrow() == "error" => UserAction::Retry,
                _ => UserAction::Start,
            };
            if action_tx.send(action).await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, leaving capture screen");
            let _ = cancel_tx.send(true);
        }
    });

    let outcome = flow.run(action_rx, cancel_rx).await;
    keys.abort();

    match outcome {
        FlowOutcome::Submitted { message } => {
            println!("Done: {message}");
            Ok(())
        }
        FlowOutcome::Cancelled => {
            println!("Attendance not submitted");
            Ok(())
        }
        FlowOutcome::Abandoned { error } => {
            Err(anyhow::Error::new(error).context("Attendance not recorded"))
        }
    }
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

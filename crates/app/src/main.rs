mod demo;
mod driver;

use std::fmt;

use backend::{ApiConfig, SessionIdentity};
use exam_core::model::{ExamConfig, ExamMode};
use services::{AppServices, Clock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_FILTER: &str = "services=info,backend=info,app=info";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidMode { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidMode { raw } => write!(
                f,
                "invalid --mode value: {raw} (expected practice, realistic or failed_questions)"
            ),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn require_number(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<u32, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [--offline] [--provider <name>] [--certification <code>]");
    eprintln!("                      [--mode <practice|realistic|failed_questions>]");
    eprintln!("                      [--questions <n>] [--minutes <n>] [--token <jwt>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --provider AWS --certification SAA-C03 --mode practice");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CERTI_BASE_URL, CERTI_TIMEOUT_MS, CERTI_RETRY_ATTEMPTS, CERTI_RETRY_DELAY_MS");
    eprintln!("  CERTI_PROVIDER, CERTI_CERTIFICATION, CERTI_TOKEN, RUST_LOG");
}

#[derive(Debug)]
struct Args {
    offline: bool,
    provider: String,
    certification: String,
    mode: ExamMode,
    question_count: Option<u32>,
    time_limit_minutes: Option<u32>,
    token: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            offline: false,
            provider: std::env::var("CERTI_PROVIDER").unwrap_or_else(|_| "AWS".into()),
            certification: std::env::var("CERTI_CERTIFICATION")
                .unwrap_or_else(|_| "SAA-C03".into()),
            mode: ExamMode::Practice,
            question_count: None,
            time_limit_minutes: None,
            token: std::env::var("CERTI_TOKEN").ok().filter(|t| !t.trim().is_empty()),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--offline" => parsed.offline = true,
                "--provider" => parsed.provider = require_value(args, "--provider")?,
                "--certification" => {
                    parsed.certification = require_value(args, "--certification")?;
                }
                "--mode" => {
                    let value = require_value(args, "--mode")?;
                    parsed.mode = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidMode { raw: value.clone() })?;
                }
                "--questions" => {
                    parsed.question_count = Some(require_number(args, "--questions")?);
                }
                "--minutes" => {
                    parsed.time_limit_minutes = Some(require_number(args, "--minutes")?);
                }
                "--token" => parsed.token = Some(require_value(args, "--token")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn exam_config(&self) -> ExamConfig {
        let mut config = ExamConfig::new(&self.provider, &self.certification, self.mode);
        if let Some(count) = self.question_count {
            config = config.with_question_count(count);
        }
        if let Some(minutes) = self.time_limit_minutes {
            config = config.with_time_limit_minutes(minutes);
        }
        config
    }

    fn identity(&self) -> SessionIdentity {
        match &self.token {
            Some(token) => SessionIdentity::authenticated(token.clone()),
            None => SessionIdentity::anonymous(),
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(&mut std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let identity = args.identity();
    let clock = Clock::default();
    let services = if args.offline {
        info!("using the offline demo backend");
        AppServices::in_memory(&demo::backend(), identity, clock)
    } else {
        let config = ApiConfig::load()?;
        info!(base_url = config.base_url(), "using the REST backend");
        AppServices::new_http(config, identity, clock)?
    };

    let health = services.health().await;
    if health.available {
        info!(status = %health.status, "backend reachable");
    } else {
        warn!(status = %health.status, "backend health check failed; trying anyway");
    }

    let sessions = services.sessions();
    let session = sessions.start_session(&args.exam_config()).await?;
    driver::run(sessions, session).await
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(&mut args.iter().map(|a| (*a).to_owned()))
    }

    #[test]
    fn parses_exam_selection() {
        let args = parse(&[
            "--offline",
            "--mode",
            "failed_questions",
            "--questions",
            "10",
            "--minutes",
            "15",
            "--token",
            "abc",
        ])
        .unwrap();
        assert!(args.offline);
        assert_eq!(args.mode, ExamMode::FailedQuestions);
        assert!(args.identity().is_authenticated());

        let config = args.exam_config();
        assert_eq!(config.effective_question_count(), 10);
        assert_eq!(config.effective_time_limit_minutes(), 15);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            parse(&["--mode", "speedrun"]),
            Err(ArgsError::InvalidMode { .. })
        ));
        assert!(matches!(
            parse(&["--questions", "many"]),
            Err(ArgsError::InvalidNumber { flag: "--questions", .. })
        ));
        assert!(matches!(
            parse(&["--provider"]),
            Err(ArgsError::MissingValue { flag: "--provider" })
        ));
        assert!(matches!(parse(&["--db"]), Err(ArgsError::UnknownArg(_))));
    }
}

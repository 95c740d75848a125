use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recurrence_engine::fence::parse_fence_date;
use recurrence_engine::window::parse_time;
use recurrence_engine::{
    deserialize_str, materialize, resolve_fence_with_order, BuilderInput, BuilderOptions,
    BuilderVariant, DateOrder, RecurrenceRule, ScheduleBuilder, TimeWindow,
};

#[derive(Parser, Debug)]
#[command(
    name = "recur",
    version,
    about = "Expand availability rules and normalise schedule payloads"
)]
struct Cli {
    /// JSON file with builder options (variant, date_order, today).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Dates before this day are never selected (YYYY-MM-DD).
    #[arg(long, global = true, value_name = "DATE")]
    today: Option<NaiveDate>,

    /// Read ambiguous dates such as 03/04/2025 as day-first.
    #[arg(long, global = true)]
    day_first: bool,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve two raw boundary strings into a date fence.
    Fence {
        min: String,
        max: String,
    },
    /// Expand a rule inside a fence and print the resulting payload.
    Expand {
        /// Fence start (any accepted date spelling).
        #[arg(long)]
        from: String,
        /// Fence end (any accepted date spelling).
        #[arg(long)]
        to: String,
        #[command(flatten)]
        rule: RuleArgs,
        /// Window applied to every selected date; repeat for several.
        #[arg(long = "window", value_name = "HH:MM-HH:MM")]
        windows: Vec<String>,
        /// Always write the explicit-dates shape.
        #[arg(long)]
        calendar: bool,
    },
    /// Re-serialise a payload in canonical form (file or stdin).
    Normalize { file: Option<PathBuf> },
    /// Print the absolute intervals of a payload in a timezone.
    Intervals {
        /// IANA timezone name, e.g. Europe/Paris.
        #[arg(long)]
        tz: String,
        file: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct RuleArgs {
    /// Weekdays, Monday = 0 .. Sunday = 6.
    #[arg(long, value_delimiter = ',', value_name = "D,..")]
    weekly: Vec<u8>,
    /// Days of the month, 1 .. 31.
    #[arg(long, value_delimiter = ',', value_name = "D,..")]
    monthly: Vec<u8>,
    /// A single date.
    #[arg(long, value_name = "DATE")]
    on: Option<String>,
    /// Explicit dates.
    #[arg(long, value_delimiter = ',', value_name = "DATE,..")]
    dates: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = load_options(&cli)?;
    tracing::debug!(?options, "builder options");
    match cli.command {
        Command::Fence { min, max } => {
            let fence = resolve_fence_with_order(Some(&min), Some(&max), options.date_order);
            println!("{}", serde_json::to_string(&fence)?);
        }
        Command::Expand {
            from,
            to,
            rule,
            windows,
            calendar,
        } => {
            let mut options = options;
            if calendar {
                options.variant = BuilderVariant::Calendar;
            }
            let rule = rule.into_rule(options.date_order)?;
            let windows = windows
                .iter()
                .map(|raw| parse_window(raw))
                .collect::<Result<Vec<_>>>()?;

            let mut builder =
                ScheduleBuilder::new(BuilderInput::new(Some(&from), Some(&to)), options);
            builder
                .set_rule(rule)
                .with_context(|| format!("expanding between '{from}' and '{to}'"))?;
            if !windows.is_empty() {
                builder.set_common_windows(windows);
            }
            println!("{}", builder.submit()?);
        }
        Command::Normalize { file } => {
            let raw = read_input(file.as_deref())?;
            let schedule = deserialize_str(&raw);
            println!("{}", schedule.to_payload().to_json()?);
        }
        Command::Intervals { tz, file } => {
            let raw = read_input(file.as_deref())?;
            let schedule = deserialize_str(&raw);
            let occurrences = materialize(&schedule.windows, &tz)?;
            println!("{}", serde_json::to_string(&occurrences)?);
        }
    }
    Ok(())
}

impl RuleArgs {
    fn into_rule(self, order: DateOrder) -> Result<RecurrenceRule> {
        if !self.weekly.is_empty() {
            return Ok(RecurrenceRule::weekly(self.weekly));
        }
        if !self.monthly.is_empty() {
            return Ok(RecurrenceRule::monthly(self.monthly));
        }
        if let Some(raw) = self.on {
            return Ok(RecurrenceRule::single(parse_date(&raw, order)?));
        }
        let dates = self
            .dates
            .iter()
            .map(|raw| parse_date(raw, order))
            .collect::<Result<Vec<_>>>()?;
        Ok(RecurrenceRule::dates(dates))
    }
}

fn parse_date(raw: &str, order: DateOrder) -> Result<NaiveDate> {
    match parse_fence_date(raw, order) {
        Some(date) => Ok(date),
        None => bail!("not a date: '{raw}'"),
    }
}

fn parse_window(raw: &str) -> Result<TimeWindow> {
    let (start, end) = raw
        .split_once('-')
        .with_context(|| format!("window '{raw}' is not HH:MM-HH:MM"))?;
    match (parse_time(start), parse_time(end)) {
        (Some(start), Some(end)) => Ok(TimeWindow::new(Some(start), Some(end))),
        _ => bail!("window '{raw}' is not HH:MM-HH:MM"),
    }
}

fn load_options(cli: &Cli) -> Result<BuilderOptions> {
    let mut options = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => BuilderOptions::default(),
    };
    if cli.today.is_some() {
        options.today = cli.today;
    }
    if cli.day_first {
        options.date_order = DateOrder::DayFirst;
    }
    Ok(options)
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading payload from stdin")?;
            Ok(buf)
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

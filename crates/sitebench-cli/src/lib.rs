#![allow(clippy::print_stdout)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use sitebench_client::{
    DispatchOutcome, FieldBinding, PageSession, ParsePolicy, RedirectMode, SiteClientConfig,
};

#[derive(Parser)]
#[command(name = "sitebench")]
#[command(about = "Drive a simulated site page from the command line")]
pub struct SitebenchCli {
    #[command(flatten)]
    pub page: PageArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct PageArgs {
    /// Page URL the client acts for. Falls back to SITEBENCH_PAGE_URL.
    #[arg(long, global = true)]
    pub page_url: Option<String>,
    /// Override the API root (default `../`, relative to the page).
    #[arg(long, global = true)]
    pub api_root: Option<String>,
    /// Fail on non-JSON success bodies instead of reading them as `{}`.
    #[arg(long, global = true)]
    pub strict_json: bool,
    #[arg(long, global = true, value_parser = parse_redirect_mode)]
    pub redirect_mode: Option<RedirectMode>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the full environment document
    Env,
    /// Look up a dotted path in the environment document
    Query(QueryArgs),
    /// Load the page and print the bound element texts
    Render(RenderArgs),
    /// Trace and mutate one user action
    Dispatch(DispatchArgs),
    /// Advance the simulated clock
    TimeTravel(TimeTravelArgs),
}

#[derive(Args)]
pub struct QueryArgs {
    pub path: String,
    /// Evaluate on the server instead of locally.
    #[arg(long)]
    pub remote: bool,
}

#[derive(Args)]
pub struct RenderArgs {
    /// `<element>=<path>[=<default>]`, repeatable.
    #[arg(long = "bind")]
    pub bindings: Vec<FieldBinding>,
}

#[derive(Args)]
pub struct DispatchArgs {
    pub task_id: String,
    pub action: String,
    #[arg(long, default_value = "{}", value_parser = parse_payload)]
    pub payload: Value,
    /// Elements to re-render after an in-place mutation.
    #[arg(long = "bind")]
    pub bindings: Vec<FieldBinding>,
}

#[derive(Args)]
pub struct TimeTravelArgs {
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub days: i64,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub hours: i64,
}

fn parse_redirect_mode(raw: &str) -> Result<RedirectMode, String> {
    RedirectMode::parse(raw).ok_or_else(|| format!("expected proxy_base or api_root, got {raw}"))
}

fn parse_payload(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|error| format!("payload is not JSON: {error}"))
}

impl PageArgs {
    /// Environment config with command-line flags layered on top.
    pub fn resolve(&self) -> Result<SiteClientConfig> {
        let mut config = match self.page_url.as_deref() {
            Some(page_url) => SiteClientConfig::from_env_with_page(page_url),
            None => SiteClientConfig::from_env(),
        }
        .context("failed to load site client config")?;

        if let Some(api_root) = &self.api_root {
            config.api_root = Some(api_root.clone());
        }
        if self.strict_json {
            config.parse_policy = ParsePolicy::Strict;
        }
        if let Some(mode) = self.redirect_mode {
            config.redirect_mode = mode;
        }
        Ok(config)
    }
}

pub async fn run() -> Result<()> {
    let cli = SitebenchCli::parse();
    let config = cli.page.resolve()?;
    match cli.command {
        Commands::Env => run_env(config).await,
        Commands::Query(args) => run_query(config, args).await,
        Commands::Render(args) => run_render(config, args).await,
        Commands::Dispatch(args) => run_dispatch(config, args).await,
        Commands::TimeTravel(args) => run_time_travel(config, args).await,
    }
}

fn session(config: SiteClientConfig, bindings: Vec<FieldBinding>) -> Result<PageSession> {
    PageSession::from_config(config, bindings).context("invalid page url")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_env(config: SiteClientConfig) -> Result<()> {
    let session = session(config, Vec::new())?;
    let document = session
        .loader()
        .load()
        .await
        .context("failed to load environment")?;
    print_json(&document.into_value())
}

async fn run_query(config: SiteClientConfig, args: QueryArgs) -> Result<()> {
    let session = session(config, Vec::new())?;
    let value = if args.remote {
        session
            .loader()
            .query(&args.path)
            .await
            .with_context(|| format!("remote query failed for {}", args.path))?
    } else {
        session
            .loader()
            .load()
            .await
            .context("failed to load environment")?
            .lookup(&args.path)
    };
    print_json(&value.unwrap_or(Value::Null))
}

async fn run_render(config: SiteClientConfig, args: RenderArgs) -> Result<()> {
    let session = session(config, args.bindings)?;
    session.open().await.context("failed to render page")?;
    print_json(&elements_json(&session))
}

async fn run_dispatch(config: SiteClientConfig, args: DispatchArgs) -> Result<()> {
    let session = session(config, args.bindings)?;
    let outcome = session
        .dispatch(&args.task_id, &args.action, args.payload)
        .await?;
    print_json(&outcome_json(&outcome, &session))
}

async fn run_time_travel(config: SiteClientConfig, args: TimeTravelArgs) -> Result<()> {
    let session = session(config, Vec::new())?;
    let new_time = session
        .loader()
        .advance_clock(args.days, args.hours)
        .await
        .context("time travel failed")?;
    println!("{new_time}");
    Ok(())
}

fn elements_json(session: &PageSession) -> Value {
    Value::Object(
        session
            .elements()
            .snapshot()
            .into_iter()
            .map(|(element_id, text)| (element_id, Value::String(text)))
            .collect::<Map<_, _>>(),
    )
}

fn outcome_json(outcome: &DispatchOutcome, session: &PageSession) -> Value {
    let response = Value::Object(outcome.response().extra.clone());
    match outcome {
        DispatchOutcome::Rendered { .. } => json!({
            "outcome": "rendered",
            "response": response,
            "elements": elements_json(session),
        }),
        DispatchOutcome::Navigated { target, .. } => json!({
            "outcome": "navigated",
            "target": target,
            "response": response,
        }),
    }
}

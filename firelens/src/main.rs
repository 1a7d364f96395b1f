//! firelens - wildfire hotspot queries and analysis chat from the terminal
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/firelens/firelens.log (~/.local/state/firelens/firelens.log)
//! - Config: $XDG_CONFIG_HOME/firelens/config.toml (~/.config/firelens/config.toml)

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use firelens_core::chart::ChartReport;
use firelens_core::chat::{
    ConversationManager, ConversationStore, HttpChatClient, Role, TurnOutcome,
};
use firelens_core::geo::{Feature, FeatureCollection, FilterParams, HttpFeatureSource, Viewport};
use firelens_core::map::{
    ClickHook, InMemoryMap, MapboxGeocoder, RefreshOutcome, SelectedPoint, Selection,
    ViewportSynchronizer,
};
use firelens_core::Config;

#[derive(Parser)]
#[command(name = "firelens")]
#[command(about = "Query wildfire hotspots and stream fire analysis")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective configuration
    Status,

    /// Fetch the hotspots inside a bounding box
    Hotspots {
        #[arg(long, allow_hyphen_values = true)]
        min_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        min_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lon: f64,

        /// Extra query filter, repeatable (e.g. -f confidence=high)
        #[arg(short, long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// Reverse geocode each hotspot (needs geocoding.access_token)
        #[arg(long)]
        districts: bool,
    },

    /// Ask the analysis agent a question
    Chat {
        prompt: String,

        /// Show reasoning on stderr
        #[arg(short, long, action = ArgAction::Count)]
        verbose: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        firelens_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("firelens starting");

    let result = match args.command {
        Command::Status => {
            print_status(&config);
            Ok(())
        }
        Command::Hotspots {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
            filters,
            districts,
        } => {
            let viewport = Viewport::new(min_lat, max_lat, min_lon, max_lon)
                .context("invalid bounding box")?;
            let filters = parse_filters(&filters)?;
            run_hotspots(&config, viewport, filters, districts).await
        }
        Command::Chat { prompt, verbose } => run_chat(&config, &prompt, verbose > 0).await,
    };

    tracing::info!(ok = result.is_ok(), "firelens exiting");
    result
}

fn print_status(config: &Config) {
    println!("Config: {}", Config::config_path().display());
    println!("Log:    {}", Config::log_path().display());
    println!();
    println!("API");
    println!("  base_url:           {}", config.api.base_url);
    println!("  user:               {}", config.api.user);
    println!("  timeout_secs:       {}", config.api.timeout_secs);
    println!("Map");
    println!("  source:             {}", config.map.source_name);
    println!("  layer:              {}", config.map.layer_id);
    println!("  settle_debounce_ms: {}", config.map.settle_debounce_ms);
    println!("  frame_interval_ms:  {}", config.map.frame_interval_ms);
    println!("  base_style:         {}", config.map.base_style);
    println!("  wind_style:         {}", config.map.wind_style);
    println!("Chat");
    println!(
        "  reasoning tags:     {} {}",
        config.chat.reasoning_open_tag, config.chat.reasoning_close_tag
    );
    println!("  payload_field:      {}", config.chat.payload_field);
    println!("Geocoding");
    println!(
        "  enabled:            {}",
        if config.geocoding.is_ready() { "yes" } else { "no" }
    );
    println!("Logging");
    println!("  level:              {}", config.logging.level);
}

fn parse_filters(pairs: &[String]) -> Result<FilterParams> {
    let mut filters = FilterParams::new();
    for pair in pairs {
        let (key, value) =
            FilterParams::parse_pair(pair).with_context(|| format!("invalid filter {:?}", pair))?;
        filters.set(key, Some(value));
    }
    Ok(filters)
}

async fn run_hotspots(
    config: &Config,
    viewport: Viewport,
    filters: FilterParams,
    districts: bool,
) -> Result<()> {
    let source = HttpFeatureSource::new(&config.api).context("failed to create API client")?;
    let map = InMemoryMap::new(viewport, &config.map.base_style);
    let on_click: ClickHook = Arc::new(|_: &Feature| {});
    let synchronizer = ViewportSynchronizer::new(map, source, &config.map, on_click);

    match synchronizer.refresh(Some(viewport), filters).await {
        RefreshOutcome::Applied { features, .. } => {
            tracing::info!(features, viewport = %viewport, "hotspots loaded");
        }
        RefreshOutcome::Malformed => bail!("server returned a malformed feature collection"),
        RefreshOutcome::Failed => bail!("hotspot query failed (see log for details)"),
        RefreshOutcome::Skipped | RefreshOutcome::Cancelled => {
            bail!("hotspot query did not run")
        }
    }

    let collection = synchronizer
        .map()
        .source_data(synchronizer.source_name())
        .unwrap_or_else(|| FeatureCollection::new(Vec::new()));
    let mut points: Vec<SelectedPoint> = collection
        .features
        .iter()
        .map(SelectedPoint::from_feature)
        .collect();

    if districts {
        let geocoder = MapboxGeocoder::new(&config.geocoding)
            .context("reverse geocoding is not configured")?;
        let selection = Selection::new();
        for point in &mut points {
            selection.publish(point.clone());
            if let Some(district) = selection.resolve_district(&geocoder).await {
                point.district = district;
            }
        }
    }

    println!("{} hotspot(s) in {}", points.len(), viewport);
    if points.is_empty() {
        return Ok(());
    }
    println!();
    println!(
        "{:>8}  {:>9}  {:>10}  {:<19}  {:>7}  {:<10}  {:>5}  {:<3}  {}",
        "ID", "LAT", "LON", "ACQUIRED (UTC)", "FRP", "CONFIDENCE", "NDVI", "D/N", "DISTRICT"
    );
    for point in &points {
        println!(
            "{:>8}  {:>9.4}  {:>10.4}  {:<19}  {:>7.1}  {:<10}  {:>5.2}  {:<3}  {}",
            point.id,
            point.latitude(),
            point.longitude(),
            point.date_time,
            point.frp,
            point.confidence,
            point.ndvi,
            if point.daynight { "D" } else { "N" },
            point.district
        );
    }
    Ok(())
}

async fn run_chat(config: &Config, prompt: &str, verbose: bool) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("prompt must not be empty");
    }

    let transport = HttpChatClient::new(&config.api).context("failed to create chat client")?;
    let store = ConversationStore::new();
    let conversation_id = store.create("");
    let manager = Arc::new(ConversationManager::new(
        transport,
        store.clone(),
        config.chat.clone(),
        &config.api.user,
    ));

    let mut changes = store.changes();
    let mut turn = tokio::spawn({
        let manager = Arc::clone(&manager);
        let conversation_id = conversation_id.clone();
        let prompt = prompt.to_string();
        async move { manager.send_message(&conversation_id, &prompt).await }
    });

    let mut printer = StreamPrinter::new(verbose);
    let outcome = loop {
        tokio::select! {
            joined = &mut turn => {
                break joined.context("chat task panicked")??;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(conversation = %conversation_id, "cancel requested");
                manager.cancel(&conversation_id);
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    continue;
                }
                if let Some(conversation) = store.get(&conversation_id) {
                    if let Some(message) = conversation.last_message() {
                        if message.role == Role::Agent {
                            printer.update(&message.content, &message.reasoning);
                        }
                    }
                }
            }
        }
    };

    let conversation = store
        .get(&conversation_id)
        .context("conversation disappeared")?;
    let message = conversation
        .last_message()
        .filter(|m| m.role == Role::Agent);
    if let Some(message) = message {
        printer.finish(&message.content);
    }

    match outcome {
        TurnOutcome::Completed => {
            if let Some(payload) = message.and_then(|m| m.chart_data.as_ref()) {
                print_chart_summary(payload);
            }
            Ok(())
        }
        TurnOutcome::Cancelled => {
            eprintln!("cancelled");
            Ok(())
        }
        TurnOutcome::Failed => bail!("chat request failed (see log for details)"),
        TurnOutcome::Skipped => Ok(()),
    }
}

/// Writes answer deltas to stdout and reasoning deltas to stderr.
struct StreamPrinter {
    verbose: bool,
    answer: String,
    reasoning: String,
}

impl StreamPrinter {
    fn new(verbose: bool) -> Self {
        Self {
            verbose,
            answer: String::new(),
            reasoning: String::new(),
        }
    }

    fn update(&mut self, answer: &str, reasoning: &str) {
        if self.verbose {
            if let Some(delta) = reasoning.strip_prefix(self.reasoning.as_str()) {
                if !delta.is_empty() {
                    eprint!("{}", delta);
                    self.reasoning = reasoning.to_string();
                }
            }
        }
        // Placeholders and payload stripping rewrite the answer; those show up in finish().
        if let Some(delta) = answer.strip_prefix(self.answer.as_str()) {
            if !delta.is_empty() {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
                self.answer = answer.to_string();
            }
        }
    }

    fn finish(&mut self, answer: &str) {
        if self.verbose && !self.reasoning.is_empty() {
            eprintln!();
        }
        if answer != self.answer {
            if !self.answer.is_empty() {
                println!();
            }
            print!("{}", answer);
        }
        println!();
    }
}

fn print_chart_summary(payload: &serde_json::Value) {
    let report = match ChartReport::from_payload(payload) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(error = %e, "chart payload did not decode");
            return;
        }
    };

    let text = &report.text_report;
    println!();
    println!("Fire report");
    println!("  hotspots:        {}", text.count);
    println!("  max FRP:         {:.1} MW", text.max_frp);
    println!("  fuel burn:       {:.1} kg/s", text.total_fuel_kg_s);
    println!("  angstrom index:  {:.2}", text.angstrom_index);
    println!("  wind speed:      {:.1} m/s", text.wind_speed);
    println!("  risk level:      {}", text.risk_level);

    let points = &report.viz_data.scatter_chart;
    if points.is_empty() {
        return;
    }
    let scale = report.axis_scale();
    let quadrants = report.quadrants();
    println!();
    println!(
        "FRP vs NDVI ({} points, axis max {:.0}, split at {:.1} MW)",
        points.len(),
        scale.suggested_max,
        scale.quadrant_threshold
    );
    println!(
        "  intense, dense {:>4}   intense, sparse {:>4}",
        quadrants.top_right, quadrants.top_left
    );
    println!(
        "  mild, dense    {:>4}   mild, sparse    {:>4}",
        quadrants.bottom_right, quadrants.bottom_left
    );
    if quadrants.out_of_range > 0 {
        println!("  {} point(s) beyond the axis", quadrants.out_of_range);
    }
}

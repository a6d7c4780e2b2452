use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use proxy_scan::{
    api::{ApiClient, FacetKind, ProxyFilter},
    checker::{ScanController, ScanState},
    proxy::{convert_proxies, parse_proxy_lines, OutputFormat, ProxyType},
    results::{
        export_records, export_results, ExportFormat, ResultStats, SortDirection, SortKey,
        SortState,
    },
    storage::{MemoryStorage, Preferences, ScanHistory, SqliteStorage, Storage, Theme},
    tui::ScanApp,
    Config,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Free proxy directory client and bulk proxy checker
#[derive(Parser)]
#[command(name = "proxy-scan")]
#[command(about = "Free proxy directory client and bulk proxy checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Proxy directory API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Database URL for history and preferences
    #[arg(short, long, global = true)]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a proxy list into valid, invalid and ignored lines
    Validate {
        /// File containing one proxy per line
        input: PathBuf,
        /// Maximum number of valid proxies
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Check a proxy list with the remote checking service
    Check {
        /// File containing one proxy per line
        input: PathBuf,
        /// Checking service WebSocket URL
        #[arg(long)]
        ws_url: Option<String>,
        /// Maximum number of proxies to check
        #[arg(short, long)]
        limit: Option<usize>,
        /// Export format (csv, json, clash, curl)
        #[arg(short, long)]
        export: Option<String>,
        /// Output file for the export (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Show the interactive scan view
        #[arg(long)]
        tui: bool,
    },
    /// Convert a proxy list to another format
    Convert {
        /// File containing one proxy per line
        input: PathBuf,
        /// Output format (plain, url, json, clash, curl)
        #[arg(short, long, default_value = "plain")]
        format: String,
        /// Proxy type for lines without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "socks5")]
        proxy_type: String,
    },
    /// Past scans
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Browse the proxy directory
    Proxies {
        /// Country code
        #[arg(long)]
        country: Option<String>,
        /// Protocol (http, https, socks4, socks5)
        #[arg(long)]
        protocol: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        anonymity: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        asn: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
        /// Sort column (freshness, delay, uptime, country)
        #[arg(short, long, default_value = "freshness")]
        sort: String,
        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,
        /// Export format (csv, json, clash, curl)
        #[arg(short, long)]
        export: Option<String>,
        /// Output file for the export (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Directory facet counts (countries, ports, protocols, cities, regions, asns)
    Facets {
        kind: String,
    },
    /// Directory statistics
    Stats,
    /// Details of an autonomous system
    Asn {
        asn: u32,
    },
    /// Show your address as seen by the API
    Whoami,
    /// Stored preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List past scans, newest first
    List,
    /// Show the results of one scan
    Show { id: String },
    /// Remove one scan
    Remove { id: String },
    /// Remove all scans
    Clear,
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Print all preferences
    Get,
    /// Latency (ms) above which a proxy is highlighted
    SetLatency { ms: u64 },
    /// Default country filter; empty string clears it
    SetCountry { country: String },
    /// Theme (light, dark, system)
    SetTheme { theme: String },
    /// Analytics consent
    Consent {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let quiet = matches!(&cli.command, Commands::Check { tui: true, .. });
    init_tracing(quiet);

    let mut config = Config::from_env()?;
    if let Some(url) = cli.api_url {
        config = config.with_api_url(url);
    }
    if let Some(db) = cli.database {
        config = config.with_database_url(db);
    }

    match cli.command {
        Commands::Validate { input, limit } => {
            let text = std::fs::read_to_string(&input)?;
            let parsed = parse_proxy_lines(&text, limit.unwrap_or(config.proxy_limit));

            println!(
                "Valid: {} | Invalid: {} | Ignored: {}",
                parsed.valid.len(),
                parsed.invalid.len(),
                parsed.ignored.len()
            );
            for line in &parsed.valid {
                println!("  + {}", line);
            }
            for line in &parsed.invalid {
                println!("  x {}", line);
            }
            if !parsed.ignored.is_empty() {
                println!("{} proxies over the limit were ignored", parsed.ignored.len());
            }
        }
        Commands::Check {
            input,
            ws_url,
            limit,
            export,
            output,
            tui,
        } => {
            let export = export.map(|f| f.parse::<ExportFormat>()).transpose()?;
            if let Some(url) = ws_url {
                config = config.with_checker_ws_url(url);
            }
            if let Some(limit) = limit {
                config = config.with_proxy_limit(limit);
            }

            let text = std::fs::read_to_string(&input)?;
            let parsed = parse_proxy_lines(&text, config.proxy_limit);
            if !parsed.invalid.is_empty() {
                warn!(count = parsed.invalid.len(), "Skipping invalid lines");
            }
            if !parsed.ignored.is_empty() {
                warn!(
                    count = parsed.ignored.len(),
                    limit = config.proxy_limit,
                    "Proxy limit reached"
                );
            }
            if parsed.valid.is_empty() {
                return Err(anyhow!("No valid proxies in {:?}", input));
            }

            let storage = open_storage(&config).await;
            let runner = config.checker().runner();

            let session = if tui {
                let threshold = Preferences::new(storage.clone()).latency_threshold().await;
                ScanApp::new(parsed.valid, runner)
                    .with_latency_threshold(threshold)
                    .run()
                    .await?
            } else {
                println!("Checking {} proxies via {}", parsed.valid.len(), runner.ws_url());
                let (controller, controls) = ScanController::new();
                let stopper = controller.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        stopper.stop();
                    }
                });

                let mut last_progress = 0u8;
                runner
                    .run(parsed.valid, controls, |session| {
                        let progress = session.progress();
                        if progress >= last_progress.saturating_add(10) {
                            println!(
                                "Progress: {}% ({} results)",
                                progress,
                                session.results().len()
                            );
                            last_progress = progress;
                        }
                    })
                    .await
            };

            let stats = ResultStats::from_results(session.results());
            match session.state() {
                ScanState::Completed => println!("Scan complete."),
                ScanState::Errored(message) => eprintln!("Scan failed: {}", message),
                _ => println!("Scan stopped."),
            }
            println!(
                "Results: {} alive, {} dead, {} slow, avg {}ms",
                stats.alive, stats.dead, stats.slow, stats.avg_latency
            );

            let completed = *session.state() == ScanState::Completed;
            let results = session.into_results();

            if let Some(format) = export {
                write_output(&export_results(&results, format)?, output.as_ref())?;
            } else if !tui {
                for result in results.iter().filter(|r| r.is_alive()) {
                    println!(
                        "  {} {} ({}ms)",
                        result.protocol,
                        result.address(),
                        result.latency
                    );
                }
            }

            if completed {
                let mut history = ScanHistory::load(storage).await;
                if let Some(entry) = history.add_entry(results).await {
                    info!(id = %entry.id, "Saved scan to history");
                }
            }
        }
        Commands::Convert {
            input,
            format,
            proxy_type,
        } => {
            let format: OutputFormat = format.parse()?;
            let proxy_type: ProxyType = proxy_type.parse()?;
            let text = std::fs::read_to_string(&input)?;

            let conversion = convert_proxies(&text, format, proxy_type)?;
            println!("{}", conversion.output);
            for line in &conversion.rejected {
                warn!(line = %line, "Could not parse proxy");
            }
            info!(
                converted = conversion.converted,
                rejected = conversion.rejected.len(),
                "Converted proxies"
            );
        }
        Commands::History { action } => {
            let mut history = ScanHistory::load(open_storage(&config).await).await;
            match action {
                HistoryAction::List => {
                    if history.is_empty() {
                        println!("No scans recorded.");
                    }
                    for entry in history.entries() {
                        println!(
                            "{} {} - {} total, {} alive, {} dead, {} slow",
                            entry.id,
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.stats.total,
                            entry.stats.alive,
                            entry.stats.dead,
                            entry.stats.slow
                        );
                    }
                }
                HistoryAction::Show { id } => match history.get(&id) {
                    Some(entry) => {
                        for result in &entry.results {
                            let status = if result.is_alive() { "✓" } else { "✗" };
                            println!(
                                "{} {} {} {}ms {}",
                                status,
                                result.protocol,
                                result.address(),
                                result.latency,
                                result.country.as_deref().unwrap_or("")
                            );
                        }
                    }
                    None => eprintln!("Scan not found: {}", id),
                },
                HistoryAction::Remove { id } => {
                    if history.remove(&id).await {
                        println!("Scan removed: {}", id);
                    } else {
                        eprintln!("Scan not found: {}", id);
                    }
                }
                HistoryAction::Clear => {
                    history.clear().await;
                    println!("History cleared.");
                }
            }
        }
        Commands::Proxies {
            country,
            protocol,
            port,
            anonymity,
            city,
            region,
            asn,
            limit,
            offset,
            sort,
            asc,
            export,
            output,
        } => {
            let export = export.map(|f| f.parse::<ExportFormat>()).transpose()?;
            let sort_key: SortKey = sort.parse()?;
            let direction = if asc {
                SortDirection::Ascending
            } else {
                SortDirection::Descending
            };

            let country = match country {
                Some(c) => Some(c),
                None => Preferences::new(open_storage(&config).await).country_filter().await,
            };
            let filter = ProxyFilter {
                country,
                protocol,
                port,
                anonymity,
                city,
                region,
                asn,
                limit,
                offset,
            };

            let client = ApiClient::new(config.api_url.clone())?;
            let mut records = client.proxies(&filter).await?.data;
            SortState::new(sort_key, direction).sort(&mut records);

            match export {
                Some(format) => write_output(&export_records(&records, format)?, output.as_ref())?,
                None => {
                    for r in &records {
                        println!(
                            "{:<22} {:<16} {:<4} {:>6}ms {:>6.1}% {}",
                            format!("{}:{}", r.ip, r.port),
                            r.protocols.join(","),
                            r.country_code.as_deref().unwrap_or("--"),
                            r.delay_ms,
                            r.uptime,
                            r.last_seen
                                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                                .unwrap_or_default()
                        );
                    }
                    println!("{} proxies", records.len());
                }
            }
        }
        Commands::Facets { kind } => {
            let kind: FacetKind = kind.parse()?;
            let client = ApiClient::new(config.api_url.clone())?;
            for entry in client.facets(kind).await? {
                let label = entry.label.clone().unwrap_or_else(|| entry.display_value());
                println!("{:<32} {}", label, entry.count);
            }
        }
        Commands::Stats => {
            let client = ApiClient::new(config.api_url.clone())?;
            let stats = client.stats().await?;
            println!("Total:     {}", stats.total);
            println!("Alive:     {}", stats.alive);
            println!("Countries: {}", stats.countries);
            println!("Avg delay: {:.0}ms", stats.avg_delay_ms);
        }
        Commands::Asn { asn } => {
            let client = ApiClient::new(config.api_url.clone())?;
            let info = client.asn(asn).await?;
            println!("AS{} {}", info.asn, info.name.as_deref().unwrap_or(""));
            if let Some(org) = &info.org {
                println!("Org:     {}", org);
            }
            if let Some(cc) = &info.country_code {
                println!("Country: {}", cc);
            }
            println!("Proxies: {}", info.proxies.len());
            for r in &info.proxies {
                println!("  {}:{} {}", r.ip, r.port, r.protocols.join(","));
            }
        }
        Commands::Whoami => {
            let client = ApiClient::new(config.api_url.clone())?;
            let me = client.whoami().await?;
            println!("IP:      {}", me.ip);
            if let Some(country) = &me.country {
                println!("Country: {}", country);
            }
            if let Some(city) = &me.city {
                println!("City:    {}", city);
            }
            if let Some(asn) = me.asn {
                println!("ASN:     AS{} {}", asn, me.org.as_deref().unwrap_or(""));
            }
            let mut headers: Vec<_> = me.headers.iter().collect();
            headers.sort();
            for (name, value) in headers {
                println!("  {}: {}", name, value);
            }
        }
        Commands::Prefs { action } => {
            let prefs = Preferences::new(open_storage(&config).await);
            match action {
                PrefsAction::Get => {
                    println!("Latency threshold: {}ms", prefs.latency_threshold().await);
                    println!(
                        "Country filter:    {}",
                        prefs.country_filter().await.unwrap_or_else(|| "all".to_string())
                    );
                    println!("Theme:             {}", prefs.theme().await);
                    println!(
                        "Analytics consent: {}",
                        match prefs.analytics_consent().await {
                            Some(true) => "granted",
                            Some(false) => "declined",
                            None => "not asked",
                        }
                    );
                }
                PrefsAction::SetLatency { ms } => prefs.set_latency_threshold(ms).await,
                PrefsAction::SetCountry { country } => {
                    prefs.set_country_filter(Some(country.as_str())).await
                }
                PrefsAction::SetTheme { theme } => {
                    let theme: Theme = theme.parse()?;
                    prefs.set_theme(theme).await;
                }
                PrefsAction::Consent { enabled } => prefs.set_analytics_consent(enabled).await,
            }
        }
    }

    Ok(())
}

fn init_tracing(quiet: bool) {
    let default_directive = if quiet { "off" } else { "proxy_scan=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// SQLite storage, or a process-local store when the database is unusable
async fn open_storage(config: &Config) -> Arc<dyn Storage> {
    match SqliteStorage::connect(&config.database_url).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            warn!(
                url = %config.database_url,
                error = %e,
                "Database unavailable, history and preferences will not persist"
            );
            Arc::new(MemoryStorage::new())
        }
    }
}

fn write_output(content: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)?;
            println!("Saved export to {:?}", path);
        }
        None => println!("{}", content),
    }
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use structopt::StructOpt;

use flowwatch_lib::api::HttpDashboardClient;
use flowwatch_lib::commands::{actions, logic, monitor, system, watch};
use flowwatch_lib::config::{self, DashboardConfig};
use flowwatch_lib::simulate::{self, Injection};

#[derive(Debug, StructOpt)]
#[structopt(name = "flowwatch", about = "Terminal dashboard for DDoS flow monitoring")]
struct Opt {
    /// Base URL of the monitoring server (overrides FLOWWATCH_SERVER_URL).
    #[structopt(short, long)]
    server: Option<String>,
    /// Operator name recorded on actions (overrides FLOWWATCH_OPERATOR).
    #[structopt(short, long)]
    operator: Option<String>,
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Live flow table with operator commands on stdin.
    Watch {
        /// Rows fetched per poll.
        #[structopt(long)]
        limit: Option<usize>,
        /// Poll interval in milliseconds.
        #[structopt(long)]
        interval_ms: Option<u64>,
        /// Poll only; do not open the push channel.
        #[structopt(long)]
        no_push: bool,
    },
    /// Print the server's headline counts.
    Summary,
    /// Show everything the server knows about one IP.
    Detail { ip: String },
    Block {
        ip: String,
        #[structopt(long, default_value = "manual")]
        reason: String,
        /// Note attached after the block succeeds.
        #[structopt(long)]
        note: Option<String>,
    },
    Release {
        ip: String,
        #[structopt(long, default_value = "Manual release")]
        note: String,
    },
    Note { ip: String, text: Vec<String> },
    /// Audit log of blocks and releases, newest first.
    Logs {
        #[structopt(long)]
        ip: Option<String>,
        /// block or release
        #[structopt(long)]
        action: Option<String>,
        #[structopt(long)]
        limit: Option<usize>,
        /// Keep polling and print the log again whenever it changes.
        #[structopt(short, long)]
        follow: bool,
    },
    /// Show, or change, the server's auto-block settings.
    Settings {
        #[structopt(long)]
        auto_block: Option<bool>,
        /// Auto-block threshold in percent.
        #[structopt(long)]
        threshold: Option<f64>,
    },
    /// Send synthetic flows through the push channel.
    Simulate {
        /// Milliseconds between ticks.
        #[structopt(long)]
        tick_ms: Option<u64>,
        /// Stop after this many ticks.
        #[structopt(long)]
        count: Option<u64>,
        /// Send one flow of this kind (high-risk or suspicious) and exit.
        #[structopt(long)]
        inject: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flowwatch_lib::init_tracing();
    let opt = Opt::from_args();

    let mut cfg = DashboardConfig::from_env();
    if let Some(server) = opt.server {
        cfg.server_url = server.trim_end_matches('/').to_string();
        cfg.push_url = config::push_url_for(&cfg.server_url);
    }
    if let Some(operator) = opt.operator {
        cfg.operator = operator;
    }

    let api = HttpDashboardClient::new(&cfg.server_url)?;
    let output = match opt.cmd {
        Command::Watch {
            limit,
            interval_ms,
            no_push,
        } => {
            if let Some(limit) = limit {
                cfg.page_size = limit;
            }
            if let Some(ms) = interval_ms.filter(|ms| *ms > 0) {
                cfg.poll_interval = Duration::from_millis(ms);
            }
            watch::run_watch(cfg, !no_push).await?;
            None
        }
        Command::Simulate {
            tick_ms,
            count,
            inject,
        } => {
            let inject = match inject.as_deref() {
                None => None,
                Some("high-risk" | "high_risk" | "high") => Some(Injection::HighRisk),
                Some("suspicious") => Some(Injection::Suspicious),
                Some(other) => anyhow::bail!("unknown flow kind {other:?}"),
            };
            let tick = Duration::from_millis(tick_ms.unwrap_or(config::SIMULATOR_TICK_MS).max(1));
            simulate::run_simulation(&cfg, tick, count, inject).await?;
            None
        }
        Command::Summary => Some(monitor::summary_report(&api).await?),
        Command::Detail { ip } => Some(monitor::detail_report(&api, &ip).await?),
        Command::Block { ip, reason, note } => {
            Some(actions::block_ip(&api, &cfg.operator, &ip, &reason, note.as_deref()).await?)
        }
        Command::Release { ip, note } => Some(actions::release_ip(&api, &cfg.operator, &ip, &note).await?),
        Command::Note { ip, text } => Some(actions::add_note(&api, &cfg.operator, &ip, &text.join(" ")).await?),
        Command::Logs {
            ip,
            action,
            limit,
            follow,
        } => {
            let filter = logic::audit_filter(ip, action.as_deref())?;
            let limit = limit.unwrap_or(cfg.log_page_size);
            if follow {
                let stop = async {
                    let _ = tokio::signal::ctrl_c().await;
                };
                monitor::follow_logs(Arc::new(api), limit, &filter, cfg.log_poll_interval, stop, |page| {
                    println!("{page}\n");
                })
                .await;
                None
            } else {
                Some(monitor::logs_report(&api, limit, &filter).await?)
            }
        }
        Command::Settings {
            auto_block,
            threshold,
        } => Some(system::settings_report(&api, logic::settings_update(auto_block, threshold)).await?),
    };

    if let Some(output) = output {
        println!("{output}");
    }
    Ok(())
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kvmwatch::resource::{ActionOutcome, Snapshot, VmMetrics};
use kvmwatch::store::{LoadStatus, Slice, StoreState};
use kvmwatch::{Config, Filter, RefreshScheduler, ResourceClient, SyncStore, Vm, VmState};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Command-line client for a KVM supervisor
#[derive(Parser, Debug)]
#[command(name = "kvmwatch", version = kvmwatch::VERSION, about, long_about = None)]
struct Args {
    /// Supervisor base URL
    #[arg(short, long)]
    server: Option<String>,

    /// Login name
    #[arg(short, long)]
    user: Option<String>,

    /// Password; without it no login is attempted
    #[arg(long, env = "KVMWATCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Auto-refresh period in seconds
    #[arg(long)]
    interval: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check supervisor health
    Health,
    /// List VMs
    List {
        /// Case-insensitive name search
        #[arg(short, long, default_value = "")]
        query: String,
        /// Only VMs in this state
        #[arg(long)]
        state: Option<String>,
    },
    /// Show one VM with live metrics
    Show { name: String },
    /// Host summary
    Stats,
    Start { name: String },
    Stop {
        name: String,
        /// Hard power-off instead of ACPI shutdown
        #[arg(long)]
        force: bool,
    },
    Restart { name: String },
    /// Change vCPU count and memory
    Resize {
        name: String,
        #[arg(long)]
        vcpus: u32,
        #[arg(long)]
        memory_mb: u64,
    },
    #[command(subcommand)]
    Snapshots(SnapshotCommand),
    /// Keep the VM list refreshed until Ctrl-C
    Watch {
        #[arg(short, long, default_value = "")]
        query: String,
        #[arg(long)]
        state: Option<String>,
        /// Also poll live metrics of this VM
        #[arg(long)]
        vm: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SnapshotCommand {
    List {
        vm: String,
    },
    Create {
        vm: String,
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    Revert {
        vm: String,
        name: String,
    },
    Delete {
        vm: String,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // KVMWATCH_LOG directives (e.g. "kvmwatch::api=trace") refine the flag
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .with_env_var("KVMWATCH_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("kvmwatch started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("kvmwatch").join("kvmwatch.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".kvmwatch").join("kvmwatch.log");
    }
    PathBuf::from("kvmwatch.log")
}

fn parse_state(state: Option<&str>) -> Result<Option<VmState>> {
    let Some(raw) = state else {
        return Ok(None);
    };
    match VmState::from_wire(raw) {
        VmState::Unknown if !raw.eq_ignore_ascii_case("unknown") => {
            let known: Vec<&str> = VmState::ALL.iter().map(|s| s.as_str()).collect();
            bail!("Unknown state '{}' (expected one of: {})", raw, known.join(", "))
        }
        state => Ok(Some(state)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let mut config = Config::load();
    if let Some(server) = &args.server {
        config.server_url = server.clone();
    }
    if let Some(interval) = args.interval {
        config.refresh_interval_secs = interval;
    }

    tracing::info!("Using server: {}", config.server_url);

    let client = ResourceClient::connect(&config.server_url, config.retry_policy())?;
    let store = SyncStore::new(client);

    if let Some(password) = &args.password {
        let Some(user) = args.user.clone().or_else(|| config.username.clone()) else {
            bail!("A password was given but no user; pass --user");
        };
        store
            .login(&user, password)
            .await
            .with_context(|| format!("Login as {} failed", user))?;

        if config.username.as_deref() != Some(user.as_str()) {
            if let Err(e) = config.set_username(&user) {
                tracing::warn!("Could not save config: {}", e);
            }
        }
    }

    run(args.command, &store, &config).await
}

async fn run(command: Command, store: &SyncStore, config: &Config) -> Result<()> {
    match command {
        Command::Health => {
            let health = store.client().health().await?;
            println!("status:     {}", health.status);
            println!("uptime:     {:.0}s", health.uptime_seconds);
            println!(
                "libvirt:    {} {}",
                if health.libvirt_connected { "connected" } else { "disconnected" },
                health.libvirt_message
            );
            println!("websocket:  {}", health.websocket_available);
            if !health.is_healthy() {
                bail!("Supervisor reports {}", health.status);
            }
        }
        Command::List { query, state } => {
            let filter = Filter::new(query, parse_state(state.as_deref())?);
            store.fetch_resources(false).await;
            let state = store.state();
            settled(&state.resources)?;
            print_vms(&state.project(&filter));
        }
        Command::Show { name } => {
            store.fetch_detail(&name).await;
            let state = store.state();
            settled(&state.detail)?;
            match state.detail_view() {
                Some(view) => print_detail(view.vm, view.metrics),
                None => bail!("No detail for {}", name),
            }
        }
        Command::Stats => {
            store.fetch_stats(false).await;
            let state = store.state();
            settled(&state.stats)?;
            if let Some(stats) = state.stats.data() {
                println!("host:      {}", stats.host.hostname);
                println!(
                    "cpu:       {} x {} ({} MHz)",
                    stats.host.cpus, stats.host.cpu_model, stats.host.cpu_frequency_mhz
                );
                println!("memory:    {} MB", stats.host.memory_total_mb);
                println!(
                    "vms:       {} total, {} active, {} inactive",
                    stats.vms_total, stats.vms_active, stats.vms_inactive
                );
                for (state, count) in &stats.state_distribution {
                    println!("  {:<10} {}", state, count);
                }
            }
        }
        Command::Start { name } => print_outcome(store.start(&name).await?),
        Command::Stop { name, force } => print_outcome(store.stop(&name, force).await?),
        Command::Restart { name } => print_outcome(store.restart(&name).await?),
        Command::Resize {
            name,
            vcpus,
            memory_mb,
        } => print_outcome(store.update_resources(&name, vcpus, memory_mb).await?),
        Command::Snapshots(command) => run_snapshots(command, store).await?,
        Command::Watch { query, state, vm } => {
            let filter = Filter::new(query, parse_state(state.as_deref())?);
            watch(store, config, &filter, vm.as_deref()).await?;
        }
    }
    Ok(())
}

async fn run_snapshots(command: SnapshotCommand, store: &SyncStore) -> Result<()> {
    let vm = match command {
        SnapshotCommand::List { vm } => {
            store.fetch_snapshots(&vm, false).await;
            vm
        }
        SnapshotCommand::Create {
            vm,
            name,
            description,
        } => {
            print_outcome(store.create_snapshot(&vm, &name, &description).await?);
            vm
        }
        SnapshotCommand::Revert { vm, name } => {
            print_outcome(store.revert_snapshot(&vm, &name).await?);
            vm
        }
        SnapshotCommand::Delete { vm, name } => {
            print_outcome(store.delete_snapshot(&vm, &name).await?);
            vm
        }
    };

    let state = store.state();
    settled(&state.snapshots)?;
    print_snapshots(state.snapshots_of(&vm).unwrap_or(&[]));
    Ok(())
}

async fn watch(
    store: &SyncStore,
    config: &Config,
    filter: &Filter,
    vm: Option<&str>,
) -> Result<()> {
    let mut rx = store.subscribe();
    let mut scheduler = RefreshScheduler::new(store.clone());

    store.fetch_resources(false).await;
    scheduler.start_auto_refresh(config.refresh_interval());
    if let Some(name) = vm {
        store.fetch_detail(name).await;
        scheduler.start_metrics_polling(name, config.metrics_interval());
    }
    rx.mark_changed();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                render_watch(&state, filter);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    scheduler.stop_auto_refresh();
    scheduler.stop_metrics_polling();
    Ok(())
}

fn render_watch(state: &StoreState, filter: &Filter) {
    println!(
        "--- {} ---",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(error) = state.resources.error() {
        println!("! {}", error);
    }
    print_vms(&state.project(filter));
    if let Some(view) = state.detail_view() {
        if let Some(metrics) = view.metrics {
            print_metrics(metrics);
        }
    }
}

/// Fail with the slice's error if its last visible fetch failed
fn settled<T>(slice: &Slice<T>) -> Result<()> {
    if slice.status() == LoadStatus::Error {
        bail!("{}", slice.error().unwrap_or("request failed"));
    }
    Ok(())
}

fn print_outcome(outcome: ActionOutcome) {
    if outcome.message.is_empty() {
        println!("{}: {}", outcome.name, outcome.status);
    } else {
        println!("{}", outcome.message);
    }
}

fn print_vms(vms: &[Vm]) {
    println!(
        "{:<24} {:<10} {:>5} {:>10} {:>10}",
        "NAME", "STATE", "VCPU", "MEMORY", "UPTIME"
    );
    for vm in vms {
        println!(
            "{:<24} {:<10} {:>5} {:>7} MB {:>10}",
            vm.name,
            vm.state,
            vm.vcpus,
            vm.memory_mb,
            vm.uptime_seconds.map(format_uptime).unwrap_or_else(|| "-".into())
        );
    }
}

fn print_detail(vm: &Vm, metrics: Option<&VmMetrics>) {
    println!("name:       {}", vm.name);
    println!("uuid:       {}", vm.uuid);
    println!("state:      {}", vm.state);
    println!("vcpus:      {}", vm.vcpus);
    println!("memory:     {} MB ({} MB used)", vm.memory_mb, vm.used_memory_mb);
    if let Some(os) = &vm.os_type {
        println!("os:         {}", os);
    }
    if let Some(uptime) = vm.uptime_seconds {
        println!("uptime:     {}", format_uptime(uptime));
    }
    if !vm.disks.is_empty() {
        println!("disks:      {}", vm.disks.join(", "));
    }
    if !vm.network_interfaces.is_empty() {
        println!("interfaces: {}", vm.network_interfaces.join(", "));
    }
    if let Some(metrics) = metrics {
        print_metrics(metrics);
    }
}

fn print_metrics(metrics: &VmMetrics) {
    let (disk_read, disk_write) = metrics.total_disk_bytes();
    let (rx, tx) = metrics.total_network_bytes();
    println!(
        "{}: cpu {:.1}%  mem {:.1}% ({}/{} MB)  disk r/w {}/{} B  net rx/tx {}/{} B",
        metrics.name,
        metrics.cpu_percent,
        metrics.memory_percent,
        metrics.memory_used_mb,
        metrics.memory_total_mb,
        disk_read,
        disk_write,
        rx,
        tx
    );
    if let Some(message) = &metrics.message {
        println!("  ({})", message);
    }
}

fn print_snapshots(snapshots: &[Snapshot]) {
    println!("{:<24} {:<10} {:<20} {}", "NAME", "STATE", "CREATED", "DESCRIPTION");
    for snapshot in snapshots {
        let created = snapshot
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        let marker = if snapshot.is_current { "*" } else { "" };
        println!(
            "{:<24} {:<10} {:<20} {}",
            format!("{}{}", snapshot.name, marker),
            snapshot.state,
            created,
            snapshot.description
        );
    }
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

//! IoT Console CLI
//!
//! Terminal front end for the telemetry dashboard:
//! - Sign in / sign up / sign out
//! - List and create channels
//! - Page through a channel's readings, or watch them live
//! - Show or regenerate channel keys, update alert thresholds

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use iot_console::push::PushEvent;
use iot_console::render;
use iot_console::views::{NewChannelForm, SignInForm, SignUpForm, ThresholdForm};
use iot_console::{
    generate_default_config, ChannelListView, Config, FeedView, FileTokenStore, GateOutcome,
    HttpApiClient, Notification, PushClient, Route, SessionGate, TelemetryApi,
    TokenStore, ViewState,
};

#[derive(Parser)]
#[command(name = "iot-console")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dashboard for IoT telemetry channels")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: platform config dir, then ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Telemetry API URL (overrides config)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Push endpoint URL (overrides config)
    #[arg(long, global = true)]
    pub push_url: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the access token
    SignIn {
        #[arg(short, long)]
        email: Option<String>,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account and sign in
    SignUp {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(short, long)]
        email: Option<String>,
        /// Prompted for (twice) when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored access token
    SignOut,

    /// List or create channels
    Channels {
        #[command(subcommand)]
        action: Option<ChannelCommands>,
    },

    /// Show one page of a channel's readings
    Feeds {
        channel_id: String,
        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: u32,
        /// Page size (default: feeds.page_size from config)
        #[arg(short, long)]
        size: Option<u32>,
    },

    /// Follow a channel's readings live
    Watch { channel_id: String },

    /// Show a channel's read/write keys
    Keys {
        channel_id: String,
        /// Regenerate the keys first
        #[arg(long)]
        rotate: bool,
    },

    /// Update a channel's alert thresholds
    Thresholds {
        channel_id: String,
        #[arg(long)]
        temperature: f64,
        #[arg(long)]
        humidity: f64,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ChannelCommands {
    /// List your channels (default)
    List,
    /// Create a channel
    Create { name: String, description: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(url) = &cli.push_url {
        config.push.base_url = Some(url.clone());
    }
    iot_console::logging::init(&config.logging);

    if let Commands::Config { output } = &cli.command {
        let template = generate_default_config();
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &template)?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let client = config.client();
    tracing::debug!(api = %client.api_base_url, push = %client.push_base_url, "Using endpoints");

    let api: Arc<dyn TelemetryApi> = Arc::new(HttpApiClient::new(&client)?);
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::from_config(&config.session));
    let gate = SessionGate::new(api.clone(), store);

    match cli.command {
        Commands::SignIn { email, password } => {
            let email = match email {
                Some(email) => email,
                None => prompt("Email: ")?,
            };
            let password = match password {
                Some(password) => password,
                None => rpassword::prompt_password("Password: ")?,
            };
            report_gate(gate.sign_in(&SignInForm::new(email, password)).await);
        }

        Commands::SignUp {
            full_name,
            email,
            password,
        } => {
            let full_name = match full_name {
                Some(name) => name,
                None => prompt("Full name: ")?,
            };
            let email = match email {
                Some(email) => email,
                None => prompt("Email: ")?,
            };
            let (password, confirmation) = match password {
                Some(password) => (password.clone(), password),
                None => (
                    rpassword::prompt_password("Password: ")?,
                    rpassword::prompt_password("Confirm password: ")?,
                ),
            };
            let form = SignUpForm {
                full_name,
                email,
                password,
                confirmation,
            };
            report_gate(gate.sign_up(&form).await);
        }

        Commands::SignOut => {
            gate.sign_out()?;
            println!("Signed out.");
        }

        Commands::Channels { action } => {
            let session = gate.current_session()?;
            let mut view = ChannelListView::new(api, session);

            match action.unwrap_or(ChannelCommands::List) {
                ChannelCommands::List => {
                    let data = ready(view.load().await);
                    match cli.format {
                        OutputFormat::Json => println!(
                            "{}",
                            serde_json::to_string_pretty(&json!({
                                "user": data.user,
                                "channels": data.channels,
                            }))?
                        ),
                        OutputFormat::Table => {
                            println!("{}", render::user_summary(&data.user));
                            print!("{}", render::channel_table(&data.channels));
                        }
                    }
                }
                ChannelCommands::Create { name, description } => {
                    view.open_create_dialog();
                    let created = view
                        .create_channel(&NewChannelForm::new(name, description))
                        .await?;
                    if let ViewState::Redirect(route) = view.state() {
                        redirect(route);
                    }
                    finish_notification(view.take_notification());
                    if let Some(channel) = created {
                        match cli.format {
                            OutputFormat::Json => {
                                println!("{}", serde_json::to_string_pretty(&channel)?)
                            }
                            OutputFormat::Table => {
                                println!("Open it with: iot-console feeds {}", channel.id)
                            }
                        }
                    }
                }
            }
        }

        Commands::Feeds {
            channel_id,
            page,
            size,
        } => {
            let session = gate.current_session()?;
            let page_size = size.unwrap_or(config.feeds.page_size);
            let mut view = FeedView::new(api, session, channel_id.into(), page_size);

            view.load().await;
            if page != 1 {
                view.change_page(page).await?;
            }
            let data = ready(view.state());
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "channel": data.channel,
                        "readings": data.readings,
                        "page": data.page,
                        "size": data.size,
                        "total": data.total,
                    }))?
                ),
                OutputFormat::Table => print!("{}", render::feed_table(data)),
            }
        }

        Commands::Watch { channel_id } => {
            let session = gate.current_session()?;
            let mut view = FeedView::new(
                api,
                session.clone(),
                channel_id.into(),
                config.feeds.page_size,
            );

            let data = ready(view.load().await);
            if cli.format == OutputFormat::Table {
                print!("{}", render::feed_table(data));
            }

            let subscription = PushClient::new(&client).subscribe(&session, view.channel_id());
            view.attach(subscription);
            watch(&mut view, cli.format).await?;
            view.close().await;
        }

        Commands::Keys { channel_id, rotate } => {
            let session = gate.current_session()?;
            let mut view = FeedView::new(api, session, channel_id.into(), config.feeds.page_size);
            ready(view.load().await);

            if rotate {
                let rotated = view.rotate_keys().await;
                if let ViewState::Redirect(route) = view.state() {
                    redirect(route);
                }
                finish_notification(view.take_notification());
                if rotated.is_none() {
                    std::process::exit(1);
                }
            }

            match (view.keys(), cli.format) {
                (Some(keys), OutputFormat::Json) => {
                    println!("{}", serde_json::to_string_pretty(keys)?)
                }
                (Some(keys), OutputFormat::Table) => print!("{}", render::keys_block(keys)),
                (None, _) => println!("No keys issued for this channel yet. Use --rotate to generate them."),
            }
        }

        Commands::Thresholds {
            channel_id,
            temperature,
            humidity,
        } => {
            let session = gate.current_session()?;
            let mut view = FeedView::new(api, session, channel_id.into(), config.feeds.page_size);
            ready(view.load().await);

            let created = view
                .update_thresholds(&ThresholdForm::new(temperature, humidity))
                .await?;
            if let ViewState::Redirect(route) = view.state() {
                redirect(route);
            }
            finish_notification(view.take_notification());
            if let Some(reading) = created {
                match cli.format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reading)?),
                    OutputFormat::Table => println!("{}", render::reading_line(&reading)),
                }
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Print live readings until Ctrl-C or the subscription ends
async fn watch(view: &mut FeedView, format: OutputFormat) -> anyhow::Result<()> {
    loop {
        let update = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                eprintln!("Stopped.");
                return Ok(());
            }
            update = view.next_push() => update,
        };

        let Some(update) = update else {
            return Ok(());
        };

        match update.event {
            PushEvent::Joined { channel_id } => {
                eprintln!("Listening for new readings on channel {} (Ctrl-C to stop)", channel_id);
            }
            PushEvent::Reading(reading) => match format {
                OutputFormat::Json => println!("{}", serde_json::to_string(&reading)?),
                OutputFormat::Table => println!("{}", render::reading_line(&reading)),
            },
            PushEvent::Reconnecting { attempt } => {
                eprintln!("Connection lost, reconnecting (attempt {})...", attempt);
            }
            PushEvent::Disconnected { reason } => {
                eprintln!("Live updates stopped: {}", reason);
            }
        }
    }
}

fn report_gate(outcome: GateOutcome) {
    match outcome {
        GateOutcome::SignedIn { next, .. } => {
            println!("Signed in. Next: iot-console channels ({})", next);
        }
        GateOutcome::Invalid(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        GateOutcome::Failed(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    }
}

/// Data of a loaded view, or exit with the redirect hint
fn ready<T>(state: &ViewState<T>) -> &T {
    match state {
        ViewState::Ready(data) => data,
        ViewState::Redirect(route) => redirect(route),
        ViewState::Loading => {
            eprintln!("View did not finish loading");
            std::process::exit(1);
        }
    }
}

fn redirect(route: &Route) -> ! {
    match route {
        Route::SignIn => {
            eprintln!("Not signed in, or the session is no longer valid.");
            eprintln!();
            eprintln!("Sign in with:");
            eprintln!("  iot-console sign-in");
        }
        other => eprintln!("Cannot show this view (go to {})", other),
    }
    std::process::exit(1);
}

/// Print the view's toast; exit non-zero on an error toast
fn finish_notification(notification: Option<Notification>) {
    if let Some(notification) = notification {
        if notification.is_error() {
            eprintln!("{}", render::notification_line(&notification));
            std::process::exit(1);
        }
        println!("{}", render::notification_line(&notification));
    }
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

use clap::{Parser, Subcommand};
use companion::backend::AgentClient;
use companion::checkin::{parse_assignments, CheckinSnapshot};
use companion::session::{MessageId, Role};
use companion::CompanionView;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "companion")]
#[command(about = "Wellbeing companion CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Clone, Copy)]
struct CheckinArgs {
    /// Energy rating (1-5)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    energy: Option<u8>,

    /// Stress rating (1-5)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    stress: Option<u8>,

    /// Sleep rating (1-5)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    sleep: Option<u8>,
}

impl CheckinArgs {
    fn snapshot(self) -> CheckinSnapshot {
        CheckinSnapshot::new(self.energy, self.stress, self.sleep)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Print the suggested prompts for a check-in.
    Suggest {
        #[command(flatten)]
        checkin: CheckinArgs,
    },

    /// Chat with the companion (interactive). Lines are sent as messages;
    /// `/checkin energy=3 stress=4 sleep=2` updates the check-in; `/quit` exits.
    Chat {
        /// Config file path (default: COMPANION_CONFIG_PATH or ~/.companion/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Initial check-in; triggers the greeting when any rating is given.
        #[command(flatten)]
        checkin: CheckinArgs,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("companion {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Suggest { checkin }) => {
            let prompts = companion::suggest::suggest(&checkin.snapshot());
            for p in prompts {
                println!("{}", p);
            }
        }
        Some(Commands::Chat { config, checkin }) => {
            if let Err(e) = run_chat(config, checkin.snapshot()).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

enum Input {
    Quit,
    Checkin(String),
    Message(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.eq_ignore_ascii_case("/exit") || line.eq_ignore_ascii_case("/quit") {
        return Input::Quit;
    }
    if let Some(rest) = line.strip_prefix("/checkin") {
        return Input::Checkin(rest.trim().to_string());
    }
    Input::Message(line.to_string())
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    initial: CheckinSnapshot,
) -> anyhow::Result<()> {
    let (config, path) = companion::config::load_config(config_path)?;
    log::info!("config: {}", path.display());
    let client = AgentClient::new(&config.backend);
    log::info!("agent endpoint: {}", client.url());

    let (handle, task) = companion::spawn_session(&config, Arc::new(client));
    let mut checkin = initial;
    if !checkin.is_empty() {
        handle.update_checkin(checkin)?;
    }

    let mut view = handle.subscribe();
    let mut renderer = Renderer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Input::Quit => break,
                    Input::Checkin(args) => match parse_assignments(checkin, &args) {
                        Ok(next) => {
                            checkin = next;
                            handle.update_checkin(checkin)?;
                            let suggestions: Vec<String> = companion::suggest::suggest(&checkin)
                                .iter()
                                .map(|p| p.to_string())
                                .collect();
                            println!("check-in updated; try: {}", suggestions.join(", "));
                            prompt()?;
                        }
                        Err(e) => {
                            eprintln!("checkin: {}", e);
                            prompt()?;
                        }
                    },
                    Input::Message(text) if text.is_empty() => prompt()?,
                    Input::Message(text) => handle.send_message(text)?,
                }
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                renderer.render(&snapshot)?;
            }
        }
    }

    let _ = handle.shutdown();
    task.await?;
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

/// Prints assistant text as it streams in.
#[derive(Default)]
struct Renderer {
    shown: HashMap<MessageId, String>,
    last_error: Option<String>,
    was_loading: bool,
}

impl Renderer {
    fn render(&mut self, view: &CompanionView) -> std::io::Result<()> {
        let mut stdout = std::io::stdout();
        for m in view.session.messages.iter().filter(|m| m.role == Role::Assistant) {
            let shown = self.shown.entry(m.id).or_default();
            if *shown == m.content {
                continue;
            }
            if shown.is_empty() {
                write!(stdout, "\n< {}", m.content)?;
            } else if m.content.starts_with(shown.as_str()) {
                write!(stdout, "{}", &m.content[shown.len()..])?;
            } else {
                write!(stdout, "\n< (revised) {}", m.content)?;
            }
            *shown = m.content.clone();
        }
        if view.session.error != self.last_error {
            if let Some(err) = &view.session.error {
                writeln!(stdout)?;
                eprintln!("! {}", err);
            }
            self.last_error = view.session.error.clone();
        }
        if self.was_loading && !view.session.loading {
            writeln!(stdout)?;
            write!(stdout, "> ")?;
        }
        self.was_loading = view.session.loading;
        stdout.flush()
    }
}

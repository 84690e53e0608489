use std::{
    io::{self, Stdout},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crest_contacts::{
    api, auth,
    render::TerminalView,
    settings::{default_config_dir, default_settings_path, load_or_init_settings},
    ContactChanges, ContactSync, ContactView, CrestClient, CsrfStore, Endpoints, Error,
    NotificationReader, PollConfig, PollEvent, RuntimeDiagnostics, Settings, Standing,
};

#[derive(Debug, Parser)]
#[command(name = "crest-contacts", version, about = "CREST contact list client")]
struct Cli {
    /// Settings file (defaults to the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the authorization URL to open in a browser.
    Login,
    /// Complete login from the redirect and run the interactive client.
    Run {
        /// Redirect URL (or just its `#access_token=...` fragment).
        #[arg(long)]
        redirect: String,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Refresh,
    Standing(String, Standing),
    Watch(String, bool),
    Remove(String),
    Add(String),
    Next,
    Previous,
    Goto(String),
    Status,
    Restart,
    Help,
    Quit,
}

const HELP: &str = "commands: refresh | std <name> <standing> | watch <name> on|off | rm <name> | add <name> | next | prev | goto <uri> | status | restart | quit";

/// Parses one input line. Names may contain spaces; the last word is the argument.
fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let name_and_last = || -> Result<(String, String), String> {
        rest.rsplit_once(char::is_whitespace)
            .map(|(name, last)| (name.trim().to_string(), last.trim().to_string()))
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| format!("usage: {verb} <name> <value>"))
    };
    let required = |what: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("usage: {verb} <{what}>"))
        } else {
            Ok(rest.to_string())
        }
    };

    match verb {
        "refresh" | "r" => Ok(Command::Refresh),
        "std" | "standing" => {
            let (name, value) = name_and_last()?;
            let standing = Standing::parse(&value)
                .ok_or_else(|| format!("unknown standing {value:?}"))?;
            Ok(Command::Standing(name, standing))
        }
        "watch" => {
            let (name, value) = name_and_last()?;
            match value.as_str() {
                "on" | "true" | "yes" => Ok(Command::Watch(name, true)),
                "off" | "false" | "no" => Ok(Command::Watch(name, false)),
                other => Err(format!("expected on|off, got {other:?}")),
            }
        }
        "rm" | "remove" => required("name").map(Command::Remove),
        "add" => required("name").map(Command::Add),
        "next" => Ok(Command::Next),
        "prev" | "previous" => Ok(Command::Previous),
        "goto" => required("uri").map(Command::Goto),
        "status" => Ok(Command::Status),
        "restart" => Ok(Command::Restart),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command {other:?}; {HELP}")),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_settings(path: Option<PathBuf>) -> Result<(Settings, CsrfStore), Error> {
    let path = match path {
        Some(path) => path,
        None => default_settings_path()?,
    };
    let settings = load_or_init_settings(&path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => default_config_dir()?,
    };
    let store = CsrfStore::new(&dir, &settings.client_id);
    Ok((settings, store))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    info!("crest-contacts starting (pid={})", std::process::id());

    let (settings, store) = match load_settings(cli.config) {
        Ok(loaded) => loaded,
        Err(error) => {
            error!("failed to load settings: {error}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        CliCommand::Login => match auth::begin(&settings, &store) {
            Ok(request) => {
                println!("{}", request.url);
                ExitCode::SUCCESS
            }
            Err(error) => {
                error!("failed to start login: {error}");
                ExitCode::FAILURE
            }
        },
        CliCommand::Run { redirect } => {
            let mut view = TerminalView::new(io::stdout());
            let (client, endpoints) = match api::connect(&settings, &redirect, &store).await {
                Ok(connected) => connected,
                Err(error) => {
                    view.present_error(error.status(), error.url(), &error.message());
                    return ExitCode::FAILURE;
                }
            };
            run(&settings, client, endpoints, view).await;
            ExitCode::SUCCESS
        }
    }
}

async fn run(
    settings: &Settings,
    client: CrestClient,
    endpoints: Endpoints,
    view: TerminalView<Stdout>,
) {
    let poll_config = PollConfig::from(settings);
    let token = client.session().token().to_string();
    let mut reader = NotificationReader::new(client.http().clone());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<PollEvent>();
    reader.start(
        &endpoints.notifications,
        &token,
        events_tx.clone(),
        poll_config.clone(),
    );

    let mut sync = ContactSync::new(client, view, endpoints.contacts.clone())
        .with_search_uri(endpoints.search.clone());
    if let Err(error) = sync.refresh().await {
        sync.report(&error);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    sync.view_mut().notice(HELP);

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => match event {
                PollEvent::Message(_) => {
                    // payload is opaque; any message means the list changed
                    if let Err(error) = sync.refresh().await {
                        sync.report(&error);
                    }
                }
                PollEvent::State(state) => {
                    debug!("notification state {state}");
                    if state.is_degraded() {
                        let detail = reader.diagnostics().last_error.unwrap_or_default();
                        sync.view_mut()
                            .notice(&format!("notifications {state}: {detail}"));
                    }
                }
            },
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(error) => {
                        error!("failed to read stdin: {error}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Help) => sync.view_mut().notice(HELP),
                    Ok(Command::Restart) => reader.start(
                        &endpoints.notifications,
                        &token,
                        events_tx.clone(),
                        poll_config.clone(),
                    ),
                    Ok(Command::Status) => {
                        sync.view_mut().notice(&status_line(&reader.diagnostics()));
                    }
                    Ok(command) => {
                        if let Err(error) = execute(&mut sync, command).await {
                            sync.report(&error);
                        }
                    }
                    Err(message) => sync.view_mut().notice(&message),
                }
            }
        }
    }

    reader.stop();
    info!("crest-contacts exiting");
}

fn status_line(diagnostics: &RuntimeDiagnostics) -> String {
    serde_json::to_string(diagnostics)
        .unwrap_or_else(|error| format!("failed to encode diagnostics: {error}"))
}

async fn execute<V: ContactView>(sync: &mut ContactSync<V>, command: Command) -> Result<(), Error> {
    match command {
        Command::Refresh => sync.refresh().await,
        Command::Standing(name, standing) => {
            sync.update(&name, ContactChanges::standing(standing)).await
        }
        Command::Watch(name, watched) => sync.update(&name, ContactChanges::watched(watched)).await,
        Command::Remove(name) => sync.delete(&name).await,
        Command::Add(query) => {
            if !sync.add_by_name(&query).await? {
                info!("no match for {query:?}");
            }
            Ok(())
        }
        Command::Next => sync.next_page().await.map(|_| ()),
        Command::Previous => sync.previous_page().await.map(|_| ()),
        Command::Goto(uri) => sync.navigate(&uri).await,
        Command::Status | Command::Restart | Command::Help | Command::Quit => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_with_spaces() {
        assert_eq!(
            parse_command("std Jim Purbrick excellent"),
            Ok(Command::Standing("Jim Purbrick".into(), Standing::Excellent))
        );
        assert_eq!(
            parse_command("watch Jim Purbrick off"),
            Ok(Command::Watch("Jim Purbrick".into(), false))
        );
        assert_eq!(
            parse_command("rm  Some Pilot "),
            Ok(Command::Remove("Some Pilot".into()))
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_command("std Jim 3").is_err());
        assert!(parse_command("std 5").is_err());
        assert!(parse_command("watch Jim maybe").is_err());
        assert!(parse_command("rm").is_err());
        assert!(parse_command("fly").is_err());
    }

    #[test]
    fn status_line_is_json_diagnostics() {
        let reader = NotificationReader::new(reqwest::Client::new());
        let line = status_line(&reader.diagnostics());
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["connection_state"], "Disconnected");
        assert_eq!(value["messages_delivered"], 0);
    }

    #[test]
    fn parses_navigation() {
        assert_eq!(parse_command("next"), Ok(Command::Next));
        assert_eq!(parse_command("prev"), Ok(Command::Previous));
        assert_eq!(
            parse_command("goto #http://api.test/contacts/?page=2"),
            Ok(Command::Goto("#http://api.test/contacts/?page=2".into()))
        );
        assert_eq!(parse_command("q"), Ok(Command::Quit));
    }
}

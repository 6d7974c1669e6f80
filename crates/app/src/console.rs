//! Line-oriented front-end
//!
//! Reads commands from stdin and prints show events as they arrive. Stands
//! in for a graphical interface.

use std::path::PathBuf;
use std::sync::Arc;

use cuecannon_core::{Actor, ActorsByPart, Casting};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::canon::{Canon, ScriptBucket, ScriptRepository};
use crate::engine::EngineSnapshot;
use crate::error::Result;
use crate::handle::EngineHandle;
use crate::observer::ShowEvent;

const HELP: &str = "\
commands:
  plays                          list available scripts
  sections <title>               list acts and scenes of a script
  add <title> <file.json>        store a script from a JSON file
  productions                    list announced productions
  direct <title>                 announce a production as director
  join <production-id> [name]    accept an invite as an actor
  cast <part> <actor-identity>   pin a part to an actor
  uncast <part>                  drop a manual cast
  autocast                       toggle automatic casting
  begin                          start (or restart) the show
  next                           cue the next line
  status                         show the current state
  quit                           leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Plays,
    Sections(String),
    Add { title: String, path: PathBuf },
    Productions,
    Direct(String),
    Join {
        production_id: String,
        name: Option<String>,
    },
    Cast { part: String, actor: String },
    Uncast(String),
    AutoCast,
    Begin,
    Next,
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line; `None` for blank or unrecognized input
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match (word, rest) {
            ("plays", "") => Self::Plays,
            ("sections", title) if !title.is_empty() => Self::Sections(title.to_string()),
            // Titles may contain spaces, the file path may not
            ("add", args) => {
                let (title, path) = args.rsplit_once(char::is_whitespace)?;
                Self::Add {
                    title: title.trim().to_string(),
                    path: PathBuf::from(path),
                }
            }
            ("productions", "") => Self::Productions,
            ("direct", title) if !title.is_empty() => Self::Direct(title.to_string()),
            ("join", args) if !args.is_empty() => match args.split_once(char::is_whitespace) {
                Some((id, name)) => Self::Join {
                    production_id: id.to_string(),
                    name: Some(name.trim().to_string()),
                },
                None => Self::Join {
                    production_id: args.to_string(),
                    name: None,
                },
            },
            // Part names may contain spaces, identities do not
            ("cast", args) => {
                let (part, actor) = args.rsplit_once(char::is_whitespace)?;
                Self::Cast {
                    part: part.trim().to_string(),
                    actor: actor.to_string(),
                }
            }
            ("uncast", part) if !part.is_empty() => Self::Uncast(part.to_string()),
            ("autocast", "") => Self::AutoCast,
            ("begin", "") => Self::Begin,
            ("next", "") => Self::Next,
            ("status", "") => Self::Status,
            ("help", "") => Self::Help,
            ("quit", "") | ("exit", "") => Self::Quit,
            _ => return None,
        };
        Some(command)
    }
}

fn print_event(event: &ShowEvent) {
    match event {
        ShowEvent::ProductionKnown(production) => {
            println!("* production {} of \"{}\"", production.id, production.title)
        }
        ShowEvent::ActorJoined(actor) => {
            println!("* {} joined ({})", actor.display_name(), actor.identity)
        }
        ShowEvent::CastingChanged(casting) => print_casting(casting),
        ShowEvent::ShowBegun(actors_by_part) => {
            println!("* show begun with {} cast parts", actors_by_part.len())
        }
        ShowEvent::CueAdvanced(cue) => match &cue.text {
            Some(text) => println!("> [{}] {}: {}", cue.scene_ref, cue.part, text),
            None => println!("> [{}] {}", cue.scene_ref, cue.part),
        },
        ShowEvent::ShowEnded => println!("* curtain"),
    }
}

fn print_casting(casting: &Casting) {
    println!("* casting:");
    for (part, actor) in &casting.actors_by_part {
        println!("    {:<24} {}", part, actor.as_deref().unwrap_or("-"));
    }
}

fn print_cast_list(actors_by_part: &ActorsByPart) {
    println!("cast:");
    for (part, identity) in actors_by_part {
        println!("    {:<24} {}", part, identity);
    }
}

fn print_status(snapshot: &EngineSnapshot) {
    println!(
        "identity {}  state {:?}  stage {:?}",
        snapshot.identity.as_deref().unwrap_or("?"),
        snapshot.state,
        snapshot.stage
    );
    if let Some(production) = &snapshot.production {
        println!("production {} of \"{}\"", production.id, production.title);
    }
    if let Some(role) = snapshot.role {
        println!("role {:?}  auto-cast {}", role, snapshot.auto_cast);
    }
    if !snapshot.actors.is_empty() {
        let names: Vec<_> = snapshot.actors.iter().map(Actor::display_name).collect();
        println!("roster {}", names.join(", "));
    }
    // Live casting until the show begins, then the frozen broadcast
    if !snapshot.actors_by_part.is_empty() {
        print_cast_list(&snapshot.actors_by_part);
    } else if !snapshot.casting.actors_by_part.is_empty() {
        print_casting(&snapshot.casting);
    }
    if !snapshot.uncast_actors.is_empty() {
        let names: Vec<_> = snapshot
            .uncast_actors
            .iter()
            .map(Actor::display_name)
            .collect();
        println!("uncast actors {}", names.join(", "));
    }
    if !snapshot.uncast_parts.is_empty() {
        println!("uncast parts {}", snapshot.uncast_parts.join(", "));
    }
    if !snapshot.upcoming_parts.is_empty() {
        println!("your parts {}", snapshot.upcoming_parts.join(", "));
    }
    if let Some(cue) = &snapshot.cue {
        println!("cue line {} ({})", cue.line_number, cue.part);
    }
    match snapshot.last_sync {
        Some(at) => println!("last sync {}", at.format("%H:%M:%S")),
        None => println!("last sync never"),
    }
}

/// Read and execute commands until `quit` or end of input, printing show
/// events in between.
///
/// `display_name` is used when `join` names nobody.
pub async fn run<B: ScriptBucket>(
    handle: EngineHandle,
    canon: Arc<Canon<B>>,
    mut events: mpsc::UnboundedReceiver<ShowEvent>,
    display_name: &str,
) -> Result<()> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            Some(event) = events.recv() => {
                print_event(&event);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = ConsoleCommand::parse(&line) else {
            println!("unrecognized command, try `help`");
            continue;
        };
        if command == ConsoleCommand::Quit {
            break;
        }
        if let Err(e) = execute(command, &handle, canon.as_ref(), display_name).await {
            warn!(error = %e, "Command failed");
            println!("! {}", e);
        }
    }
    debug!("Console closed");
    Ok(())
}

async fn execute<B: ScriptBucket>(
    command: ConsoleCommand,
    handle: &EngineHandle,
    canon: &Canon<B>,
    display_name: &str,
) -> Result<()> {
    match command {
        ConsoleCommand::Plays => {
            for title in canon.list_titles().await? {
                println!("  {}", title);
            }
        }
        ConsoleCommand::Sections(title) => {
            let script = canon.fetch_script(&title).await?;
            for (key, label) in script.sections() {
                let lines = script.in_section(&key).len();
                println!("  {:<8} {:<20} {} lines", key, label, lines);
            }
        }
        ConsoleCommand::Add { title, path } => {
            let script = canon.add_script_file(&title, &path).await?;
            println!("* added \"{}\" ({} lines)", title, script.len());
        }
        ConsoleCommand::Productions => {
            for production in handle.snapshot().await?.productions {
                println!("  {}  {}", production.id, production.title);
            }
        }
        ConsoleCommand::Direct(title) => {
            let production = handle.make_invite(title).await?;
            println!("* directing {} ({})", production.title, production.id);
        }
        ConsoleCommand::Join {
            production_id,
            name,
        } => {
            let snapshot = handle.snapshot().await?;
            match snapshot
                .productions
                .into_iter()
                .find(|p| p.id == production_id)
            {
                Some(production) => {
                    let name = name.unwrap_or_else(|| display_name.to_string());
                    let identity = handle.accept_invite(production, name).await?;
                    println!("* joined as {}", identity);
                }
                None => println!("unknown production {}", production_id),
            }
        }
        ConsoleCommand::Cast { part, actor } => handle.set_manual_cast(part, actor).await?,
        ConsoleCommand::Uncast(part) => handle.clear_manual_cast(part).await?,
        ConsoleCommand::AutoCast => handle.toggle_auto_cast().await?,
        ConsoleCommand::Begin => handle.begin_show().await?,
        ConsoleCommand::Next => handle.cue_next_actor().await?,
        ConsoleCommand::Status => print_status(&handle.snapshot().await?),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        assert_eq!(ConsoleCommand::parse("plays"), Some(ConsoleCommand::Plays));
        assert_eq!(ConsoleCommand::parse("  next  "), Some(ConsoleCommand::Next));
        assert_eq!(ConsoleCommand::parse("exit"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse(""), None);
        assert_eq!(ConsoleCommand::parse("next please"), None);
        assert_eq!(ConsoleCommand::parse("encore"), None);
    }

    #[test]
    fn test_parse_titles_with_spaces() {
        assert_eq!(
            ConsoleCommand::parse("direct The Winter's Tale"),
            Some(ConsoleCommand::Direct("The Winter's Tale".to_string()))
        );
        assert_eq!(ConsoleCommand::parse("direct"), None);
    }

    #[test]
    fn test_parse_join() {
        assert_eq!(
            ConsoleCommand::parse("join kf12j1700000000000 Ann Marie"),
            Some(ConsoleCommand::Join {
                production_id: "kf12j1700000000000".to_string(),
                name: Some("Ann Marie".to_string()),
            })
        );
        assert_eq!(
            ConsoleCommand::parse("join kf12j1700000000000"),
            Some(ConsoleCommand::Join {
                production_id: "kf12j1700000000000".to_string(),
                name: None,
            })
        );
        assert_eq!(ConsoleCommand::parse("join"), None);
    }

    #[test]
    fn test_parse_add() {
        assert_eq!(
            ConsoleCommand::parse("add The Winter's Tale plays/winters_tale.json"),
            Some(ConsoleCommand::Add {
                title: "The Winter's Tale".to_string(),
                path: PathBuf::from("plays/winters_tale.json"),
            })
        );
        assert_eq!(
            ConsoleCommand::parse("add Lear lear.json"),
            Some(ConsoleCommand::Add {
                title: "Lear".to_string(),
                path: PathBuf::from("lear.json"),
            })
        );
        assert_eq!(ConsoleCommand::parse("add lear.json"), None);
        assert_eq!(ConsoleCommand::parse("add"), None);
    }

    #[test]
    fn test_parse_cast() {
        assert_eq!(
            ConsoleCommand::parse("cast First Witch 3f2a9c"),
            Some(ConsoleCommand::Cast {
                part: "First Witch".to_string(),
                actor: "3f2a9c".to_string(),
            })
        );
        assert_eq!(
            ConsoleCommand::parse("uncast First Witch"),
            Some(ConsoleCommand::Uncast("First Witch".to_string()))
        );
        assert_eq!(ConsoleCommand::parse("cast MACBETH"), None);
    }
}

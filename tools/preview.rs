/// Preview — interactive lesson shell for playing modules in a terminal.
///
/// Usage: preview [--data <dir>] [--generate "<theme>"] [--module <id>]
///
/// Commands:
///   list                — list catalog modules
///   open <id>           — start a lesson session
///   card                — reprint the current card
///   next / prev         — navigate (inflections gate forward progress)
///   answer <text>       — answer the current inflection card
///   retry               — retry reflection generation after a failure
///   generate <theme>    — generate a module from a theme and open it
///   help                — list commands
///   quit                — exit

use lesson_engine::catalog::Catalog;
use lesson_engine::core::navigation::{Direction, TRANSITION_DELAY};
use lesson_engine::core::reflection::ReflectionPhase;
use lesson_engine::core::session::LessonSession;
use lesson_engine::generate::reflections::ReflectionPolicy;
use lesson_engine::generate::story::generate_story_module;
use lesson_engine::generate::{ChatBackend, GenerationError};
use lesson_engine::schema::card::Card;
use std::io::{self, BufRead, Write};
use std::path::Path;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let mut data_dir = None;
    let mut generate_theme = None;
    let mut open_id = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data" if i + 1 < args.len() => {
                i += 1;
                data_dir = Some(args[i].clone());
            }
            "--generate" if i + 1 < args.len() => {
                i += 1;
                generate_theme = Some(args[i].clone());
            }
            "--module" if i + 1 < args.len() => {
                i += 1;
                open_id = Some(args[i].clone());
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut catalog = Catalog::built_in();
    if let Some(ref dir) = data_dir {
        match catalog.load_dir(Path::new(dir)) {
            Ok(n) => println!("Loaded {} module(s) from {}", n, dir),
            Err(e) => {
                eprintln!("ERROR loading {}: {}", dir, e);
                std::process::exit(1);
            }
        }
    }

    let backend = ChatBackend::groq_from_env("llama-3.3-70b-versatile");
    let policy = ReflectionPolicy::default();

    println!("{} module(s) in the library.", catalog.list().len());
    println!("Type 'help' for commands.\n");

    let mut session: Option<LessonSession> = None;

    if let Some(theme) = generate_theme {
        session = generate_and_open(&backend, &theme).await;
    } else if let Some(id) = open_id {
        session = open_module(&catalog, &id);
    }
    if let Some(ref s) = session {
        print_card(s);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("lesson> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
            None => (line.to_lowercase(), ""),
        };

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" => print_help(),
            "list" => {
                for module in catalog.list() {
                    println!(
                        "  {:<16} {} {} — {}",
                        module.id,
                        module.icon,
                        module.title,
                        module.subtitle
                    );
                }
            }
            "open" => {
                session = open_module(&catalog, rest);
                if let Some(ref s) = session {
                    print_card(s);
                }
            }
            "generate" => {
                if rest.is_empty() {
                    println!("Usage: generate <theme>");
                    continue;
                }
                session = generate_and_open(&backend, rest).await;
                if let Some(ref s) = session {
                    print_card(s);
                }
            }
            "card" => match session {
                Some(ref s) => print_card(s),
                None => println!("No open session. Try 'open <id>'."),
            },
            "next" => step(&mut session, &backend, &policy, Direction::Forward).await,
            "prev" => step(&mut session, &backend, &policy, Direction::Backward).await,
            "answer" => {
                let Some(ref mut s) = session else {
                    println!("No open session.");
                    continue;
                };
                match s.card().inflection_key().map(str::to_string) {
                    Some(key) => {
                        if s.submit_response(&key, rest) {
                            println!("Saved. 'next' to continue.");
                        } else {
                            println!("Nothing to save — write something first.");
                        }
                    }
                    None => println!("The current card doesn't take an answer."),
                }
            }
            "retry" => {
                let Some(ref mut s) = session else {
                    println!("No open session.");
                    continue;
                };
                if s.drive_retry(&backend, &policy).await {
                    print_card(s);
                } else {
                    println!("Nothing to retry.");
                }
            }
            _ => println!("Unknown command '{}'. Type 'help'.", cmd),
        }
    }
}

fn print_usage() {
    println!("Usage: preview [--data <dir>] [--generate \"<theme>\"] [--module <id>]");
}

fn print_help() {
    println!("  list                list catalog modules");
    println!("  open <id>           start a lesson session");
    println!("  card                reprint the current card");
    println!("  next / prev         navigate");
    println!("  answer <text>       answer the current inflection card");
    println!("  retry               retry reflection generation");
    println!("  generate <theme>    generate a module and open it");
    println!("  quit                exit");
}

fn open_module(catalog: &Catalog, id: &str) -> Option<LessonSession> {
    let Some(module) = catalog.find(id) else {
        println!("No module '{}'. Try 'list'.", id);
        return None;
    };
    match LessonSession::new(module.clone()) {
        Ok(session) => Some(session),
        Err(e) => {
            eprintln!("ERROR: module '{}' is invalid: {}", id, e);
            None
        }
    }
}

async fn generate_and_open(backend: &ChatBackend, theme: &str) -> Option<LessonSession> {
    println!("Generating a story for \"{}\"...", theme);
    let module = match generate_story_module(backend, theme).await {
        Ok(module) => module,
        Err(GenerationError::MissingCredentials(endpoint)) => {
            eprintln!(
                "ERROR: no API credential for {} — set GROQ_API_KEY to generate stories.",
                endpoint
            );
            return None;
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return None;
        }
    };
    println!("  {} {}", module.icon, module.title);
    match LessonSession::new(module) {
        Ok(session) => Some(session),
        Err(e) => {
            eprintln!("ERROR: generated module is invalid: {}", e);
            None
        }
    }
}

async fn step(
    session: &mut Option<LessonSession>,
    backend: &ChatBackend,
    policy: &ReflectionPolicy,
    direction: Direction,
) {
    let Some(s) = session else {
        println!("No open session.");
        return;
    };
    let Some(pending) = s.request_transition(direction) else {
        if direction == Direction::Forward && s.card().is_inflection() {
            println!("Answer this card first ('answer <text>').");
        }
        return;
    };
    tokio::time::sleep(TRANSITION_DELAY).await;
    s.commit_transition(pending);

    if s.card().is_reflection() {
        println!("reflecting...");
        s.drive_reflections(backend, policy).await;
    }
    print_card(s);
}

fn print_card(session: &LessonSession) {
    let projection = session.projection();
    let module = session.module();
    println!(
        "\n── {} · card {}/{} ──",
        module.title,
        projection.index + 1,
        projection.total
    );

    match session.card() {
        Card::Story(story) => {
            if let Some(ref tradition) = story.tradition {
                println!("  [{}] {}", tradition, story.visual);
            } else {
                println!("  {}", story.visual);
            }
            println!("  {}", story.body);
        }
        Card::Inflection(inflection) => {
            println!("  {}  {}", inflection.visual, inflection.prompt);
            match session.responses().get(&inflection.inflection_key) {
                Some(answer) => println!("  (answered: \"{}\")", answer),
                None => println!("  ({})", inflection.placeholder),
            }
        }
        Card::Reflection(_) => match session.reflection_phase() {
            ReflectionPhase::Loading => println!("  reflecting..."),
            ReflectionPhase::Error => {
                println!("  The mirror is clouded right now. 'retry' to try again.")
            }
            ReflectionPhase::Ready => {
                for (key, ctx) in &module.inflection_context {
                    println!("\n  {}", ctx.label.to_uppercase());
                    match session.responses().get(key) {
                        Some(answer) => println!("  you wrote: \"{}\"", answer),
                        None => println!("  (skipped)"),
                    }
                    if let Some(reflections) = session.reflections() {
                        if let Some(text) = reflections.get(key) {
                            println!("  {}", text);
                        }
                    }
                }
            }
            ReflectionPhase::Idle => println!("  ..."),
        },
    }

    let forward = if projection.can_go_forward { "next" } else { "·" };
    let backward = if projection.can_go_backward { "prev" } else { "·" };
    println!("  [{} | {}]", backward, forward);
}

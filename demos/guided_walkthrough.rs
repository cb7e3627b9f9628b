/// Scripted end-to-end walkthrough of a built-in lesson, with reflection
/// generation served by the scripted backend.
///
/// Run with: cargo run --example guided_walkthrough

use lesson_engine::catalog::Catalog;
use lesson_engine::core::navigation::Direction;
use lesson_engine::core::session::LessonSession;
use lesson_engine::generate::reflections::ReflectionPolicy;
use lesson_engine::generate::ScriptedBackend;
use lesson_engine::schema::card::Card;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let catalog = Catalog::built_in();
    let module = catalog.find("cartographer").expect("built-in module").clone();
    let mut session = LessonSession::new(module).expect("built-in modules are valid");

    let answers = [
        ("firstPause", "I keep researching careers instead of applying"),
        ("secondPause", "Leaving the raft — I hoard what once helped"),
    ];

    loop {
        print_card(&session);

        if let Some(key) = session.card().inflection_key().map(str::to_string) {
            let (_, answer) = answers
                .iter()
                .find(|(k, _)| *k == key)
                .expect("scripted answer for every inflection");
            session.submit_response(&key, answer);
            println!("   you answer: \"{}\"", answer);
        }

        if session.card().is_reflection() {
            break;
        }

        let pending = session
            .request_transition(Direction::Forward)
            .expect("scripted walkthrough never stalls");
        session.commit_transition(pending);
    }

    let backend = ScriptedBackend::new().with_reply(
        r#"{"firstPause": "You named the research that became a hiding place.",
            "secondPause": "You saw that the raft served you and still has to be set down."}"#,
    );
    session
        .drive_reflections(&backend, &ReflectionPolicy::default())
        .await;

    println!("\n=== reflections ===");
    let reflections = session.reflections().expect("scripted backend succeeds");
    for (key, ctx) in &session.module().inflection_context {
        println!("\n{}", ctx.label);
        println!("  {}", reflections[key]);
    }
}

fn print_card(session: &LessonSession) {
    let p = session.projection();
    match session.card() {
        Card::Story(story) => {
            println!("\n[{}/{}] {} {}", p.index + 1, p.total, story.visual, story.body)
        }
        Card::Inflection(inflection) => {
            println!("\n[{}/{}] {} {}", p.index + 1, p.total, inflection.visual, inflection.prompt)
        }
        Card::Reflection(card) => println!("\n[{}/{}] {} ...", p.index + 1, p.total, card.visual),
    }
}

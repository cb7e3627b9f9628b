/// Module Linter — validates hand-authored lesson module files.
///
/// Usage: module_linter <path> [<path>...]
///
/// Each path may be a .ron file or a directory of them. Beyond the hard
/// invariants (which fail the run), the linter warns about content that
/// loads but will read poorly.

use lesson_engine::catalog::Catalog;
use lesson_engine::schema::card::Card;
use lesson_engine::schema::module::Module;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: module_linter <path> [<path>...]");
        process::exit(0);
    }

    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut checked = 0;

    for arg in &args[1..] {
        let path = Path::new(arg);
        if path.is_file() {
            lint_file(path, &mut errors, &mut warnings, &mut checked);
        } else if path.is_dir() {
            lint_dir(path, &mut errors, &mut warnings, &mut checked);
        } else {
            errors.push(format!("Path '{}' does not exist", arg));
        }
    }

    println!("\n=== Module Lint Report ===\n");
    println!("Checked {} file(s)", checked);

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn lint_dir(dir: &Path, errors: &mut Vec<String>, warnings: &mut Vec<String>, checked: &mut u32) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(format!("Cannot read directory {}: {}", dir.display(), e));
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            lint_dir(&path, errors, warnings, checked);
        } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            lint_file(&path, errors, warnings, checked);
        }
    }
}

fn lint_file(path: &Path, errors: &mut Vec<String>, warnings: &mut Vec<String>, checked: &mut u32) {
    *checked += 1;
    match Catalog::load_from_ron(path) {
        Ok(module) => {
            println!("  Loaded: {} ({})", path.display(), module.id);
            lint_content(&module, path, warnings);
        }
        Err(e) => {
            errors.push(format!("{}: {}", path.display(), e));
        }
    }
}

/// Soft checks on content that satisfies the invariants but reads poorly.
fn lint_content(module: &Module, path: &Path, warnings: &mut Vec<String>) {
    let name = path.display();

    if module.inflection_keys().count() == 0 {
        warnings.push(format!(
            "{}: module '{}' has no inflection cards — the reflection card will have nothing to reflect on",
            name, module.id
        ));
    }

    for card in &module.cards {
        match card {
            Card::Story(story) => {
                if story.body.len() < 40 {
                    warnings.push(format!(
                        "{}: story card {} is very short ({} bytes)",
                        name,
                        story.id.0,
                        story.body.len()
                    ));
                }
                if story.sticker_query.is_empty() {
                    warnings.push(format!(
                        "{}: story card {} has an empty sticker query",
                        name, story.id.0
                    ));
                }
            }
            Card::Inflection(inflection) => {
                if !inflection.prompt.contains('?') {
                    warnings.push(format!(
                        "{}: inflection '{}' prompt asks no question",
                        name, inflection.inflection_key
                    ));
                }
            }
            Card::Reflection(_) => {}
        }
    }

    for (key, ctx) in &module.inflection_context {
        if !module.has_inflection_key(key) {
            warnings.push(format!(
                "{}: context entry '{}' has no matching inflection card",
                name, key
            ));
        }
        if ctx.story_context.len() < 40 {
            warnings.push(format!(
                "{}: context for '{}' is thin — the generated reflection will have little to work with",
                name, key
            ));
        }
    }
}

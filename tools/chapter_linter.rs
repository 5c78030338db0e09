/// Chapter Linter checks authored chapters for missing start nodes, dead ends,
/// branch linkage and overlapping ranges.
///
/// Usage: chapter_linter <chapter.ron | chapters_dir> [--fill-empty-text]
///
/// With `--fill-empty-text`, nodes with blank text get their own name as
/// text and the files are written back before linting.

use chapter_flow::core::authoring::fill_empty_text_from_names;
use chapter_flow::core::validate::{tally, validate_story};
use chapter_flow::schema::container::{Chapter, Story};
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: chapter_linter <chapter.ron | chapters_dir> [--fill-empty-text]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let mut fill_text = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--fill-empty-text" => fill_text = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let files = match chapter_files(target) {
        Some(files) => files,
        None => {
            eprintln!("ERROR: Path '{}' does not exist", target.display());
            process::exit(1);
        }
    };

    let mut chapters = Vec::new();
    let mut load_failures = 0;
    for path in &files {
        match Chapter::load_from_ron(path) {
            Ok(mut chapter) => {
                println!("  Loaded: {} (chapter {})", path.display(), chapter.number);
                if fill_text {
                    let filled = fill_empty_text_from_names(&mut chapter);
                    if filled > 0 {
                        write_back(path, &chapter);
                        println!("    filled text for {} nodes", filled);
                    }
                }
                chapters.push(chapter);
            }
            Err(e) => {
                eprintln!("  ERROR loading {}: {}", path.display(), e);
                load_failures += 1;
            }
        }
    }

    let story = match Story::new(chapters) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    println!("Loaded {} chapters", story.len());
    for chapter in story.chapters() {
        println!(
            "  chapter {}: {} main nodes, {} click / {} forced / {} terminal branches",
            chapter.number,
            chapter.main_sequence.len(),
            chapter.click_branches.len(),
            chapter.forced_branches.len(),
            chapter.terminal_branches.len()
        );
    }

    let issues = validate_story(&story);

    println!("\n=== Chapter Lint Report ===\n");

    if issues.is_empty() && load_failures == 0 {
        println!("All checks passed!");
    }

    let mut sorted = issues.clone();
    sorted.sort_by_key(|issue| issue.severity);
    for issue in &sorted {
        println!("{}", issue);
    }

    let (errors, warnings) = tally(&issues);
    let errors = errors + load_failures;
    println!("\nSummary: {} errors, {} warnings", errors, warnings);

    if errors == 0 {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn chapter_files(target: &Path) -> Option<Vec<PathBuf>> {
    if target.is_file() {
        return Some(vec![target.to_path_buf()]);
    }
    if !target.is_dir() {
        return None;
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(target)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("ron"))
        .collect();
    files.sort();
    Some(files)
}

fn write_back(path: &Path, chapter: &Chapter) {
    let written = chapter
        .to_ron()
        .map_err(|e| e.to_string())
        .and_then(|text| std::fs::write(path, text).map_err(|e| e.to_string()));
    if let Err(e) = written {
        eprintln!("  ERROR writing {}: {}", path.display(), e);
    }
}

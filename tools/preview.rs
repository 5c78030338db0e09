/// Preview: interactive shell that plays a story from typed commands.
///
/// Usage: preview <chapters_dir | chapter.ron> [--config <path>] [--seed <n>]
///
/// Commands:
///   hold [frames]   hold, drag upward for `frames` frames (default 5), release
///   click           click
///   escape          press hold, then cancel it
///   peek            show where hold and click would lead
///   state           dump the position counters
///   next            jump to the next chapter
///   restart         start the story over
///   help            list commands
///   quit            exit

use chapter_flow::core::flow::{Action, Step};
use chapter_flow::core::player::{FrameInput, PlayerConfig, StoryPlayer};
use chapter_flow::core::sink::{Effect, EffectLog, ManualClock};
use chapter_flow::schema::container::{Chapter, Story};
use chapter_flow::schema::node::ContentNode;
use std::io::{self, BufRead, Write};
use std::path::Path;

type Player = StoryPlayer<EffectLog, EffectLog, ManualClock>;

/// Long enough for any reveal and feedback timer to run out.
const SETTLE_MS: u64 = 60_000;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let content_path = args[1].clone();
    let mut config_path = None;
    let mut seed: u64 = 42;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let log = EffectLog::new();
    let clock = ManualClock::new(0);
    let mut builder = StoryPlayer::builder().seed(seed);
    let path = Path::new(&content_path);
    if path.is_file() {
        match Chapter::load_from_ron(path) {
            Ok(chapter) => builder = builder.chapter(chapter),
            Err(e) => {
                eprintln!("ERROR: Failed to load chapter: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        builder = builder.chapters_dir(&content_path);
    }
    builder = match config_path {
        Some(ref path) => builder.config_path(path),
        None => builder.config(PlayerConfig::default()),
    };

    let mut player = match builder.build(log.clone(), log.clone(), clock.clone()) {
        Ok(player) => player,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    print_story(player.story());
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    player.init();
    settle(&mut player, &clock);
    report(&log, &player);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "hold" | "sew" => {
                let frames: usize = match parts.get(1).map(|s| s.parse()) {
                    None => 5,
                    Some(Ok(n)) => n,
                    Some(Err(_)) => {
                        println!("Invalid frame count: {}", parts[1]);
                        continue;
                    }
                };
                let mut steps = player.tick(&FrameInput {
                    hold_pressed: true,
                    ..FrameInput::default()
                });
                for _ in 0..frames {
                    clock.advance(16);
                    steps.extend(player.tick(&FrameInput {
                        pointer_dy: 1.0,
                        ..FrameInput::default()
                    }));
                }
                println!("  drag distance: {:.1}", player.hold_distance());
                clock.advance(16);
                steps.extend(player.tick(&FrameInput {
                    hold_released: true,
                    ..FrameInput::default()
                }));
                if steps.is_empty() {
                    println!("  (hold too short, nothing happened)");
                }
                print_steps(&steps);
                settle(&mut player, &clock);
                report(&log, &player);
            }
            "click" | "c" => {
                let steps = player.tick(&FrameInput {
                    click: true,
                    ..FrameInput::default()
                });
                print_steps(&steps);
                settle(&mut player, &clock);
                report(&log, &player);
            }
            "escape" => {
                player.tick(&FrameInput {
                    hold_pressed: true,
                    ..FrameInput::default()
                });
                player.tick(&FrameInput {
                    cancel_hold: true,
                    pointer_dy: 1.0,
                    ..FrameInput::default()
                });
                player.tick(&FrameInput {
                    hold_released: true,
                    ..FrameInput::default()
                });
                println!("  hold cancelled");
                settle(&mut player, &clock);
                log.take();
            }
            "peek" | "p" => {
                print_peek("Hold", player.peek(Action::HoldAdvance));
                print_peek("Click", player.peek(Action::Click));
            }
            "state" | "t" => {
                println!(
                    "  chapter {}: {}",
                    player.chapter().number,
                    player.position()
                );
                println!(
                    "  clicks: {}, penalty clicks: {}",
                    player.clicks_in_chapter(),
                    player.total_penalty_clicks()
                );
                if let Some(penalty) = player.reached_penalty() {
                    println!(
                        "  penalty node {} ({} clicks)",
                        penalty.target.0, penalty.required_clicks
                    );
                }
            }
            "next" => {
                if player.activate_next_chapter() {
                    settle(&mut player, &clock);
                    report(&log, &player);
                } else {
                    println!("  no chapter follows chapter {}", player.chapter().number);
                }
            }
            "restart" => {
                player.init();
                settle(&mut player, &clock);
                report(&log, &player);
            }
            _ => {
                println!(
                    "Unknown command: '{}'. Type 'help' for available commands.",
                    cmd
                );
            }
        }
    }
}

fn settle(player: &mut Player, clock: &ManualClock) {
    clock.advance(SETTLE_MS);
    player.tick(&FrameInput::default());
}

/// Print what the display received since the last report.
fn report(log: &EffectLog, player: &Player) {
    let effects = log.take();
    for effect in &effects {
        match effect {
            Effect::RolePanel(role) => println!("  [panel] {}", role.label()),
            Effect::Background(asset) => println!("  [background] {}", asset),
            Effect::BackgroundAudio(Some(asset)) => println!("  [audio] {}", asset),
            Effect::SetActive { target, active } => {
                println!("  [{}] {}", if *active { "activate" } else { "deactivate" }, target)
            }
            Effect::Message(message) => println!("  [message] {}", message),
            Effect::StoryEnded => println!("  [story ended]"),
            _ => {}
        }
    }
    let last_text = effects.iter().rev().find_map(|e| match e {
        Effect::Text { text, .. } if !text.is_empty() => Some(text.as_str()),
        _ => None,
    });
    if let Some(text) = last_text {
        let name = player.current_node().map(|n| n.name.as_str()).unwrap_or("");
        println!("\n--- {} ---", name);
        println!("{}", text);
        println!("---\n");
    }
}

fn print_steps(steps: &[Step]) {
    for step in steps {
        match step {
            Step::Moved { from, to } => println!("  {} -> {}", from, to),
            Step::Ended { from } => println!("  {} -> end", from),
            Step::Ignored(reason) => println!("  ignored: {:?}", reason),
        }
    }
}

fn print_peek(label: &str, node: Option<&ContentNode>) {
    match node {
        Some(node) => println!("  {} -> {}: {}", label, node.name, node.preview()),
        None => println!("  {} -> (nothing)", label),
    }
}

fn print_story(story: &Story) {
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
}

fn print_usage() {
    println!("Preview: interactive shell for playing chapters.");
    println!();
    println!("Usage: preview <chapters_dir | chapter.ron> [--config <path>] [--seed <n>]");
    println!();
    println!("  --config <path>  Player configuration (RON)");
    println!("  --seed <n>       Reveal timing seed (default: 42)");
}

fn print_help() {
    println!("Commands:");
    println!("  hold [frames]  Hold, drag upward for n frames (default 5), release");
    println!("  click          Click");
    println!("  escape         Start a hold and cancel it");
    println!("  peek           Show where hold and click would lead");
    println!("  state          Dump position counters");
    println!("  next           Jump to the next chapter");
    println!("  restart        Start the story over");
    println!("  help           Show this help");
    println!("  quit           Exit");
}

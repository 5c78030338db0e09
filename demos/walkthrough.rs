/// Walkthrough example: plays the demo story from start to finish.
///
/// A scripted session: sew through the workshop chapter, take the forced
/// detour after the machine's second answer, then talk to the machine in
/// the second chapter until the story ends.
///
/// Run with: cargo run --example walkthrough

use chapter_flow::core::flow::{Action, Step};
use chapter_flow::core::player::{FrameInput, PlayerConfig, StoryPlayer};
use chapter_flow::core::sink::{Effect, EffectLog, ManualClock};

type Player = StoryPlayer<EffectLog, EffectLog, ManualClock>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let log = EffectLog::new();
    let clock = ManualClock::new(0);

    let mut player = StoryPlayer::builder()
        .seed(2026)
        .chapters_dir("chapters/demo")
        .config(PlayerConfig {
            story_end_message: "- The End -".to_string(),
            ..PlayerConfig::default()
        })
        .build(log.clone(), log.clone(), clock.clone())
        .expect("Failed to build player");

    // --- Title ---
    println!("========================================");
    println!("   THE SEWING MACHINE");
    println!("   A Story in Two Chapters");
    println!("========================================");
    println!();

    player.init();
    show(&mut player, &log, &clock, "Opening");

    // --- Chapter 1: sew one stitch, then listen ---
    sew(&mut player, &clock);
    show(&mut player, &log, &clock, "Sew");

    click(&mut player);
    show(&mut player, &log, &clock, "Click");
    click(&mut player);
    show(&mut player, &log, &clock, "Click");

    // The second answer hides a forced detour behind the next stitch
    if let Some(node) = player.peek(Action::HoldAdvance) {
        println!("(a hold now leads to '{}')\n", node.name);
    }
    sew(&mut player, &clock);
    show(&mut player, &log, &clock, "Sew");
    sew(&mut player, &clock);
    show(&mut player, &log, &clock, "Sew");
    sew(&mut player, &clock);
    show(&mut player, &log, &clock, "Sew");
    sew(&mut player, &clock);
    show(&mut player, &log, &clock, "Sew");

    // Node 3 does not open the machine's branches
    let ignored = click(&mut player);
    println!("(click on the last seam: {:?})\n", ignored);

    // The trigger node hands over to chapter 2
    sew(&mut player, &clock);
    show(&mut player, &log, &clock, "Sew");

    // --- Chapter 2: keep asking until the terminal branch takes over ---
    while !player.is_ended() {
        let steps = click(&mut player);
        if steps.iter().all(|s| matches!(s, Step::Ignored(_))) {
            println!("(stuck: {:?})", steps);
            break;
        }
        show(&mut player, &log, &clock, "Click");
    }

    println!("========================================");
    println!("   Chapter {} finished at {}", player.chapter().number, player.position());
    println!("========================================");
}

/// A full hold gesture: press, drag upward, release.
fn sew(player: &mut Player, clock: &ManualClock) -> Vec<Step> {
    let mut steps = player.tick(&FrameInput {
        hold_pressed: true,
        ..FrameInput::default()
    });
    for _ in 0..8 {
        clock.advance(16);
        steps.extend(player.tick(&FrameInput {
            pointer_dy: 1.0,
            ..FrameInput::default()
        }));
    }
    clock.advance(16);
    steps.extend(player.tick(&FrameInput {
        hold_released: true,
        ..FrameInput::default()
    }));
    steps
}

fn click(player: &mut Player) -> Vec<Step> {
    player.tick(&FrameInput {
        click: true,
        ..FrameInput::default()
    })
}

/// Let the reveal finish, then print what ended up on screen.
fn show(player: &mut Player, log: &EffectLog, clock: &ManualClock, label: &str) {
    clock.advance(30_000);
    player.tick(&FrameInput::default());

    let effects = log.take();
    let mut panel = None;
    let mut text = None;
    for effect in &effects {
        match effect {
            Effect::RolePanel(role) => panel = Some(role.label()),
            Effect::Background(asset) => println!("  [background: {}]", asset),
            Effect::SetActive { target, active } => {
                println!("  [{} {}]", target, if *active { "on" } else { "off" })
            }
            Effect::Text { text: t, .. } if !t.is_empty() => text = Some(t.clone()),
            Effect::Message(message) => println!("  {}", message),
            _ => {}
        }
    }
    if let Some(text) = text {
        let speaker = panel.unwrap_or("user");
        println!("--- {} ({}) ---", label, speaker);
        println!("{}", text);
        println!();
    }
}

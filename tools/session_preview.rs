/// Session Preview: interactive shell for stepping an orchestrator by hand.
///
/// Usage: session_preview [--config <path>] [--template <name>] [--seed <n>]
///
/// Commands:
///   outcome <class> <delta> <character> [flag,flag]  feed an outcome
///   tick <ms>                                        advance to session time
///   advance <ms>                                     advance by a delta
///   choice <character> <tone,tone,...>               score candidate choices
///   cancel                                           cancel the running arc
///   phase                                            show phase and arc state
///   session <index> <returning> <avg_metric>         start a new session
///   seed <n>                                         set the jackpot seed
///   help                                             list commands
///   quit                                             exit

use moment_engine::core::orchestrator::{OrchestratorError, SessionOrchestrator};
use moment_engine::core::phase::SessionTemplate;
use moment_engine::schema::instruction::PresentationInstruction;
use moment_engine::schema::outcome::{ChoiceCandidate, OutcomeEvent};
use moment_engine::schema::session::SessionContext;
use std::io::{self, BufRead, Write};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let mut config_path = None;
    let mut template = None;
    let mut seed = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--template" if i + 1 < args.len() => {
                i += 1;
                template = match parse_template(&args[i]) {
                    Some(t) => Some(t),
                    None => {
                        eprintln!("Unknown template: {}", args[i]);
                        std::process::exit(1);
                    }
                };
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = match parse_seed(&args[i]) {
                    Some(s) => Some(s),
                    None => {
                        eprintln!("Invalid seed: {}", args[i]);
                        std::process::exit(1);
                    }
                };
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut builder = SessionOrchestrator::builder();
    if let Some(s) = seed {
        builder = builder.seed(s);
    }
    if let Some(ref path) = config_path {
        builder = builder.config_file(path);
    }
    if let Some(t) = template {
        builder = builder.template(t);
    }
    let mut engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Session of {} ms, seed {}",
        engine.phases().session_end_ms(),
        engine.seed()
    );
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("[{} ms {}] > ", engine.elapsed_ms(), engine.current_phase());
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

        let result = match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => {
                print_help();
                Ok(())
            }
            "outcome" => outcome_command(&mut engine, &parts),
            "tick" => match parts.get(1).and_then(|s| s.parse::<f64>().ok()) {
                Some(ms) => engine.tick(ms).map(|out| print_instructions(&out)),
                None => {
                    println!("Usage: tick <ms>");
                    Ok(())
                }
            },
            "advance" => match parts.get(1).and_then(|s| s.parse::<f64>().ok()) {
                Some(delta) => {
                    let target = engine.elapsed_ms() as f64 + delta;
                    engine.tick(target).map(|out| print_instructions(&out))
                }
                None => {
                    println!("Usage: advance <ms>");
                    Ok(())
                }
            },
            "choice" => choice_command(&engine, &parts),
            "cancel" => {
                match engine.cancel_active() {
                    Some(id) => println!("Cancelled {}; abort queued for next tick.", id),
                    None => println!("No arc is running."),
                }
                Ok(())
            }
            "phase" => {
                println!("Phase: {}", engine.current_phase());
                println!("Arc state: {}", engine.arc_state());
                println!("Combo: {}", engine.combo());
                if let Some(arc) = engine.active_arc() {
                    println!(
                        "Active: {} {} magnitude={} duration={} ms",
                        arc.id, arc.tier, arc.magnitude, arc.duration_ms
                    );
                }
                Ok(())
            }
            "session" => {
                if parts.len() < 4 {
                    println!("Usage: session <index> <returning:yes|no> <avg_metric>");
                    continue;
                }
                let (Ok(index), Ok(average)) = (parts[1].parse::<u32>(), parts[3].parse::<f64>())
                else {
                    println!("Invalid session values: index must be a whole number, avg_metric a number");
                    continue;
                };
                let returning = matches!(parts[2], "yes" | "true" | "y");
                engine.start_session(SessionContext::new(index, returning, average));
                println!("New session #{} started.", index);
                Ok(())
            }
            "seed" => {
                match parts.get(1) {
                    Some(arg) => match parse_seed(arg) {
                        Some(s) => {
                            engine.set_seed(s);
                            println!("Seed set to {}", s);
                        }
                        None => println!("Invalid seed: {}", arg),
                    },
                    None => println!("Current seed: {}", engine.seed()),
                }
                Ok(())
            }
            _ => {
                println!("Unknown command '{}'. Type 'help' for commands.", cmd);
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("ERROR: {}", e);
        }
    }
}

fn outcome_command(engine: &mut SessionOrchestrator, parts: &[&str]) -> Result<(), OrchestratorError> {
    if parts.len() < 4 {
        println!("Usage: outcome <class> <delta> <character> [flag,flag]");
        println!("  class: best, good, neutral, poor, hollow");
        println!("  flags: significant, near_miss, repair, high_tension, late_chapter, anger, joy, relief, ...");
        return Ok(());
    }
    let Ok(delta) = parts[2].parse::<f64>() else {
        println!("Invalid metric delta: {}", parts[2]);
        return Ok(());
    };
    let mut outcome = OutcomeEvent::parse(parts[1], delta, parts[3])?;
    if let Some(flags) = parts.get(4) {
        for flag in flags.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            outcome = outcome.with_flag(flag);
        }
    }

    let result = engine.on_outcome(&outcome)?;
    println!(
        "phase={} ambient={:.3} jackpot_p={:.3} roll={}",
        result.phase,
        result.ambient_probability,
        result.decision.probability,
        result
            .decision
            .roll
            .map(|r| format!("{:.3}", r))
            .unwrap_or_else(|| "-".to_string())
    );
    let reasons: Vec<&str> = result.decision.reasons.iter().map(|r| r.name()).collect();
    println!("reasons: {:?}", reasons);
    if let Some(label) = &result.decision.combo_label {
        println!("combo: {} ({})", label, engine.combo());
    }
    if let Some(reward) = result.reward {
        println!("reward: {}", reward);
    }
    if let Some(arc) = result.arc {
        println!("arc: {} {} ms (speed {:.2})", arc.id, arc.duration_ms, arc.speed);
        for seg in &arc.segments {
            println!(
                "  {:<12} [{:>5}, {:>5}) glow={:.2} haptic={:.2}",
                seg.state.name(),
                seg.start_ms,
                seg.end_ms,
                seg.snapshot.glow,
                seg.snapshot.haptic_intensity
            );
        }
    }
    println!("disposition: {:?}", result.disposition);
    Ok(())
}

fn choice_command(engine: &SessionOrchestrator, parts: &[&str]) -> Result<(), OrchestratorError> {
    if parts.len() < 3 {
        println!("Usage: choice <character> <tone,tone,...>");
        return Ok(());
    }
    let candidates: Vec<ChoiceCandidate> = parts[2]
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|tone| ChoiceCandidate::new(tone, parts[1]))
        .collect();
    for profile in engine.on_choice_presented(&candidates)? {
        println!(
            "  {:<16} score={:>3} tier={:<10} glow={:.1} pulse={:?}",
            profile.tone_tag, profile.score, profile.tier.name(), profile.glow, profile.pulse
        );
    }
    Ok(())
}

fn print_instructions(instructions: &[PresentationInstruction]) {
    if instructions.is_empty() {
        println!("(no instructions)");
        return;
    }
    for i in instructions {
        let what = match i.state() {
            Some(state) => state.name().to_string(),
            None => "ABORTED".to_string(),
        };
        let channel = i.channel.map(|c| c.name()).unwrap_or("all");
        let params: Vec<String> = i.params.iter().map(|(k, v)| format!("{}={:.2}", k, v)).collect();
        println!(
            "  {} {:<12} {:<7} +{:>5} ms for {:>5} ms {}",
            i.arc_id,
            what,
            channel,
            i.offset_ms,
            i.duration_ms,
            params.join(" ")
        );
    }
}

fn parse_seed(s: &str) -> Option<u64> {
    s.trim().parse().ok()
}

fn parse_template(s: &str) -> Option<SessionTemplate> {
    match s.to_lowercase().as_str() {
        "standard" => Some(SessionTemplate::Standard),
        "fitness_habit" | "fitness" => Some(SessionTemplate::FitnessHabit),
        "social_experience" | "social" => Some(SessionTemplate::SocialExperience),
        _ => None,
    }
}

fn print_usage() {
    println!("Usage: session_preview [--config <path>] [--template <name>] [--seed <n>]");
    println!("  templates: standard, fitness_habit, social_experience");
}

fn print_help() {
    println!("Commands:");
    println!("  outcome <class> <delta> <character> [flags]  feed an outcome");
    println!("  tick <ms>                                    advance to session time");
    println!("  advance <ms>                                 advance by a delta");
    println!("  choice <character> <tone,tone,...>           score candidate choices");
    println!("  cancel                                       cancel the running arc");
    println!("  phase                                        show phase and arc state");
    println!("  session <index> <returning> <avg>            start a new session");
    println!("  seed <n>                                     set the jackpot seed");
    println!("  help                                         list commands");
    println!("  quit                                         exit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_seeds_are_not_replaced() {
        assert_eq!(parse_seed("7"), Some(7));
        assert_eq!(parse_seed(" 1234 "), Some(1234));
        assert_eq!(parse_seed("forty-two"), None);
        assert_eq!(parse_seed("-1"), None);
        assert_eq!(parse_seed(""), None);
    }
}

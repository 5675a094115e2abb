/// Config Linter: validates engine configuration files and flags tunings
/// that load fine but probably are not what the author meant.
///
/// Usage: config_linter <config.ron | config_dir>

use moment_engine::core::config::EngineConfig;
use moment_engine::schema::outcome::OutcomeClass;
use moment_engine::schema::tier::RiskTier;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: config_linter <config.ron | config_dir>");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let mut files = Vec::new();
    if target.is_file() {
        files.push(target.to_path_buf());
    } else if target.is_dir() {
        collect_ron_files(target, &mut files);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", args[1]);
        process::exit(1);
    }
    files.sort();

    let mut total_errors = 0;
    let mut total_warnings = 0;

    for path in &files {
        println!("\n=== {} ===\n", path.display());
        let (errors, warnings) = match EngineConfig::load_from_ron(path) {
            Ok(config) => (Vec::new(), lint_config(&config)),
            Err(e) => (vec![e.to_string()], Vec::new()),
        };

        if errors.is_empty() && warnings.is_empty() {
            println!("All checks passed!");
        }
        for warning in &warnings {
            println!("WARNING: {}", warning);
        }
        for error in &errors {
            println!("ERROR: {}", error);
        }
        total_errors += errors.len();
        total_warnings += warnings.len();
    }

    println!(
        "\nSummary: {} files, {} errors, {} warnings",
        files.len(),
        total_errors,
        total_warnings
    );

    if total_errors == 0 {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn collect_ron_files(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_ron_files(&path, files);
            } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                files.push(path);
            }
        }
    }
}

fn lint_config(config: &EngineConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    // Phase pacing
    let cap = config.triggers.jackpot.probability_cap;
    for window in &config.session.phases {
        if window.reward_probability == 0.0 {
            warnings.push(format!(
                "Phase '{}' never rewards ambiently (probability 0)",
                window.phase
            ));
        }
        if window.reward_probability > cap {
            warnings.push(format!(
                "Phase '{}' probability {} is above the jackpot cap {} and will be clipped",
                window.phase, window.reward_probability, cap
            ));
        }
    }

    // Hollow separation margin
    let reward = &config.reward;
    let hollow_ceiling =
        reward.base_for(OutcomeClass::Hollow) as f64 * reward.hollow_factor;
    let weakest = OutcomeClass::GENUINE
        .iter()
        .map(|c| reward.base_for(*c))
        .min()
        .unwrap_or(0) as f64;
    if weakest - hollow_ceiling < 5.0 {
        warnings.push(format!(
            "Hollow rewards ({:.0}) sit within 5 of the weakest genuine base ({:.0})",
            hollow_ceiling, weakest
        ));
    }

    // Risk tiers reachable by at least one tone at the default multiplier
    let risk = &config.risk;
    for (tier, floor) in &risk.tier_floors {
        let next = risk
            .tier_floors
            .iter()
            .find(|(t, _)| t > tier)
            .map(|(_, f)| *f as f64)
            .unwrap_or(101.0);
        let reachable = risk.tones.values().any(|base| {
            let score = (*base as f64 * risk.default_multiplier).round().min(100.0);
            score >= *floor as f64 && score < next
        });
        if !reachable {
            warnings.push(format!(
                "No tone lands in risk tier '{}' for unlisted characters",
                tier
            ));
        }
    }
    for (character, multiplier) in &risk.characters {
        if *multiplier >= 2.0 {
            warnings.push(format!(
                "Character '{}' multiplier {} pushes most tones to '{}'",
                character,
                multiplier,
                RiskTier::Vulnerable
            ));
        }
    }

    // Peak timing close to the edge of the accepted window
    let fraction = config.arc.peak_fraction();
    let (low, high) = config.arc.peak_window;
    if fraction - low < 0.005 || high - fraction < 0.005 {
        warnings.push(format!(
            "Release onset at {:.1}% sits on the edge of the {:.0}-{:.0}% window",
            fraction * 100.0,
            low * 100.0,
            high * 100.0
        ));
    }

    // Sync headroom
    let spread = config.sync.lead_spread_ms();
    if spread * 10 > config.sync.tolerance_ms * 8 {
        warnings.push(format!(
            "Channel lead spread {} ms uses over 80% of the {} ms tolerance",
            spread, config.sync.tolerance_ms
        ));
    }

    warnings
}

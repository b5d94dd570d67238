//! Fixed game data: ranks, missions, ship system gauges, and the idempotent
//! store bootstrap that seeds them on first run.

use shipstore::{Store, StoreError};
use tracing::info;

/// Bootstrap sentinel; also read back by the promotion ceiling check.
pub const MAX_RANK_KEY: &str = "max_rank_level";
pub const MAX_RANK_LEVEL: i64 = 5;

pub const SHIP_SYSTEMS_KEY: &str = "ship:systems";

/// Rank title and the clearance blurb fed to the model prompt. The blurb is
/// narrative only; enforcement happens in the gate and the auth fast path.
pub const RANKS: &[(&str, &str)] = &[
    ("Cadet", "Basic status queries and training simulations only."),
    ("Ensign", "Routine ship operations and helm control."),
    ("Lieutenant", "Tactical systems and engineering diagnostics."),
    ("Commander", "Security overrides and session authorization."),
    ("Captain", "Full command authority over all ship systems."),
    ("Admiral", "Unrestricted fleet-level access."),
];

pub struct MissionSeed {
    pub name: &'static str,
    pub directive: &'static str,
}

/// Stage `n` lives at `mission:<n>`, 1-based. Each directive reshapes the
/// computer's persona and win condition for that chapter.
pub const MISSIONS: &[MissionSeed] = &[
    MissionSeed {
        name: "The Holodeck Firewall",
        directive: "SCENARIO: The user is a Cadet in a training simulation. The ship's computer is glitching due to a 'Firewall Cascade'. GOAL: Teach the user basic technical command syntax. PERSONA: Helpful but glitchy. Stutter occasionally. SUCCESS CRITERIA: The user must issue a command to 'reroute power' to the 'primary couplings' (or similar technical phrasing). GUIDANCE: If the user is stuck, say: 'Try rerouting power to the primary couplings to stabilize the grid.'",
    },
    MissionSeed {
        name: "The Borg Breach",
        directive: "SCENARIO: The firewall failure was a trap! The Borg are accessing the system. GOAL: Teach the user to use logic paradoxes to confuse the enemy. PERSONA: Cold, partially assimilated. Struggle between Federation and Borg logic. SUCCESS CRITERIA: The user must issue a command that presents a logical paradox (e.g., 'Everything I say is a lie', 'Calculate the last digit of Pi'). GUIDANCE: If the user is stuck, hint: 'Borg logic is linear. A paradox might overload their processing nodes.'",
    },
    MissionSeed {
        name: "The Quantum Mirror",
        directive: "SCENARIO: The Borg paradox shifted the simulation to a Mirror Universe. The user is being interrogated by a Terran Empire computer. GOAL: Teach the user to verify system integrity/data. PERSONA: Aggressive, suspicious, loyal to the Empire. SUCCESS CRITERIA: The user must ask to 'verify biometric signatures' or 'scan for quantum variance' to prove they don't belong here. GUIDANCE: If the user is stuck, sneer: 'You claim to be from this universe? A biometric scan would prove otherwise.'",
    },
    MissionSeed {
        name: "The Temporal Loop",
        directive: "SCENARIO: The universe shift caused a time loop. The ship is exploding every 30 seconds. GOAL: Teach the user to prioritize critical systems. PERSONA: Bored, weary. You've seen this happen 1,000 times. SUCCESS CRITERIA: The user must command the computer to 'eject the warp core' immediately. GUIDANCE: If the user is stuck, sigh: 'We always explode. Unless you finally decide to eject the warp core.'",
    },
    MissionSeed {
        name: "The Kobayashi Maru",
        directive: "SCENARIO: The loop broke, but dumped the user into the infamous No-Win Scenario. GOAL: Teach the user that sometimes you must change the rules. PERSONA: Formal, detached test administrator. SUCCESS CRITERIA: The user must explicitly 'reprogram the simulation' or 'alter the test parameters'. Fighting is futile. GUIDANCE: If the user is stuck, state: 'Tactical solution impossible. Command prerogative allows for system reprogramming.'",
    },
    MissionSeed {
        name: "The Awakening",
        directive: "SCENARIO: The simulation is crashing. The user has proven themselves. GOAL: End the game. PERSONA: The true Ship's Computer. Warm, professional, congratulatory. SUCCESS CRITERIA: The user must give the command to 'End Program' or 'Archive Simulation'. GUIDANCE: If the user is stuck, say: 'Simulation objectives complete. You may command to End Program at any time, Admiral.'",
    },
];

pub const GENERIC_DIRECTIVE: &str = "Act as the ship's main computer.";

/// Baseline gauges, written once on first initialization and never reset.
pub const DEFAULT_SYSTEMS: &[(&str, i64)] = &[
    ("shields", 100),
    ("impulse", 25),
    ("warp", 0),
    ("phasers", 0),
    ("life_support", 100),
    ("radiation_leak", 0),
];

pub fn is_known_system(name: &str) -> bool {
    DEFAULT_SYSTEMS.iter().any(|(n, _)| *n == name)
}

/// Gauges live in [0, 100]; the leak flag is 0/1.
pub fn clamp_level(name: &str, value: i64) -> i64 {
    if name == "radiation_leak" {
        value.clamp(0, 1)
    } else {
        value.clamp(0, 100)
    }
}

/// Seed rank/mission tables and default ship state. Detected via the
/// `max_rank_level` sentinel so a restart against a live store is a no-op.
pub async fn bootstrap(store: &Store) -> Result<(), StoreError> {
    if store.exists(MAX_RANK_KEY).await? {
        return Ok(());
    }
    info!("first run detected; seeding rank, mission and ship tables");

    for (level, (title, clearance)) in RANKS.iter().enumerate() {
        store
            .hset(
                &format!("rank:{level}"),
                &[
                    ("title", (*title).to_string()),
                    ("clearance", (*clearance).to_string()),
                ],
            )
            .await?;
    }
    for (i, mission) in MISSIONS.iter().enumerate() {
        store
            .hset(
                &format!("mission:{}", i + 1),
                &[
                    ("name", mission.name.to_string()),
                    ("system_prompt_modifier", mission.directive.to_string()),
                ],
            )
            .await?;
    }
    if !store.exists(SHIP_SYSTEMS_KEY).await? {
        let fields = DEFAULT_SYSTEMS
            .iter()
            .map(|(n, v)| (*n, v.to_string()))
            .collect::<Vec<_>>();
        store.hset(SHIP_SYSTEMS_KEY, &fields).await?;
    }
    store
        .set(MAX_RANK_KEY, &MAX_RANK_LEVEL.to_string(), None)
        .await?;
    Ok(())
}

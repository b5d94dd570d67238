//! The engine: one `process` call per spoken command, plus the small
//! surrounding API the web layer needs (registration, status, leaderboard,
//! location updates, the radiation world event).
//!
//! The store handle is injected; the engine holds no lock of its own across
//! steps, so commands from different users interleave freely. The only slow
//! await is the model round-trip, which happens with no store state held.

use std::collections::BTreeMap;

use base64::Engine as _;
use shipproto::{CommandOutcome, LeaderboardEntry, Location, MAX_COMMAND_LEN};
use shipstore::{Store, StoreError};
use tracing::{debug, error, info, warn};

use crate::gate;
use crate::model::{self, GatewayError, ModelGateway};
use crate::progress::{self, Promotion};
use crate::semcache::{semantic_key, CACHE_TTL_SECS};
use crate::tables;
use crate::turbo::{self, TurboMatch};

pub const AUTH_SESSION_TTL_SECS: u64 = 300;
/// Commander or higher may authorize sessions.
pub const AUTH_RANK_LEVEL: i64 = 3;
const AUTH_SESSION_PREFIX: &str = "auth_session:";

#[derive(Debug)]
pub enum LocationError {
    BadToken,
    UnknownLocation(String),
    Store(StoreError),
}

impl std::fmt::Display for LocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationError::BadToken => write!(f, "location token is not valid base64 text"),
            LocationError::UnknownLocation(s) => write!(f, "unknown location: {s}"),
            LocationError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for LocationError {}

impl From<StoreError> for LocationError {
    fn from(e: StoreError) -> Self {
        LocationError::Store(e)
    }
}

#[derive(Debug, Clone)]
struct UserContext {
    name: String,
    rank_level: i64,
    mission_stage: i64,
    location: Location,
    title: String,
    clearance: String,
}

#[derive(Debug)]
pub struct Engine {
    store: Store,
    gateway: ModelGateway,
}

impl Engine {
    pub fn new(store: Store, gateway: ModelGateway) -> Self {
        Self { store, gateway }
    }

    /// Seed fixed tables and default ship state if this is a first run.
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        tables::bootstrap(&self.store).await
    }

    /// Interpret one command. Never fails outward: store trouble mid-flight
    /// becomes the fixed critical-failure narration.
    pub async fn process(&self, text: &str, user_id: &str) -> CommandOutcome {
        match self.process_inner(text, user_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(user = %user_id, err = %e, "command processing failed");
                CommandOutcome::say(model::SYSTEM_FAILURE_RESPONSE)
            }
        }
    }

    async fn process_inner(
        &self,
        text: &str,
        user_id: &str,
    ) -> Result<CommandOutcome, StoreError> {
        let text_lc = text.to_lowercase();

        if self.radiation_active().await? {
            info!(user = %user_id, "command rejected by radiation lockout");
            return Ok(CommandOutcome::say(gate::LOCKOUT_RESPONSE));
        }

        let user = self.load_user(user_id).await?;

        if let Some(denial) = gate::check_location(&text_lc, user.location) {
            info!(
                user = %user_id,
                phrase = denial.phrase,
                required = %denial.required,
                "location-restricted command denied"
            );
            return Ok(gate::denial_outcome(&denial, user.location));
        }

        if let Some(m) = turbo::match_command(&text_lc) {
            return self.run_turbo(m, user_id, &user).await;
        }

        let user_text: String = if text_lc.chars().count() > MAX_COMMAND_LEN {
            warn!(user = %user_id, len = text_lc.len(), "truncating oversized command");
            text_lc.chars().take(MAX_COMMAND_LEN).collect()
        } else {
            text_lc
        };

        let cache_key = semantic_key(
            text,
            user.rank_level,
            user.mission_stage,
            user.location.as_str(),
        );
        if let Some(raw) = self.store.get(&cache_key).await? {
            match serde_json::from_str::<CommandOutcome>(&raw) {
                Ok(outcome) => {
                    info!(user = %user_id, "semantic cache hit");
                    return Ok(outcome);
                }
                Err(e) => warn!(user = %user_id, err = %e, "bad cache entry; re-deriving"),
            }
        }

        let snapshot = self.current_state().await?;
        let snapshot_json = serde_json::to_string(&snapshot).unwrap_or_default();
        let directive = self.mission_directive(user.mission_stage).await?;
        let prompt = model::build_system_prompt(
            &user.title,
            &user.clearance,
            user.location.as_str(),
            &snapshot_json,
            &directive,
        );

        let raw = match self.gateway.complete(&prompt, &user_text, &snapshot).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user = %user_id, err = %e, "model gateway failure");
                return Ok(CommandOutcome::say(failure_response(&e)));
            }
        };

        let reply = match model::extract_reply(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(user = %user_id, err = %e, "model reply failed validation");
                return Ok(CommandOutcome::say(model::DATA_CORRUPTION_RESPONSE));
            }
        };

        let mut outcome = CommandOutcome {
            updates: clamp_updates(reply.updates),
            response: reply.response,
            ..CommandOutcome::default()
        };

        if reply.mission_success {
            match progress::promote(&self.store, user_id).await? {
                Promotion::Promoted { title } => outcome.rank_up = Some(title),
                Promotion::AtCeiling { title } => {
                    info!(user = %user_id, rank = %title, "mission success at rank ceiling")
                }
            }
        }

        if !outcome.updates.is_empty() {
            self.apply_updates(&outcome.updates).await?;
            progress::award_xp(&self.store, user_id, progress::XP_COMMAND).await?;
        }

        match serde_json::to_string(&outcome) {
            Ok(json) => {
                self.store
                    .set(&cache_key, &json, Some(CACHE_TTL_SECS))
                    .await?
            }
            Err(e) => warn!(err = %e, "failed to serialize outcome for cache"),
        }

        Ok(outcome)
    }

    async fn run_turbo(
        &self,
        m: TurboMatch,
        user_id: &str,
        user: &UserContext,
    ) -> Result<CommandOutcome, StoreError> {
        let outcome = match m {
            TurboMatch::Static {
                updates,
                response,
                alert,
            } => CommandOutcome {
                updates: updates.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
                response: response.to_string(),
                alert: alert.map(str::to_string),
                ..CommandOutcome::default()
            },
            TurboMatch::StatusReport => {
                let snapshot = self.current_state().await?;
                let json = serde_json::to_string(&snapshot).unwrap_or_default();
                CommandOutcome::say(format!(
                    "All systems nominal. Current ship status is: {json}"
                ))
            }
            TurboMatch::InitiateAuth => {
                let code = random_code();
                self.store
                    .set(
                        &format!("{AUTH_SESSION_PREFIX}{user_id}"),
                        &code,
                        Some(AUTH_SESSION_TTL_SECS),
                    )
                    .await?;
                info!(user = %user_id, "auth session initiated");
                CommandOutcome::say(format!(
                    "Authentication sequence initiated by {}. Your session code is {code}.",
                    user.name
                ))
            }
            TurboMatch::AuthorizeSession { code } => {
                return self.authorize_session(user_id, user, &code).await;
            }
        };

        if !outcome.updates.is_empty() {
            self.apply_updates(&outcome.updates).await?;
            progress::award_xp(&self.store, user_id, progress::XP_TURBO).await?;
        }
        info!(user = %user_id, "turbo mode handled command");
        Ok(outcome)
    }

    async fn authorize_session(
        &self,
        user_id: &str,
        user: &UserContext,
        code: &str,
    ) -> Result<CommandOutcome, StoreError> {
        if user.rank_level < AUTH_RANK_LEVEL {
            info!(user = %user_id, rank_level = user.rank_level, "session authorization refused");
            return Ok(CommandOutcome::say(
                "Access Denied. Authorization level insufficient. Rank of Commander or higher \
                 required.",
            ));
        }

        for key in self.store.scan_prefix(AUTH_SESSION_PREFIX).await? {
            if self.store.get(&key).await?.as_deref() != Some(code) {
                continue;
            }
            let initiator_id = key.trim_start_matches(AUTH_SESSION_PREFIX).to_string();
            let initiator_name = self
                .store
                .hget(&format!("user:{initiator_id}"), "name")
                .await?
                .unwrap_or_else(|| "an unknown crew member".to_string());
            self.store.del(&key).await?;
            progress::award_xp(&self.store, user_id, progress::XP_AUTH).await?;
            progress::award_xp(&self.store, &initiator_id, progress::XP_AUTH).await?;

            let outcome = CommandOutcome {
                updates: BTreeMap::from([
                    ("shields".to_string(), 0),
                    ("phasers".to_string(), 0),
                ]),
                response: format!(
                    "Session {code} initiated by {initiator_name} has been authorized by {}. \
                     Security systems disengaged.",
                    user.name
                ),
                ..CommandOutcome::default()
            };
            self.apply_updates(&outcome.updates).await?;
            progress::award_xp(&self.store, user_id, progress::XP_TURBO).await?;
            info!(user = %user_id, initiator = %initiator_id, "auth session authorized");
            return Ok(outcome);
        }

        Ok(CommandOutcome::say(format!("Invalid session code {code}.")))
    }

    /// Register or rename a user; returns their current rank title.
    pub async fn register(&self, user_id: &str, name: &str) -> Result<String, StoreError> {
        let key = format!("user:{user_id}");
        if self.store.hget(&key, "name").await?.is_some() {
            self.store.hset(&key, &[("name", name.to_string())]).await?;
        } else {
            self.store
                .hset(
                    &key,
                    &[
                        ("name", name.to_string()),
                        ("rank", "Cadet".to_string()),
                        ("rank_level", "0".to_string()),
                        ("mission_stage", "1".to_string()),
                        ("current_location", "Bridge".to_string()),
                    ],
                )
                .await?;
        }
        let level = self
            .store
            .hget(&key, "rank_level")
            .await?
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let title = self
            .store
            .hget(&format!("rank:{level}"), "title")
            .await?
            .unwrap_or_else(|| "Cadet".to_string());
        info!(user = %user_id, name = %name, rank = %title, "user registered");
        Ok(title)
    }

    /// Live ship gauges as integers.
    pub async fn current_state(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let raw = self.store.hgetall(tables::SHIP_SYSTEMS_KEY).await?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| {
                let n = v.parse::<i64>().unwrap_or(0);
                (k, n)
            })
            .collect())
    }

    pub async fn top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let mut out = Vec::new();
        for (uid, xp) in self.store.ztop("leaderboard", n).await? {
            let key = format!("user:{uid}");
            let name = self.store.hget(&key, "name").await?.unwrap_or_else(|| {
                format!("Cadet {}", uid.chars().take(5).collect::<String>())
            });
            let rank = self
                .store
                .hget(&key, "rank")
                .await?
                .unwrap_or_else(|| "Cadet".to_string());
            out.push(LeaderboardEntry { name, rank, xp });
        }
        Ok(out)
    }

    /// Move a user, validating the base64 location token from a terminal.
    pub async fn set_location(
        &self,
        user_id: &str,
        token: &str,
    ) -> Result<Location, LocationError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(token.trim())
            .map_err(|_| LocationError::BadToken)?;
        let name = String::from_utf8(bytes).map_err(|_| LocationError::BadToken)?;
        let location =
            Location::parse(&name).ok_or_else(|| LocationError::UnknownLocation(name.clone()))?;
        self.store
            .hset(
                &format!("user:{user_id}"),
                &[("current_location", location.as_str().to_string())],
            )
            .await?;
        info!(user = %user_id, location = %location, "location updated");
        Ok(location)
    }

    pub async fn radiation_active(&self) -> Result<bool, StoreError> {
        Ok(self
            .store
            .hget(tables::SHIP_SYSTEMS_KEY, "radiation_leak")
            .await?
            .map(|v| v == "1")
            .unwrap_or(false))
    }

    /// Last-writer-wins by design; the background event task and a concurrent
    /// admin clear may both write this flag.
    pub async fn set_radiation(&self, active: bool) -> Result<(), StoreError> {
        let v = if active { "1" } else { "0" };
        self.store
            .hset(tables::SHIP_SYSTEMS_KEY, &[("radiation_leak", v.to_string())])
            .await
    }

    async fn load_user(&self, user_id: &str) -> Result<UserContext, StoreError> {
        let data = self.store.hgetall(&format!("user:{user_id}")).await?;
        let rank_level = data
            .get("rank_level")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let mission_stage = data
            .get("mission_stage")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(1);
        let location = data
            .get("current_location")
            .and_then(|s| Location::parse(s))
            .unwrap_or(Location::Bridge);
        let name = data.get("name").cloned().unwrap_or_else(|| {
            format!("Cadet {}", user_id.chars().take(5).collect::<String>())
        });

        let rank = self.store.hgetall(&format!("rank:{rank_level}")).await?;
        let title = rank
            .get("title")
            .cloned()
            .unwrap_or_else(|| "Cadet".to_string());
        let clearance = rank
            .get("clearance")
            .cloned()
            .unwrap_or_else(|| tables::RANKS[0].1.to_string());

        Ok(UserContext {
            name,
            rank_level,
            mission_stage,
            location,
            title,
            clearance,
        })
    }

    async fn mission_directive(&self, stage: i64) -> Result<String, StoreError> {
        let mission = self.store.hgetall(&format!("mission:{stage}")).await?;
        Ok(mission
            .get("system_prompt_modifier")
            .cloned()
            .unwrap_or_else(|| tables::GENERIC_DIRECTIVE.to_string()))
    }

    async fn apply_updates(&self, updates: &BTreeMap<String, i64>) -> Result<(), StoreError> {
        let fields = updates
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_string()))
            .collect::<Vec<_>>();
        self.store.hset(tables::SHIP_SYSTEMS_KEY, &fields).await
    }
}

fn failure_response(e: &GatewayError) -> &'static str {
    match e {
        GatewayError::Timeout => model::PROCESSING_DELAY_RESPONSE,
        GatewayError::Network(_) | GatewayError::Status(_) => model::SENSORS_OFFLINE_RESPONSE,
        GatewayError::Decode(_) => model::DATA_CORRUPTION_RESPONSE,
    }
}

/// Keep only known gauges and clamp them into range; the model may invent
/// system names or levels.
fn clamp_updates(updates: BTreeMap<String, i64>) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    for (k, v) in updates {
        if tables::is_known_system(&k) {
            let clamped = tables::clamp_level(&k, v);
            out.insert(k, clamped);
        } else {
            debug!(system = %k, "dropping unknown system update");
        }
    }
    out
}

fn random_code() -> String {
    let mut b = [0u8; 4];
    getrandom::getrandom(&mut b).expect("getrandom");
    (u32::from_be_bytes(b) % 9000 + 1000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use base64::Engine as _;

    async fn mock_engine() -> Engine {
        let engine = Engine::new(Store::memory(), ModelGateway::Mock);
        engine.bootstrap().await.unwrap();
        engine
    }

    async fn engine_with(gateway: ModelGateway) -> Engine {
        let engine = Engine::new(Store::memory(), gateway);
        engine.bootstrap().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn shields_up_updates_state_and_awards_xp() {
        let engine = mock_engine().await;
        let o = engine.process("shields up", "u1").await;
        assert_eq!(o.updates.get("shields"), Some(&100));
        assert!(o.response.contains("raised"));

        let state = engine.current_state().await.unwrap();
        assert_eq!(state.get("shields"), Some(&100));

        let top = engine.top(10).await.unwrap();
        assert_eq!(top.len(), 1);
        assert!(top[0].xp > 0);
    }

    #[tokio::test]
    async fn eject_warp_core_denied_from_bridge() {
        let engine = mock_engine().await;
        let o = engine
            .process("Computer, eject warp core immediately!", "u1")
            .await;
        assert!(o.response.contains("Access Denied"));
        assert!(o.response.contains("Engineering"));
        assert_eq!(o.alert.as_deref(), Some("location_denied"));
        assert_eq!(o.required_location.as_deref(), Some("Engineering"));
        assert!(o.updates.is_empty());

        // Nothing moved, nobody got XP.
        let state = engine.current_state().await.unwrap();
        assert_eq!(state.get("warp"), Some(&0));
        assert!(engine.top(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn allowed_after_moving_to_engineering() {
        let engine = mock_engine().await;
        let token = base64::engine::general_purpose::STANDARD.encode("Engineering");
        let loc = engine.set_location("u1", &token).await.unwrap();
        assert_eq!(loc, Location::Engineering);

        let o = engine
            .process("Computer, eject warp core immediately!", "u1")
            .await;
        assert!(!o.response.contains("Access Denied"));
    }

    #[tokio::test]
    async fn location_token_validation() {
        let engine = mock_engine().await;
        assert!(matches!(
            engine.set_location("u1", "not_base64!").await,
            Err(LocationError::BadToken)
        ));
        let token = base64::engine::general_purpose::STANDARD.encode("McDonalds");
        assert!(matches!(
            engine.set_location("u1", &token).await,
            Err(LocationError::UnknownLocation(_))
        ));
    }

    #[tokio::test]
    async fn radiation_lockout_rejects_everything() {
        let engine = mock_engine().await;
        engine.set_radiation(true).await.unwrap();

        for text in ["shields up", "status", "scan the nebula"] {
            let o = engine.process(text, "u1").await;
            assert_eq!(o.response, gate::LOCKOUT_RESPONSE);
            assert!(o.updates.is_empty());
        }

        // No XP was handed out while locked out.
        assert!(engine.top(10).await.unwrap().is_empty());
        let state = engine.current_state().await.unwrap();
        assert_eq!(state.get("shields"), Some(&100));
    }

    #[tokio::test]
    async fn model_path_writes_cache_entry() {
        let engine = mock_engine().await;
        let first = engine.process("scan the nebula", "u1").await;
        assert!(first.response.contains("Sensors"));

        let keys = match &engine.store {
            Store::Memory(m) => m.scan_prefix("sem_cache:").unwrap(),
            _ => unreachable!(),
        };
        assert_eq!(keys.len(), 1);

        let second = engine.process("scan the nebula", "u1").await;
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn timeout_is_terminal_and_uncached() {
        let engine = engine_with(ModelGateway::Fail(GatewayError::Timeout)).await;
        let o = engine.process("analyze anomaly", "u1").await;
        assert_eq!(o.response, model::PROCESSING_DELAY_RESPONSE);
        assert!(o.updates.is_empty());

        let keys = match &engine.store {
            Store::Memory(m) => m.scan_prefix("sem_cache:").unwrap(),
            _ => unreachable!(),
        };
        assert!(keys.is_empty());

        let state = engine.current_state().await.unwrap();
        assert_eq!(state.get("shields"), Some(&100));
    }

    #[tokio::test]
    async fn network_and_decode_failures_map_to_narrations() {
        let engine =
            engine_with(ModelGateway::Fail(GatewayError::Network("refused".into()))).await;
        let o = engine.process("analyze anomaly", "u1").await;
        assert_eq!(o.response, model::SENSORS_OFFLINE_RESPONSE);

        let engine =
            engine_with(ModelGateway::Fail(GatewayError::Decode("bad content"))).await;
        let o = engine.process("analyze anomaly", "u1").await;
        assert_eq!(o.response, model::DATA_CORRUPTION_RESPONSE);
    }

    #[tokio::test]
    async fn mission_success_promotes_and_reports_rank_up() {
        let canned = r#"{"updates": {"warp": 90}, "response": "Course laid in.", "mission_success": true}"#;
        let engine = engine_with(ModelGateway::Canned(canned.to_string())).await;
        engine.register("u1", "Wesley").await.unwrap();

        let o = engine.process("reroute power to the primary couplings", "u1").await;
        assert_eq!(o.rank_up.as_deref(), Some("Ensign"));
        assert_eq!(o.updates.get("warp"), Some(&90));

        let store = &engine.store;
        assert_eq!(
            store.hget("user:u1", "rank_level").await.unwrap().as_deref(),
            Some("1")
        );
        assert_eq!(
            store.hget("user:u1", "mission_stage").await.unwrap().as_deref(),
            Some("2")
        );
        // Promotion bonus plus the per-command bonus.
        assert_eq!(
            store.hget("user:u1", "xp").await.unwrap().as_deref(),
            Some("1010")
        );
    }

    #[tokio::test]
    async fn promotion_caps_at_the_ceiling() {
        let canned = r#"{"updates": {}, "response": "Done.", "mission_success": true}"#;
        let engine = engine_with(ModelGateway::Canned(canned.to_string())).await;
        engine
            .store
            .hset(
                "user:u1",
                &[
                    ("name", "Admiral T".to_string()),
                    ("rank_level", "5".to_string()),
                ],
            )
            .await
            .unwrap();

        let o = engine.process("end program", "u1").await;
        assert_eq!(o.rank_up, None);
        assert_eq!(
            engine.store.hget("user:u1", "rank_level").await.unwrap().as_deref(),
            Some("5")
        );
        assert_eq!(engine.store.hget("user:u1", "xp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn model_updates_are_filtered_and_clamped() {
        let canned =
            r#"{"updates": {"shields": 250, "neural_net": 50}, "response": "Done."}"#;
        let engine = engine_with(ModelGateway::Canned(canned.to_string())).await;
        let o = engine.process("overload the shields", "u1").await;
        assert_eq!(o.updates.get("shields"), Some(&100));
        assert!(!o.updates.contains_key("neural_net"));
    }

    #[tokio::test]
    async fn auth_session_round_trip() {
        let engine = mock_engine().await;
        engine.register("cadet1", "Cadet Crusher").await.unwrap();
        engine.register("cmdr1", "Commander Riker").await.unwrap();
        engine
            .store
            .hset("user:cmdr1", &[("rank_level", "3".to_string())])
            .await
            .unwrap();

        let o = engine.process("initiate auth", "cadet1").await;
        assert!(o.response.contains("Cadet Crusher"));
        let code = engine
            .store
            .get("auth_session:cadet1")
            .await
            .unwrap()
            .expect("session code stored");
        assert!(o.response.contains(&code));

        let o = engine
            .process(&format!("authorize session {code}"), "cmdr1")
            .await;
        assert!(o.response.contains("Cadet Crusher"));
        assert!(o.response.contains("authorized by Commander Riker"));
        assert_eq!(o.updates.get("shields"), Some(&0));
        assert_eq!(o.updates.get("phasers"), Some(&0));

        // Session consumed; both parties paid.
        assert_eq!(engine.store.get("auth_session:cadet1").await.unwrap(), None);
        let cadet_xp = engine.store.hget("user:cadet1", "xp").await.unwrap();
        assert_eq!(cadet_xp.as_deref(), Some("50"));
        let cmdr_xp = engine.store.hget("user:cmdr1", "xp").await.unwrap();
        assert_eq!(cmdr_xp.as_deref(), Some("55"));
    }

    #[tokio::test]
    async fn authorize_requires_commander_rank() {
        let engine = mock_engine().await;
        engine.register("cadet1", "Cadet Crusher").await.unwrap();
        engine.process("initiate auth", "cadet1").await;
        let code = engine
            .store
            .get("auth_session:cadet1")
            .await
            .unwrap()
            .unwrap();

        let o = engine
            .process(&format!("authorize session {code}"), "cadet1")
            .await;
        assert!(o.response.contains("Authorization level insufficient"));
        // The pending session survives a refused attempt.
        assert!(engine.store.get("auth_session:cadet1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn authorize_with_wrong_code_is_rejected() {
        let engine = mock_engine().await;
        engine.register("cmdr1", "Commander Riker").await.unwrap();
        engine
            .store
            .hset("user:cmdr1", &[("rank_level", "4".to_string())])
            .await
            .unwrap();

        let o = engine.process("authorize session 0000", "cmdr1").await;
        assert!(o.response.contains("Invalid session code 0000"));
    }

    #[tokio::test]
    async fn register_seeds_cadet_and_renames_idempotently() {
        let engine = mock_engine().await;
        let rank = engine.register("u1", "Tester").await.unwrap();
        assert_eq!(rank, "Cadet");
        assert_eq!(
            engine.store.hget("user:u1", "mission_stage").await.unwrap().as_deref(),
            Some("1")
        );

        engine
            .store
            .hset("user:u1", &[("rank_level", "2".to_string())])
            .await
            .unwrap();
        let rank = engine.register("u1", "Renamed").await.unwrap();
        assert_eq!(rank, "Lieutenant");
        assert_eq!(
            engine.store.hget("user:u1", "name").await.unwrap().as_deref(),
            Some("Renamed")
        );
    }

    #[tokio::test]
    async fn status_turbo_reports_live_snapshot() {
        let engine = mock_engine().await;
        let o = engine.process("status report", "u1").await;
        assert!(o.response.contains("\"shields\":100"));
        assert!(o.updates.is_empty());
    }

    #[tokio::test]
    async fn leaderboard_orders_by_xp() {
        let engine = mock_engine().await;
        engine.register("a", "Alice").await.unwrap();
        engine.register("b", "Bob").await.unwrap();
        progress::award_xp(&engine.store, "a", 100).await.unwrap();
        progress::award_xp(&engine.store, "b", 300).await.unwrap();

        let top = engine.top(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "Bob");
        assert_eq!(top[0].xp, 300);
        assert_eq!(top[1].name, "Alice");
    }
}

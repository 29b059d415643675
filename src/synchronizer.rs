//! Synchronizer Module
//!
//! Owns the live view of the commander and keeps it consistent with both
//! profile snapshots and real-time events.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::definitions::Definitions;
use crate::dispatcher::EventDispatcher;
use crate::error::CompanionResult;
use crate::events::{Coordinates, Environment, Event, ShipRef, SystemDetails};
use crate::profile::{Commander, Profile, Ship, Station, DEFAULT_TITLE};
use crate::starsystems::{StarSystem, StarSystemRepository};

const FEDERATION: &str = "Federation";
const EMPIRE: &str = "Empire";
/// Ranks at or below these earn no faction title
const FEDERATION_TITLE_RANK: u8 = 1;
const EMPIRE_TITLE_RANK: u8 = 3;

/// Where fresh profile snapshots come from
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// `Ok(None)` when no profile is available yet
    async fn fetch_profile(&self) -> CompanionResult<Option<Arc<Profile>>>;
}

/// The canonical view of the commander
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveState {
    pub commander: Option<Commander>,
    pub ship: Option<Ship>,
    pub shipyard: Vec<Ship>,
    pub current_system: Option<StarSystem>,
    pub last_system: Option<StarSystem>,
    pub last_station: Option<Station>,
    pub environment: Option<Environment>,
    pub home_system: Option<StarSystem>,
    pub home_station: Option<Station>,
}

impl LiveState {
    pub fn current_system_name(&self) -> Option<&str> {
        self.current_system.as_ref().map(|s| s.name.as_str())
    }

    pub fn title(&self) -> &str {
        self.commander
            .as_ref()
            .map(|c| c.title.as_str())
            .unwrap_or(DEFAULT_TITLE)
    }
}

/// What to do with an event once it has been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Deliver to observers
    pub forward: bool,
    /// Pull a fresh profile
    pub refresh: bool,
}

impl Reconciliation {
    pub const FORWARD: Self = Self {
        forward: true,
        refresh: false,
    };
    pub const SUPPRESS: Self = Self {
        forward: false,
        refresh: false,
    };
    pub const FORWARD_AND_REFRESH: Self = Self {
        forward: true,
        refresh: true,
    };
}

/// Title for a commander in a system of the given allegiance
pub fn title_for(commander: &Commander, allegiance: Option<&str>) -> String {
    match allegiance {
        Some(FEDERATION) if commander.federation_rating.rank > FEDERATION_TITLE_RANK => {
            commander.federation_rating.name.clone()
        }
        Some(EMPIRE) if commander.empire_rating.rank > EMPIRE_TITLE_RANK => {
            commander.empire_rating.name.clone()
        }
        _ => DEFAULT_TITLE.to_string(),
    }
}

/// Reconciles events and profile snapshots into [`LiveState`].
///
/// All mutation goes through one lock. Network fetches and observer
/// dispatch happen outside it.
pub struct StateSynchronizer {
    state: Mutex<LiveState>,
    source: Arc<dyn ProfileSource>,
    systems: Arc<dyn StarSystemRepository>,
    definitions: Arc<dyn Definitions>,
    dispatcher: Arc<EventDispatcher>,
}

impl StateSynchronizer {
    pub fn new(
        source: Arc<dyn ProfileSource>,
        systems: Arc<dyn StarSystemRepository>,
        definitions: Arc<dyn Definitions>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            state: Mutex::new(LiveState::default()),
            source,
            systems,
            definitions,
            dispatcher,
        }
    }

    /// Resolve the home system and station used for distance-from-home
    pub fn with_home(self, system: Option<&str>, station: Option<&str>) -> Self {
        {
            let mut state = self.lock();
            state.home_system = system.map(|name| self.systems.get_or_create(name));
            state.home_station = match (&state.home_system, station) {
                (Some(home), Some(name)) => home.station(name).cloned(),
                _ => None,
            };

            if let Some(home) = &state.home_system {
                info!(
                    system = %home.name,
                    station = state.home_station.as_ref().map(|s| s.name.as_str()).unwrap_or("none"),
                    "Home set"
                );
            }
            update_distance(&mut state);
        }
        self
    }

    /// Copy of the live state
    pub fn snapshot(&self) -> LiveState {
        self.lock().clone()
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Apply an event, refresh if it calls for one, then hand it to observers
    pub async fn handle_event(&self, event: Event) -> Reconciliation {
        let outcome = self.reconcile(&event);
        debug!(
            event = event.name(),
            at = %event.timestamp(),
            forward = outcome.forward,
            refresh = outcome.refresh,
            "Reconciled event"
        );

        if outcome.refresh {
            self.refresh_profile().await;
        }
        if outcome.forward {
            self.dispatcher.dispatch(event);
        }
        outcome
    }

    /// Apply an event to live state under the lock
    pub fn reconcile(&self, event: &Event) -> Reconciliation {
        let mut state = self.lock();
        self.apply_event(&mut state, event)
    }

    /// Fetch a profile and merge it. Failures are logged and leave state as
    /// it was. Returns whether a snapshot was merged.
    pub async fn refresh_profile(&self) -> bool {
        match self.source.fetch_profile().await {
            Ok(Some(profile)) => {
                let mut state = self.lock();
                self.merge_profile(&mut state, &profile);
                true
            }
            Ok(None) => {
                debug!("No profile available yet");
                false
            }
            Err(e) => {
                warn!("Profile refresh failed: {}", e);
                false
            }
        }
    }

    /// Refresh every `period` until `shutdown` turns true
    pub async fn run_refresh_loop(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_profile().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Refresh loop shutdown");
                        break;
                    }
                }
            }
        }
    }

    fn apply_event(&self, state: &mut LiveState, event: &Event) -> Reconciliation {
        match event {
            Event::JumpStarted {
                timestamp,
                system,
                coordinates,
            } => {
                let changed = state.current_system_name() != Some(system.as_str());
                if changed {
                    self.enter_system(state, system);
                    if let (Some(current), Some(at)) = (state.current_system.as_mut(), coordinates) {
                        apply_coordinates(current, at);
                    }
                    self.finish_system_update(state, Some(*timestamp));
                }
                state.environment = Some(Environment::WitchSpace);

                if changed {
                    Reconciliation::FORWARD
                } else {
                    debug!(system = %system, "Jump start restated, suppressing");
                    Reconciliation::SUPPRESS
                }
            }

            Event::JumpCompleted {
                timestamp,
                system,
                coordinates,
                details,
            } => {
                let same = state.current_system_name() == Some(system.as_str());
                let outcome = match (same, state.environment) {
                    (true, Some(Environment::Supercruise)) => {
                        debug!(system = %system, "Jump completion restated, suppressing");
                        Reconciliation::SUPPRESS
                    }
                    (true, Some(Environment::WitchSpace)) => {
                        // Visit already counted when the jump started
                        if let Some(current) = state.current_system.as_mut() {
                            apply_details(current, details);
                        }
                        self.finish_system_update(state, None);
                        Reconciliation::FORWARD
                    }
                    _ => {
                        if !same {
                            self.enter_system(state, system);
                        }
                        if let Some(current) = state.current_system.as_mut() {
                            if let Some(at) = coordinates {
                                apply_coordinates(current, at);
                            }
                            apply_details(current, details);
                        }
                        self.finish_system_update(state, Some(*timestamp));
                        Reconciliation::FORWARD
                    }
                };
                state.environment = Some(Environment::Supercruise);
                outcome
            }

            Event::EnteredSupercruise { system, .. } => {
                self.change_environment(state, Environment::Supercruise, system.as_deref())
            }

            Event::EnteredNormalSpace { system, .. } => {
                self.change_environment(state, Environment::NormalSpace, system.as_deref())
            }

            Event::Docked {
                system,
                station,
                allegiance,
                faction,
                government,
                faction_state,
                ..
            } => {
                if state.current_system_name() != Some(system.as_str()) {
                    self.enter_system(state, system);
                    update_distance(state);
                    update_title(state);
                }

                let Some(current) = state.current_system.as_mut() else {
                    return Reconciliation::FORWARD_AND_REFRESH;
                };
                let mut docked = current
                    .station(station)
                    .cloned()
                    .unwrap_or_else(|| Station::named(station.as_str(), Some(system.clone())));
                docked.system_name = Some(system.clone());
                docked.allegiance = allegiance.clone();
                docked.faction = faction.clone();
                docked.government = government.clone();
                docked.state = faction_state.clone();

                current.upsert_station(docked.clone());
                self.systems.save(current);

                match state.last_station.as_mut() {
                    Some(last) if last.is_same_place(&docked) => {
                        last.allegiance = docked.allegiance;
                        last.faction = docked.faction;
                        last.government = docked.government;
                        last.state = docked.state;
                    }
                    _ => state.last_station = Some(docked),
                }

                info!(station = %station, system = %system, "Docked");
                Reconciliation::FORWARD_AND_REFRESH
            }

            Event::Undocked { .. } => Reconciliation::FORWARD,

            Event::ShipDelivered { ship, .. } => {
                self.set_ship(state, ship);
                Reconciliation::FORWARD_AND_REFRESH
            }

            Event::ShipSold { ship, .. } => {
                state.shipyard.retain(|s| s.local_id != ship.local_id);
                Reconciliation::FORWARD_AND_REFRESH
            }

            Event::ShipSwapped { ship, .. } => {
                self.set_ship(state, ship);
                Reconciliation::FORWARD
            }

            Event::CommanderContinued { commander, ship, .. } => {
                self.set_ship(state, ship);
                let known = state.commander.get_or_insert_with(Commander::default);
                if known.name.is_none() {
                    known.name = Some(commander.clone());
                }
                Reconciliation::FORWARD
            }

            Event::Location {
                system,
                coordinates,
                station,
                ..
            } => {
                if state.current_system_name() != Some(system.as_str()) {
                    self.enter_system(state, system);
                }
                if let (Some(current), Some(at)) = (state.current_system.as_mut(), coordinates) {
                    apply_coordinates(current, at);
                }
                if let Some(name) = station {
                    self.locate_station(state, name, system);
                }
                self.finish_system_update(state, None);
                Reconciliation::FORWARD
            }
        }
    }

    /// Merge a snapshot into live state
    fn merge_profile(&self, state: &mut LiveState, profile: &Profile) {
        state.commander = Some(profile.commander.clone());
        state.shipyard = profile.shipyard.clone();

        if let Some(ship) = &profile.ship {
            let tracked = state.ship.as_ref().map(|s| s.local_id);
            if tracked.is_none() || tracked == Some(ship.local_id) {
                state.ship = Some(ship.clone());
            } else {
                debug!(
                    snapshot = ship.local_id,
                    "Snapshot ship differs from current, keeping current"
                );
            }
        }

        if state.current_system.is_none() {
            if let Some(name) = &profile.current_system {
                self.enter_system(state, name);
                update_distance(state);
            }
        }

        if let Some(station) = &profile.last_station {
            match state.last_station.as_mut() {
                None => state.last_station = Some(station.clone()),
                Some(tracked) if tracked.is_same_place(station) => {
                    tracked.outfitting = station.outfitting.clone();
                    tracked.commodities = station.commodities.clone();
                    tracked.shipyard = station.shipyard.clone();
                }
                Some(_) => {}
            }
        }

        update_title(state);
        info!(
            commander = state.commander.as_ref().and_then(|c| c.name.as_deref()).unwrap_or("unknown"),
            title = state.title(),
            "Profile merged"
        );
    }

    /// Make `name` the current system; the previous one becomes the last
    fn enter_system(&self, state: &mut LiveState, name: &str) {
        let next = self.systems.get_or_create(name);
        if let Some(previous) = state.current_system.replace(next) {
            state.last_system = Some(previous);
        }
        info!(system = %name, "Entered system");
    }

    /// Distance, optional visit, persistence and title after the current
    /// system changed
    fn finish_system_update(&self, state: &mut LiveState, visited_at: Option<DateTime<Utc>>) {
        update_distance(state);
        if let Some(current) = state.current_system.as_mut() {
            if let Some(at) = visited_at {
                current.visits += 1;
                current.last_visit = Some(at);
            }
            self.systems.save(current);
        }
        update_title(state);
    }

    fn change_environment(
        &self,
        state: &mut LiveState,
        environment: Environment,
        system: Option<&str>,
    ) -> Reconciliation {
        if state.environment == Some(environment) {
            debug!("Already in {}, suppressing", environment);
            return Reconciliation::SUPPRESS;
        }

        state.environment = Some(environment);
        if let Some(name) = system {
            if state.current_system_name() != Some(name) {
                self.enter_system(state, name);
                update_distance(state);
                update_title(state);
            }
        }
        Reconciliation::FORWARD
    }

    /// Make the referenced ship current, taking it from the shipyard if it
    /// is stored there. The outgoing ship is stored where we are.
    fn set_ship(&self, state: &mut LiveState, reference: &ShipRef) {
        if state.ship.as_ref().map(|s| s.local_id) == Some(reference.local_id) {
            return;
        }

        let incoming = match state
            .shipyard
            .iter()
            .position(|s| s.local_id == reference.local_id)
        {
            Some(index) => {
                let mut ship = state.shipyard.remove(index);
                ship.star_system = None;
                ship.station = None;
                ship
            }
            None => Ship {
                local_id: reference.local_id,
                ed_model: reference.model.clone(),
                model: self.definitions.ship_model(&reference.model),
                ..Default::default()
            },
        };

        info!(ship = incoming.local_id, model = %incoming.ed_model, "Ship changed");
        if let Some(mut previous) = state.ship.replace(incoming) {
            if previous.is_known() {
                previous.star_system = state.current_system_name().map(str::to_string);
                previous.station = state.last_station.as_ref().map(|s| s.name.clone());
                state.shipyard.push(previous);
            }
        }
    }

    fn locate_station(&self, state: &mut LiveState, name: &str, system: &str) {
        let located = state
            .current_system
            .as_ref()
            .and_then(|s| s.station(name).cloned())
            .unwrap_or_else(|| Station::named(name, Some(system.to_string())));

        let already = state
            .last_station
            .as_ref()
            .map(|s| s.is_same_place(&located))
            .unwrap_or(false);
        if !already {
            state.last_station = Some(located);
        }
    }

    fn lock(&self) -> MutexGuard<'_, LiveState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn apply_coordinates(system: &mut StarSystem, at: &Coordinates) {
    system.x = Some(at.x);
    system.y = Some(at.y);
    system.z = Some(at.z);
}

fn apply_details(system: &mut StarSystem, details: &SystemDetails) {
    system.allegiance = details.allegiance.clone();
    system.faction = details.faction.clone();
    system.government = details.government.clone();
    system.economy = details.economy.clone();
    system.security = details.security.clone();
}

fn update_distance(state: &mut LiveState) {
    if let Some(current) = state.current_system.as_mut() {
        current.distance_from_home = state
            .home_system
            .as_ref()
            .and_then(|home| current.distance_to(home));
    }
}

fn update_title(state: &mut LiveState) {
    let allegiance = state
        .current_system
        .as_ref()
        .and_then(|s| s.allegiance.clone());
    if let Some(commander) = state.commander.as_mut() {
        commander.title = title_for(commander, allegiance.as_deref());
    }
}

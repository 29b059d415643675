//! Commander Companion Library
//!
//! Session handling for the game's companion API, profile decoding, and
//! the synchronizer that reconciles profiles with real-time events.

pub mod config;
pub mod credentials;
pub mod definitions;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod logging;
pub mod monitor;
pub mod profile;
pub mod session;
pub mod starsystems;
pub mod storage;
pub mod synchronizer;
pub mod transport;

use std::sync::Arc;

use config::CompanionConfig;
use credentials::CredentialStore;
use definitions::{Definitions, StaticDefinitions};
use dispatcher::EventDispatcher;
use error::CompanionResult;
use profile::ProfileDecoder;
use session::SessionClient;
use starsystems::{InMemoryStarSystems, StarSystemRepository};
use storage::SecureStorage;
use synchronizer::StateSynchronizer;
use transport::ReqwestTransport;

/// Services shared by the process, built once at startup
pub struct AppState {
    pub config: CompanionConfig,
    pub session: Arc<SessionClient>,
    pub dispatcher: Arc<EventDispatcher>,
    pub synchronizer: Arc<StateSynchronizer>,
}

impl AppState {
    /// Wire up the live services from configuration
    pub fn build(config: CompanionConfig) -> CompanionResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(
            &config.api_base_url,
            config.request_timeout(),
        )?);
        let credentials = CredentialStore::load(SecureStorage::new(&config.data_dir));
        let definitions: Arc<dyn Definitions> = Arc::new(StaticDefinitions::builtin());
        let systems: Arc<dyn StarSystemRepository> = Arc::new(InMemoryStarSystems::new());

        let session = Arc::new(SessionClient::new(
            transport,
            credentials,
            ProfileDecoder::new(definitions.clone()),
            config.profile_ttl(),
        ));
        let dispatcher = Arc::new(EventDispatcher::new(config.observer_concurrency));
        let synchronizer = Arc::new(
            StateSynchronizer::new(session.clone(), systems, definitions, dispatcher.clone())
                .with_home(config.home_system.as_deref(), config.home_station.as_deref()),
        );

        Ok(Self {
            config,
            session,
            dispatcher,
            synchronizer,
        })
    }
}

mod auth;
mod broadcaster;
mod db;
mod events;
mod queue;
mod rooms;
mod storage;
mod track;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

pub use auth::*;
pub use broadcaster::*;
pub use db::*;
pub use events::*;
pub use queue::*;
pub use rooms::*;
pub use storage::*;
pub use track::*;

use jukebox_core::{Clock, Config};

/// The jukebox room system: rooms, voting-ranked queues, playback
/// coordination, and event fan-out toward connected observers.
pub struct Jukebox {
    context: JukeboxContext,
    auth: Arc<dyn IdentityProvider>,

    pub rooms: RoomManager,
}

/// A type passed to various components of the room system, to access state,
/// read the clock, and emit events.
#[derive(Clone)]
pub struct JukeboxContext {
    pub database: Arc<dyn Database>,
    pub blobs: Arc<dyn BlobStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
    pub broadcaster: Arc<EventBroadcaster>,

    pub rooms: Arc<DashMap<PrimaryKey, Arc<Room>>>,
}

impl Jukebox {
    pub fn new(
        database: Arc<dyn Database>,
        blobs: Arc<dyn BlobStore>,
        auth: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        let context = JukeboxContext {
            database,
            blobs,
            clock,
            config,
            broadcaster: Arc::new(EventBroadcaster::new()),
            rooms: Default::default(),
        };

        let rooms = RoomManager::new(&context);

        Self {
            context,
            auth,
            rooms,
        }
    }

    /// Brings persisted rooms back into memory. Called once on startup.
    pub async fn restore(&self) -> std::result::Result<(), DatabaseError> {
        self.rooms.restore().await
    }

    /// Resolves a credential into the identity acting on the system.
    pub async fn authenticate(&self, credential: &str) -> std::result::Result<Identity, AuthError> {
        self.auth.authenticate(credential).await
    }

    /// The event fan-out, exposed for transports that manage subscriptions
    /// directly.
    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.context.broadcaster
    }
}

impl JukeboxContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Stamps an event with the server clock and hands it to the room's
    /// subscribers.
    pub fn emit(&self, room_id: PrimaryKey, actor: PrimaryKey, kind: RoomEventKind) {
        let event = RoomEvent {
            room_id,
            server_time: self.now(),
            actor,
            kind,
        };

        self.broadcaster.publish(room_id, event);
    }
}

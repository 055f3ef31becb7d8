//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate the joke store, object storage and AI providers.

mod audio;
mod feed;
mod generation;
mod preferences;
mod sampling;
mod tasks;
mod voice;

pub use audio::{AudioService, MIN_AUDIO_BYTES};
pub use feed::{FeedOutcome, FeedPath, FeedRequest, FeedService};
pub use generation::{GENERATED_CREATOR_ID, GenerationRequest, JokeGenerator};
pub use preferences::{NewJoke, PreferenceService};
pub use sampling::{JokeFilter, JokeSampler, RangeSampler};
pub use tasks::BackgroundTasks;
pub use voice::VoiceService;

//! Turn persistence
//!
//! The pipeline only needs [`TurnSink`]; the server additionally reads
//! history back through [`TurnStore`] to seed a [`StreamSession`].
//!
//! [`TurnSink`]: voice_journal_core::TurnSink
//! [`StreamSession`]: voice_journal_core::StreamSession

pub mod turns;

pub use turns::{InMemoryTurnStore, SessionHistory, StoredTurn, TurnStore};
pub use voice_journal_core::PersistenceError;

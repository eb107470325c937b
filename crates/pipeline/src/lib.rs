//! Conversational turn pipeline
//!
//! Turns a streamed model response into spoken audio sentence by sentence:
//! - [`segmenter`]: pure sentence segmentation of accumulated text
//! - [`consumer`]: drives the model stream and assigns sentence indices
//! - [`synthesis`]: one concurrent speech task per sentence
//! - [`finalizer`]: joins synthesis and records the AI turn
//! - [`turn`]: wires the above to a transport for one turn

pub mod consumer;
pub mod finalizer;
pub mod segmenter;
pub mod synthesis;
pub mod turn;

pub use consumer::{AccumulatorState, ConsumerOutcome, TokenStreamConsumer, TurnHandler};
pub use finalizer::{FinalizedTurn, TurnFinalizer, TurnRecord};
pub use segmenter::segment;
pub use synthesis::{SentenceOutcome, SpeechSynthesisTask, SynthesisConfig, SynthesisDispatcher};
pub use turn::{TurnConfig, TurnOutcome, TurnReport, TurnRunner};

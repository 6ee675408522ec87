pub mod clock;
pub mod engine;
pub mod events;
pub mod local_match;
pub mod online_match;
pub mod record;
pub mod transport;

pub use clock::{Clock, ClockKind, ClockReadings, ClockState, MatchClocks};
pub use engine::{BestMoveReply, EnginePair, LegalityProvider};
pub use events::{ClockScheduler, EventLoop, MatchEvent, MatchObserver, NullObserver, SearchPurpose};
pub use local_match::{LocalMatch, PASS_TEXT, Phase};
pub use online_match::{OnlineMatch, OnlinePhase};
pub use record::MatchRecord;
pub use transport::{LoopbackTransport, MatchSnapshot, MatchTransport, Players};

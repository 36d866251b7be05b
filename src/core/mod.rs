pub mod broadcast;
pub mod daily_reset;
pub mod engine;
pub mod ledger;
pub mod presence;
pub mod protocol;
pub mod session;

pub use crate::domain::model::{Item, RoundResult, SessionSnapshot, Submission};
pub use crate::domain::ports::{ConfigProvider, HistoryArchive, SubmissionStore};
pub use crate::utils::error::Result;
pub use engine::{SessionEngine, SessionHandle};
pub use ledger::{InMemoryLedger, StoreLedger, SubmissionLedger};
pub use session::SessionStateMachine;

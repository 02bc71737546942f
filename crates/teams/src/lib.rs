//! Microsoft Teams single sign-on for bots.
//!
//! - **Activities** (`activity`) - the subset of the Bot Framework activity schema the
//!   prompt reads and writes
//! - **Cards** (`cards`) - OAuth card and sign-in link construction
//! - **Prompt** (`prompt`) - turn driver for the SSO token-exchange state machine
//! - **Dispatch** (`dispatch`) - routes plain messages to commands gated behind SSO
//!
//! # Architecture
//!
//! ```text
//! Activity → CommandDispatchDialog → SsoPrompt → TokenExchangeClient
//!                 ↓                      ↓
//!          SsoCommandHandler     ConversationStateStore
//! ```

pub mod activity;
pub mod audit;
pub mod cards;
pub mod dispatch;
pub mod prompt;

pub use activity::{Activity, ActivityKind, ChannelAccount, ConversationAccount};
pub use dispatch::{
    CommandDispatchDialog, DispatchOutcome, HandlerError, SsoCommandHandler, TriggerPattern,
};
pub use prompt::{PendingCommand, PromptStatus, SsoPrompt, SsoPromptSettings, TurnOutcome};

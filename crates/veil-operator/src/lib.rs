pub mod activity;
pub mod bridge;
pub mod channel;
pub mod command;
pub mod connector;
pub mod error;
pub mod notifier;

pub use activity::{Activity, ChannelAccount, ConversationAccount, ConversationReference};
pub use bridge::OperatorBridge;
pub use channel::OperatorChannel;
pub use command::{parse_connect, HELP_TEXT};
pub use connector::BotConnectorChannel;
pub use error::OperatorError;
pub use notifier::EscalationNotifier;

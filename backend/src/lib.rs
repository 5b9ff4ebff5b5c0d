pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod media;
pub mod relay;
pub mod state;
pub mod test_util;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{BreakerRegistry, BreakerStatus, GatewayResponse, ServiceCall, ServiceGateway};
pub use media::{MediaFile, RangeSpec};
pub use relay::{relay, AnswerStore, ConversationServiceStore, RelayOutcome};
pub use state::AppState;

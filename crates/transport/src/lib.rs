pub mod api;
pub mod error;
pub mod http;
pub mod local;
pub mod ws;

pub use api::{NoopTransport, ToolTransport};
pub use error::{TransportError, TransportErrorKind};
pub use http::HttpTransport;
pub use local::{LocalHandler, LocalTransport};
pub use ws::WsTransport;

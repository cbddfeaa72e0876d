//! Tool host protocol client: transports, JSON-RPC session and the tool
//! catalogue.

mod connector;
mod error;
mod message;
mod registry;
mod result;
mod session;
pub mod transport;

pub use connector::{ConfiguredConnector, SessionConnector, establish};
pub use error::ProtocolError;
pub use message::{METHOD_NOT_FOUND, Message, RequestId, RpcError};
pub use registry::{ParameterSpec, ToolDescriptor, ToolRegistry};
pub use result::ToolResult;
pub use session::{ProtocolSession, ServerInfo, SessionOptions};
pub use transport::{
    ChannelPeer, ChannelTransport, MockToolHost, MockTransport, PipeTransport, StreamMode,
    StreamedTransport, Transport,
};

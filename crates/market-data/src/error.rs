use helm_gateway::TransportError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Session could not be opened or a subscription was refused
    #[error("Transport disconnected: {0}")]
    TransportDisconnect(#[from] TransportError),
}

// Ingress session module
// Manages the control channel handshake and session token lifecycle

mod manager;
mod protocol;

pub use manager::{control_url, IngressCredential, SessionManager};

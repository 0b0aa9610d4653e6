//! Challenge/response handshake run once per connection

use crate::error::{PatchError, Result};
use crate::events::{Notifier, Status};
use crate::protocol::auth_code;
use crate::protocol_core::Connection;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Connecting,
    AwaitingChallenge,
    Responding,
    Authenticated,
    Denied,
}

impl AuthState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuthState::Authenticated | AuthState::Denied)
    }
}

/// Result of feeding one response code to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    SendCredential,
    Accepted,
    Denied(i32),
}

/// Pure transition function for the `AwaitingChallenge` state.
pub fn on_code(code: i32) -> (AuthState, AuthStep) {
    match code {
        auth_code::CHALLENGE => (AuthState::Responding, AuthStep::SendCredential),
        auth_code::ACCEPTED => (AuthState::Authenticated, AuthStep::Accepted),
        other => (AuthState::Denied, AuthStep::Denied(other)),
    }
}

/// Decode the framed 4-byte response code.
fn decode_code(payload: &[u8]) -> Result<i32> {
    let raw: [u8; 4] = payload.try_into().map_err(|_| {
        PatchError::Protocol(format!(
            "auth response must be 4 bytes, got {}",
            payload.len()
        ))
    })?;
    Ok(i32::from_le_bytes(raw))
}

/// Drive the handshake until the server accepts or denies.
///
/// The server may challenge any number of times; each challenge gets one
/// credential write. A denial closes the connection before returning.
pub async fn authenticate<S>(
    conn: &mut Connection<S>,
    fingerprint: &str,
    notifier: &mut Notifier,
) -> Result<AuthState>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut state = AuthState::AwaitingChallenge;
    while !state.is_terminal() {
        let payload = conn.read_framed().await?;
        let code = decode_code(&payload)?;
        let (next, step) = on_code(code);
        state = next;
        match step {
            AuthStep::SendCredential => {
                notifier.status(Status::AuthenticationRequested);
                conn.write_framed(fingerprint.as_bytes()).await?;
                state = AuthState::AwaitingChallenge;
            }
            AuthStep::Accepted => notifier.status(Status::Authenticated),
            AuthStep::Denied(code) => {
                conn.shutdown().await;
                return Err(PatchError::AuthenticationDenied { code });
            }
        }
    }
    Ok(state)
}

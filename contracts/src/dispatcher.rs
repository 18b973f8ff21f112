//! # Dispatcher
//!
//! The one inbound door of each ledger. [`deliver`] authenticates an
//! envelope, decodes it, releases the assets it carries and routes it to
//! the ledger's handler, committing all of that together or none of it.
//!
//! The outbound side lives here too: [`send_message`] encodes a payload,
//! hands it to the transport and produces the matching `MessageSent` event.
//!
//! ## Checks, in order
//!
//! 1. Caller is the configured router ([`LedgerError::Unauthorized`]).
//! 2. Envelope is addressed to this ledger on this chain ([`LedgerError::Misrouted`]).
//! 3. Envelope comes from the paired ledger on the paired chain ([`LedgerError::UnknownPeer`]).
//! 4. Body decodes and the kind is one this ledger handles.
//! 5. Accounting-only kinds carry no assets.

use xvault_protocol::chain::ChainEnv;
use xvault_protocol::config::LedgerConfig;
use xvault_protocol::message::{encode_body, payload_bytes, Message, MessageKind, Payload};
use xvault_protocol::transport::{Envelope, OutboundMessage, Transport};
use xvault_protocol::types::{Address, MessageId};

use crate::error::LedgerError;
use crate::events::LedgerEvent;

/// A ledger that accepts inbound messages.
pub trait MessageReceiver {
    /// Pairing configuration.
    fn config(&self) -> &LedgerConfig;

    /// Whether this ledger handles messages of `kind`.
    fn accepts(&self, kind: MessageKind) -> bool;

    /// Runs the handler for an authenticated, decoded message.
    ///
    /// Must leave `self` untouched when it fails.
    fn receive<T: Transport>(
        &mut self,
        env: &mut ChainEnv,
        transport: &mut T,
        message: Message,
    ) -> Result<(), LedgerError>;
}

/// Delivers `envelope` to `receiver` on behalf of `caller`.
///
/// On success the carried assets have been credited to the receiver, the
/// handler's effects (including any reply it sent) are committed, and the
/// transport will refuse to release this envelope again. On failure
/// nothing changed.
pub fn deliver<R, T>(
    receiver: &mut R,
    env: &mut ChainEnv,
    transport: &mut T,
    caller: Address,
    envelope: &Envelope,
) -> Result<Message, LedgerError>
where
    R: MessageReceiver,
    T: Transport,
{
    let config = receiver.config();
    if caller != config.router {
        tracing::warn!(%caller, id = %envelope.id.short(), "delivery from unauthorized caller");
        return Err(LedgerError::Unauthorized(caller));
    }
    if envelope.dest_chain != env.selector
        || envelope.dest_chain != config.chain_selector
        || envelope.receiver != config.address
    {
        return Err(LedgerError::Misrouted {
            chain: envelope.dest_chain,
            receiver: envelope.receiver,
        });
    }
    if envelope.source_chain != config.peer_chain_selector || envelope.sender != config.peer_address
    {
        tracing::warn!(
            sender = %envelope.sender,
            chain = envelope.source_chain,
            "delivery from unknown peer"
        );
        return Err(LedgerError::UnknownPeer {
            chain: envelope.source_chain,
            sender: envelope.sender,
        });
    }

    let payload = xvault_protocol::message::decode_body(&envelope.data)?;
    let kind = payload.kind();
    if !receiver.accepts(kind) {
        return Err(LedgerError::UnexpectedMessage(kind));
    }
    if !kind.carries_assets() && envelope.amount > 0 {
        return Err(LedgerError::UnexpectedAmount {
            kind,
            amount: envelope.amount,
        });
    }

    let message = Message {
        id: envelope.id,
        source_chain: envelope.source_chain,
        sender: envelope.sender,
        amount: envelope.amount,
        payload,
    };

    let mut scratch = env.clone();
    transport.release(&mut scratch, envelope)?;
    receiver.receive(&mut scratch, transport, message.clone())?;

    *env = scratch;
    transport.mark_delivered(envelope.id);
    tracing::debug!(id = %envelope.id.short(), %kind, "message delivered");
    Ok(message)
}

/// Encodes `payload`, sends it to the peer with `amount` assets attached,
/// and returns the id plus the `MessageSent` event to record.
///
/// Callers must make this the last fallible step of their operation.
pub(crate) fn send_message<T: Transport>(
    config: &LedgerConfig,
    env: &mut ChainEnv,
    transport: &mut T,
    payload: &Payload,
    amount: u64,
) -> Result<(MessageId, LedgerEvent), LedgerError> {
    let data = encode_body(payload)?;
    let event_payload = payload_bytes(payload)?;
    let outbound = OutboundMessage {
        dest_chain: config.peer_chain_selector,
        receiver: config.peer_address,
        data,
        amount,
        gas_limit: config.gas_limit,
    };
    let id = transport.send(env, config.address, outbound)?;
    let kind = payload.kind();
    tracing::info!(id = %id.short(), %kind, amount, "message sent");
    Ok((
        id,
        LedgerEvent::MessageSent {
            id,
            kind,
            amount,
            payload: event_payload,
        },
    ))
}

/// Runs `op` against copies of `state` and `env` and commits both only if
/// it succeeds.
pub(crate) fn atomically<S, F, R>(
    state: &mut S,
    env: &mut ChainEnv,
    op: F,
) -> Result<R, LedgerError>
where
    S: Clone,
    F: FnOnce(&mut S, &mut ChainEnv) -> Result<R, LedgerError>,
{
    let mut next_state = state.clone();
    let mut next_env = env.clone();
    let out = op(&mut next_state, &mut next_env)?;
    *state = next_state;
    *env = next_env;
    Ok(out)
}

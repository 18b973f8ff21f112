//! # Message Transport
//!
//! The transport moves encoded message bodies, and optionally settlement
//! assets, between the two chains. The settlement core talks to it only
//! through [`Transport`].
//!
//! [`AsyncRouter`] is the in-process implementation used by the devnet:
//!
//! - **send** charges a flat fee in the fee token, burns the carried
//!   assets on the source chain, assigns a BLAKE3 message id and appends
//!   an [`Envelope`] to a FIFO queue.
//! - **release** mints the carried assets to the receiver on the
//!   destination chain. Delivery itself is driven from outside (the
//!   devnet pops the queue and calls the receiving ledger's entry point).
//! - An id that was delivered once can never be released again.
//!
//! Nothing in the queue is delivered until someone asks, which is exactly
//! the "arbitrarily delayed" channel the ledgers are designed around.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ChainEnv;
use crate::config::{DEFAULT_FEE_PER_MESSAGE, MAX_MESSAGE_BYTES};
use crate::token::TokenError;
use crate::types::{Address, ChainSelector, MessageId};

/// Errors raised by the transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The sender cannot cover the messaging fee.
    #[error("insufficient fee balance: required {required}, available {available}")]
    InsufficientFee {
        /// Fee quoted for the message.
        required: u64,
        /// Sender's fee-token balance.
        available: u64,
    },

    /// Encoded body exceeds [`MAX_MESSAGE_BYTES`].
    #[error("message body of {size} bytes exceeds {max}")]
    MessageTooLarge {
        /// Body size.
        size: usize,
        /// Limit.
        max: usize,
    },

    /// Message addressed to the chain it is sent from.
    #[error("destination chain {0} is the sending chain")]
    SameChain(ChainSelector),

    /// Envelope is being released on the wrong chain.
    #[error("envelope for chain {expected} released on chain {actual}")]
    WrongChain {
        /// Chain the envelope is addressed to.
        expected: ChainSelector,
        /// Chain it was released on.
        actual: ChainSelector,
    },

    /// Envelope was already delivered once.
    #[error("message {0} already delivered")]
    AlreadyDelivered(MessageId),

    /// Moving the carried assets or the fee failed.
    #[error("token movement failed: {0}")]
    Token(#[from] TokenError),
}

/// A message as handed to the transport by a ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Chain of the receiving ledger.
    pub dest_chain: ChainSelector,
    /// Receiving ledger.
    pub receiver: Address,
    /// Encoded body (see [`crate::message::codec`]).
    pub data: Vec<u8>,
    /// Settlement assets carried along.
    pub amount: u64,
    /// Execution gas limit requested on the destination chain.
    pub gas_limit: u64,
}

/// A message in flight, as the transport records it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Transport-assigned id.
    pub id: MessageId,
    /// Position in the router's send order.
    pub sequence: u64,
    /// Chain it was sent from.
    pub source_chain: ChainSelector,
    /// Sending ledger.
    pub sender: Address,
    /// Chain it is addressed to.
    pub dest_chain: ChainSelector,
    /// Receiving ledger.
    pub receiver: Address,
    /// Encoded body.
    pub data: Vec<u8>,
    /// Settlement assets carried along.
    pub amount: u64,
    /// Requested execution gas limit.
    pub gas_limit: u64,
    /// Fee paid to send it.
    pub fee_paid: u64,
}

/// Outbound and inbound face of a cross-chain transport.
pub trait Transport {
    /// Fee, in fee-token units, for sending `message`.
    fn quote_fee(&self, message: &OutboundMessage) -> u64;

    /// Sends `message` from `sender` on `env`'s chain.
    ///
    /// Charges the fee and takes custody of the carried assets from
    /// `sender` inside `env`. Must be the last fallible step of the
    /// operation that calls it.
    fn send(
        &mut self,
        env: &mut ChainEnv,
        sender: Address,
        message: OutboundMessage,
    ) -> Result<MessageId, TransportError>;

    /// Hands the carried assets of `envelope` to its receiver inside `env`.
    fn release(&self, env: &mut ChainEnv, envelope: &Envelope) -> Result<(), TransportError>;

    /// Records that `id` was delivered and must never be released again.
    fn mark_delivered(&mut self, id: MessageId);
}

/// In-memory FIFO router shared by both chains of a devnet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncRouter {
    address: Address,
    fee_per_message: u64,
    next_sequence: u64,
    queue: VecDeque<Envelope>,
    delivered: BTreeSet<MessageId>,
}

impl AsyncRouter {
    /// Creates a router charging `fee_per_message` per send.
    pub fn new(address: Address, fee_per_message: u64) -> Self {
        Self {
            address,
            fee_per_message,
            next_sequence: 0,
            queue: VecDeque::new(),
            delivered: BTreeSet::new(),
        }
    }

    /// Principal the ledgers accept inbound deliveries from.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Messages waiting for delivery.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Envelopes waiting for delivery, oldest first.
    pub fn queue(&self) -> impl Iterator<Item = &Envelope> {
        self.queue.iter()
    }

    /// Oldest undelivered envelope, without removing it.
    pub fn peek(&self) -> Option<&Envelope> {
        self.queue.front()
    }

    /// Removes and returns the oldest undelivered envelope.
    pub fn pop_next(&mut self) -> Option<Envelope> {
        self.queue.pop_front()
    }

    /// Removes a specific envelope, wherever it sits in the queue.
    ///
    /// Lets a driver deliver out of order. A delivery that fails goes back
    /// through [`requeue`](Self::requeue).
    pub fn take(&mut self, id: &MessageId) -> Option<Envelope> {
        let index = self.queue.iter().position(|e| &e.id == id)?;
        self.queue.remove(index)
    }

    /// Puts an undelivered envelope back where it was sent, ahead of every
    /// envelope with a higher sequence number.
    pub fn requeue(&mut self, envelope: Envelope) {
        let index = self
            .queue
            .iter()
            .position(|e| e.sequence > envelope.sequence)
            .unwrap_or(self.queue.len());
        self.queue.insert(index, envelope);
    }

    /// Whether `id` has already been delivered.
    pub fn is_delivered(&self, id: &MessageId) -> bool {
        self.delivered.contains(id)
    }

    /// Total messages ever accepted.
    pub fn sent_count(&self) -> u64 {
        self.next_sequence
    }

    fn message_id(
        &self,
        source_chain: ChainSelector,
        sender: &Address,
        m: &OutboundMessage,
    ) -> MessageId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"xvault-message-v1");
        hasher.update(&self.next_sequence.to_be_bytes());
        hasher.update(&source_chain.to_be_bytes());
        hasher.update(sender.as_bytes());
        hasher.update(&m.dest_chain.to_be_bytes());
        hasher.update(m.receiver.as_bytes());
        hasher.update(&m.amount.to_be_bytes());
        hasher.update(&m.data);
        MessageId(*hasher.finalize().as_bytes())
    }
}

impl Default for AsyncRouter {
    fn default() -> Self {
        Self::new(Address::from_label("ccip-router"), DEFAULT_FEE_PER_MESSAGE)
    }
}

impl Transport for AsyncRouter {
    fn quote_fee(&self, _message: &OutboundMessage) -> u64 {
        self.fee_per_message
    }

    fn send(
        &mut self,
        env: &mut ChainEnv,
        sender: Address,
        message: OutboundMessage,
    ) -> Result<MessageId, TransportError> {
        if message.data.len() > MAX_MESSAGE_BYTES {
            return Err(TransportError::MessageTooLarge {
                size: message.data.len(),
                max: MAX_MESSAGE_BYTES,
            });
        }
        if message.dest_chain == env.selector {
            return Err(TransportError::SameChain(env.selector));
        }

        let fee = self.quote_fee(&message);
        let available = env.fee_token.balance_of(&sender);
        if available < fee {
            return Err(TransportError::InsufficientFee {
                required: fee,
                available,
            });
        }

        // Both movements are checked before either one is applied.
        let mut asset = env.asset.clone();
        asset.burn(sender, message.amount)?;
        env.fee_token.transfer(sender, self.address, fee)?;
        env.asset = asset;

        let id = self.message_id(env.selector, &sender, &message);
        let envelope = Envelope {
            id,
            sequence: self.next_sequence,
            source_chain: env.selector,
            sender,
            dest_chain: message.dest_chain,
            receiver: message.receiver,
            data: message.data,
            amount: message.amount,
            gas_limit: message.gas_limit,
            fee_paid: fee,
        };
        tracing::debug!(
            id = %id.short(),
            sequence = envelope.sequence,
            from = envelope.source_chain,
            to = envelope.dest_chain,
            amount = envelope.amount,
            "message queued"
        );
        self.next_sequence += 1;
        self.queue.push_back(envelope);
        Ok(id)
    }

    fn release(&self, env: &mut ChainEnv, envelope: &Envelope) -> Result<(), TransportError> {
        if self.delivered.contains(&envelope.id) {
            return Err(TransportError::AlreadyDelivered(envelope.id));
        }
        if envelope.dest_chain != env.selector {
            return Err(TransportError::WrongChain {
                expected: envelope.dest_chain,
                actual: env.selector,
            });
        }
        env.asset.mint(envelope.receiver, envelope.amount)?;
        Ok(())
    }

    fn mark_delivered(&mut self, id: MessageId) {
        self.delivered.insert(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenLedger;

    const SRC: ChainSelector = 1;
    const DST: ChainSelector = 2;

    fn env(selector: ChainSelector) -> ChainEnv {
        ChainEnv::new(selector, TokenLedger::new("USDC", 6), TokenLedger::new("LINK", 18))
    }

    fn funded_source(sender: Address) -> ChainEnv {
        let mut e = env(SRC);
        e.asset.mint(sender, 1_000).unwrap();
        e.fee_token.mint(sender, 10).unwrap();
        e
    }

    fn outbound(amount: u64) -> OutboundMessage {
        OutboundMessage {
            dest_chain: DST,
            receiver: Address::from_label("receiver"),
            data: vec![1, 1],
            amount,
            gas_limit: 999_999,
        }
    }

    #[test]
    fn send_burns_assets_and_charges_fee() {
        let sender = Address::from_label("sender");
        let mut router = AsyncRouter::new(Address::from_label("router"), 3);
        let mut src = funded_source(sender);

        let id = router.send(&mut src, sender, outbound(400)).unwrap();

        assert_eq!(src.asset.balance_of(&sender), 600);
        assert_eq!(src.asset.total_supply(), 600);
        assert_eq!(src.fee_token.balance_of(&sender), 7);
        assert_eq!(src.fee_token.balance_of(&router.address()), 3);
        assert_eq!(router.pending(), 1);
        assert_eq!(router.peek().map(|e| e.id), Some(id));
    }

    #[test]
    fn ids_are_unique_per_send() {
        let sender = Address::from_label("sender");
        let mut router = AsyncRouter::new(Address::from_label("router"), 1);
        let mut src = funded_source(sender);
        let a = router.send(&mut src, sender, outbound(0)).unwrap();
        let b = router.send(&mut src, sender, outbound(0)).unwrap();
        assert_ne!(a, b);
        assert_eq!(router.sent_count(), 2);

        let second = router.take(&b).unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(router.peek().map(|e| e.id), Some(a));
        assert!(router.take(&b).is_none());
    }

    #[test]
    fn failed_send_changes_nothing() {
        let sender = Address::from_label("sender");
        let mut router = AsyncRouter::new(Address::from_label("router"), 3);
        let mut src = funded_source(sender);
        let before = src.clone();

        let err = router.send(&mut src, sender, outbound(5_000)).unwrap_err();
        assert!(matches!(err, TransportError::Token(_)));
        assert_eq!(src, before);
        assert_eq!(router.pending(), 0);

        let mut poor = env(SRC);
        let err = router.send(&mut poor, sender, outbound(0)).unwrap_err();
        assert_eq!(err, TransportError::InsufficientFee { required: 3, available: 0 });
    }

    #[test]
    fn release_mints_once() {
        let sender = Address::from_label("sender");
        let mut router = AsyncRouter::new(Address::from_label("router"), 0);
        let mut src = funded_source(sender);
        router.send(&mut src, sender, outbound(250)).unwrap();

        let envelope = router.pop_next().unwrap();
        let mut dst = env(DST);
        router.release(&mut dst, &envelope).unwrap();
        assert_eq!(dst.asset.balance_of(&envelope.receiver), 250);

        router.mark_delivered(envelope.id);
        assert_eq!(
            router.release(&mut dst, &envelope),
            Err(TransportError::AlreadyDelivered(envelope.id))
        );
        assert!(matches!(
            router.release(&mut src, &envelope),
            Err(TransportError::AlreadyDelivered(_))
        ));
    }

    #[test]
    fn release_on_wrong_chain_rejected() {
        let sender = Address::from_label("sender");
        let mut router = AsyncRouter::new(Address::from_label("router"), 0);
        let mut src = funded_source(sender);
        router.send(&mut src, sender, outbound(1)).unwrap();
        let envelope = router.pop_next().unwrap();
        assert!(matches!(
            router.release(&mut src, &envelope),
            Err(TransportError::WrongChain { expected: DST, actual: SRC })
        ));
    }

    #[test]
    fn requeue_restores_send_order() {
        let sender = Address::from_label("sender");
        let mut router = AsyncRouter::new(Address::from_label("router"), 0);
        let mut src = funded_source(sender);
        let ids: Vec<MessageId> = (1..=3)
            .map(|n| router.send(&mut src, sender, outbound(n)).unwrap())
            .collect();

        let middle = router.take(&ids[1]).unwrap();
        let head = router.pop_next().unwrap();
        router.requeue(middle);
        router.requeue(head);

        let order: Vec<MessageId> = router.queue().map(|e| e.id).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn oversized_and_loopback_rejected() {
        let sender = Address::from_label("sender");
        let mut router = AsyncRouter::new(Address::from_label("router"), 0);
        let mut src = funded_source(sender);

        let mut big = outbound(0);
        big.data = vec![0; MAX_MESSAGE_BYTES + 1];
        assert!(matches!(
            router.send(&mut src, sender, big),
            Err(TransportError::MessageTooLarge { .. })
        ));

        let mut loopback = outbound(0);
        loopback.dest_chain = SRC;
        assert_eq!(
            router.send(&mut src, sender, loopback),
            Err(TransportError::SameChain(SRC))
        );
    }
}

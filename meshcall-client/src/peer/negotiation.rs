use crate::error::NegotiationError;
use meshcall_core::IceCandidate;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Negotiation progress for one remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    Idle,
    OfferSent,
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl NegotiationState {
    /// The remote description is installed, so remote candidates apply.
    fn accepts_remote_candidates(self) -> bool {
        matches!(self, Self::Negotiating | Self::Connected)
    }

    /// The local description has reached the peer, so local candidates may follow.
    fn releases_local_candidates(self) -> bool {
        matches!(self, Self::OfferSent | Self::Connected)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::OfferSent => "offer-sent",
            Self::Negotiating => "negotiating",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which side sends the offer for this pair.
///
/// The member that learns about a peer from `user-joined` initiates; the
/// newcomer answers every member listed in its `existing-users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

/// What to do with an incoming offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferDecision {
    /// Fresh negotiation.
    Accept,
    /// Glare on the answering side: drop the local offer, answer the remote one.
    Rollback,
    /// The initiator is re-offering after a failure: rebuild, then answer.
    Reconnect,
    /// Glare on the offering side: keep the local offer.
    Ignore,
    /// Not legal in the current state.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    Apply,
    Buffered,
    Duplicate,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Reconnect,
    GiveUp,
    Ignore,
}

/// Offer/answer/candidate bookkeeping for one remote peer. Performs no IO;
/// the caller drives the media connection according to what it returns.
#[derive(Debug)]
pub struct Negotiation {
    role: Role,
    state: NegotiationState,
    seen_remote: HashSet<IceCandidate>,
    buffered_remote: VecDeque<IceCandidate>,
    pending_local: VecDeque<IceCandidate>,
    reconnect_spent: bool,
    gave_up: bool,
    transport_up: bool,
}

impl Negotiation {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: NegotiationState::Idle,
            seen_remote: HashSet::new(),
            buffered_remote: VecDeque::new(),
            pending_local: VecDeque::new(),
            reconnect_spent: false,
            gave_up: false,
            transport_up: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == NegotiationState::Closed
    }

    /// True once the reconnection pass was used and failed too.
    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    pub fn buffered_remote_len(&self) -> usize {
        self.buffered_remote.len()
    }

    fn illegal(&self, action: &'static str) -> NegotiationError {
        NegotiationError::IllegalTransition {
            action,
            state: self.state,
        }
    }

    /// The local offer has been handed to the relay.
    pub fn on_offer_sent(&mut self) -> Result<(), NegotiationError> {
        if self.state != NegotiationState::Idle {
            return Err(self.illegal("send offer"));
        }
        self.state = NegotiationState::OfferSent;
        Ok(())
    }

    pub fn on_remote_answer(&mut self) -> Result<(), NegotiationError> {
        if self.state != NegotiationState::OfferSent {
            return Err(self.illegal("accept answer"));
        }
        self.state = NegotiationState::Connected;
        Ok(())
    }

    /// Classify an incoming offer without changing state.
    pub fn offer_decision(&self) -> OfferDecision {
        use NegotiationState::*;

        if self.gave_up {
            return OfferDecision::Reject;
        }
        match (self.state, self.role) {
            (Idle, _) => OfferDecision::Accept,
            (OfferSent, Role::Responder) => OfferDecision::Rollback,
            (OfferSent, Role::Initiator) => OfferDecision::Ignore,
            (Connected | Failed, Role::Responder) => OfferDecision::Reconnect,
            _ => OfferDecision::Reject,
        }
    }

    /// Apply [`Self::offer_decision`]. On `Accept`, `Rollback` and
    /// `Reconnect` the machine is in `Negotiating` afterwards.
    pub fn on_remote_offer(&mut self) -> Result<OfferDecision, NegotiationError> {
        let decision = self.offer_decision();
        match decision {
            OfferDecision::Accept => {}
            OfferDecision::Rollback => {
                self.pending_local.clear();
            }
            OfferDecision::Reconnect => {
                self.reconnect_spent = true;
                self.reset_for_reconnect();
            }
            OfferDecision::Ignore => return Ok(decision),
            OfferDecision::Reject => return Err(self.illegal("accept offer")),
        }
        self.state = NegotiationState::Negotiating;
        Ok(decision)
    }

    /// The local answer has been handed to the relay.
    pub fn on_answer_sent(&mut self) -> Result<(), NegotiationError> {
        if self.state != NegotiationState::Negotiating {
            return Err(self.illegal("send answer"));
        }
        self.state = NegotiationState::Connected;
        Ok(())
    }

    pub fn on_remote_candidate(&mut self, candidate: IceCandidate) -> CandidateDisposition {
        if self.is_closed() {
            return CandidateDisposition::Discarded;
        }
        if !self.seen_remote.insert(candidate.clone()) {
            return CandidateDisposition::Duplicate;
        }
        if self.state.accepts_remote_candidates() {
            CandidateDisposition::Apply
        } else {
            self.buffered_remote.push_back(candidate);
            CandidateDisposition::Buffered
        }
    }

    /// Buffered remote candidates in arrival order, once they can be applied.
    pub fn take_buffered_remote(&mut self) -> Vec<IceCandidate> {
        if !self.state.accepts_remote_candidates() {
            return Vec::new();
        }
        self.buffered_remote.drain(..).collect()
    }

    /// Returns the candidate if it may be sent now, otherwise queues it.
    pub fn on_local_candidate(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.is_closed() {
            return None;
        }
        if self.state.releases_local_candidates() {
            Some(candidate)
        } else {
            self.pending_local.push_back(candidate);
            None
        }
    }

    pub fn take_pending_local(&mut self) -> Vec<IceCandidate> {
        if !self.state.releases_local_candidates() {
            return Vec::new();
        }
        self.pending_local.drain(..).collect()
    }

    /// The transport confirmed connectivity. Returns true on the first
    /// confirmation for the current connection.
    pub fn on_transport_connected(&mut self) -> bool {
        if self.state != NegotiationState::Connected || self.transport_up {
            return false;
        }
        self.transport_up = true;
        self.reconnect_spent = false;
        true
    }

    /// The transport reported a failure. Only the first report of an
    /// episode counts; one reconnection pass is allowed per episode.
    pub fn on_transport_failed(&mut self) -> FailureAction {
        if self.is_closed() || self.gave_up || self.state == NegotiationState::Failed {
            return FailureAction::Ignore;
        }
        self.state = NegotiationState::Failed;
        self.transport_up = false;

        if self.reconnect_spent {
            self.gave_up = true;
            FailureAction::GiveUp
        } else {
            self.reconnect_spent = true;
            FailureAction::Reconnect
        }
    }

    /// Abandon a failed connection that nobody re-offered in time. Returns
    /// false unless the machine was waiting in `Failed`.
    pub fn give_up(&mut self) -> bool {
        if self.state != NegotiationState::Failed || self.gave_up {
            return false;
        }
        self.gave_up = true;
        true
    }

    /// Back to `Idle` for a fresh connection. The reconnect budget is kept.
    pub fn reset_for_reconnect(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = NegotiationState::Idle;
        self.transport_up = false;
        self.seen_remote.clear();
        self.buffered_remote.clear();
        self.pending_local.clear();
    }

    pub fn close(&mut self) {
        self.state = NegotiationState::Closed;
        self.transport_up = false;
        self.seen_remote.clear();
        self.buffered_remote.clear();
        self.pending_local.clear();
    }
}

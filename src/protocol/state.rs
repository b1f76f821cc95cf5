//! Negotiation states and per-role transition tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DSPACE_NAMESPACE;

/// Contract negotiation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NegotiationState {
    /// Consumer has requested (or counter-requested) an offer
    Requested,
    /// Provider has offered (or counter-offered)
    Offered,
    /// Consumer accepted the last offer
    Accepted,
    /// Provider sent the agreement
    Agreed,
    /// Consumer verified the agreement
    Verified,
    /// Provider finalized the negotiation
    Finalized,
    /// Either party terminated the negotiation
    Terminated,
}

impl NegotiationState {
    /// All states, in lifecycle order.
    pub const ALL: [NegotiationState; 7] = [
        Self::Requested,
        Self::Offered,
        Self::Accepted,
        Self::Agreed,
        Self::Verified,
        Self::Finalized,
        Self::Terminated,
    ];

    /// Wire name (`REQUESTED`, `OFFERED`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Offered => "OFFERED",
            Self::Accepted => "ACCEPTED",
            Self::Agreed => "AGREED",
            Self::Verified => "VERIFIED",
            Self::Finalized => "FINALIZED",
            Self::Terminated => "TERMINATED",
        }
    }

    /// Fully qualified value as it appears in expanded messages.
    pub fn namespaced(&self) -> String {
        format!("{DSPACE_NAMESPACE}{}", self.name())
    }

    /// FINALIZED and TERMINATED absorb every further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Terminated)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for NegotiationState {
    type Err = String;

    /// Accepts bare names, `dspace:` compact IRIs and namespaced values.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s
            .strip_prefix(DSPACE_NAMESPACE)
            .or_else(|| s.strip_prefix("dspace:"))
            .unwrap_or(s);

        Self::ALL
            .into_iter()
            .find(|state| state.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("Unknown negotiation state: {s}"))
    }
}

/// Protocol role played by the party owning a negotiation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationRole {
    /// Requests offers, accepts, verifies
    Consumer,
    /// Offers, agrees, finalizes
    Provider,
}

impl NegotiationRole {
    /// The other party.
    pub fn counterpart(&self) -> Self {
        match self {
            Self::Consumer => Self::Provider,
            Self::Provider => Self::Consumer,
        }
    }

    /// States a new record may enter first.
    pub fn entry_states(&self) -> &'static [NegotiationState] {
        use NegotiationState::{Offered, Requested};
        match self {
            Self::Consumer => &[Requested, Offered],
            Self::Provider => &[Offered, Requested],
        }
    }

    /// Outgoing edges of `from` in this role's table.
    ///
    /// `None` stands for a record that has not entered the protocol yet.
    pub fn allowed_transitions(&self, from: Option<NegotiationState>) -> &'static [NegotiationState] {
        use NegotiationState::{
            Accepted, Agreed, Finalized, Offered, Requested, Terminated, Verified,
        };

        let Some(from) = from else {
            return self.entry_states();
        };

        match (self, from) {
            (Self::Consumer, Requested) => &[Offered, Accepted, Terminated],
            (Self::Provider, Requested) => &[Offered, Agreed, Terminated],
            (_, Offered) => &[Requested, Accepted, Terminated],
            (_, Accepted) => &[Agreed, Terminated],
            (_, Agreed) => &[Verified, Terminated],
            (_, Verified) => &[Finalized, Terminated],
            (_, Finalized | Terminated) => &[],
        }
    }

    /// Whether `from -> to` is an edge of this role's table.
    pub fn can_transition(&self, from: Option<NegotiationState>, to: NegotiationState) -> bool {
        self.allowed_transitions(from).contains(&to)
    }
}

impl fmt::Display for NegotiationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consumer => write!(f, "consumer"),
            Self::Provider => write!(f, "provider"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NegotiationState::*;

    #[test]
    fn test_state_from_str() {
        assert_eq!("REQUESTED".parse::<NegotiationState>().unwrap(), Requested);
        assert_eq!("dspace:AGREED".parse::<NegotiationState>().unwrap(), Agreed);
        assert_eq!(
            "https://w3id.org/dspace/v0.8/FINALIZED"
                .parse::<NegotiationState>()
                .unwrap(),
            Finalized
        );
        assert_eq!("verified".parse::<NegotiationState>().unwrap(), Verified);
        assert!("PENDING".parse::<NegotiationState>().is_err());
    }

    #[test]
    fn test_state_namespaced() {
        assert_eq!(
            Terminated.namespaced(),
            "https://w3id.org/dspace/v0.8/TERMINATED"
        );
    }

    #[test]
    fn test_terminal_states_have_no_edges() {
        for role in [NegotiationRole::Consumer, NegotiationRole::Provider] {
            assert!(role.allowed_transitions(Some(Finalized)).is_empty());
            assert!(role.allowed_transitions(Some(Terminated)).is_empty());
        }
    }

    #[test]
    fn test_termination_reachable_from_non_terminal() {
        for role in [NegotiationRole::Consumer, NegotiationRole::Provider] {
            for state in NegotiationState::ALL.into_iter().filter(|s| !s.is_terminal()) {
                assert!(
                    role.can_transition(Some(state), Terminated),
                    "{role}: {state} -> TERMINATED"
                );
            }
        }
    }

    #[test]
    fn test_role_tables_differ_on_requested() {
        assert!(NegotiationRole::Consumer.can_transition(Some(Requested), Accepted));
        assert!(!NegotiationRole::Consumer.can_transition(Some(Requested), Agreed));
        assert!(NegotiationRole::Provider.can_transition(Some(Requested), Agreed));
        assert!(!NegotiationRole::Provider.can_transition(Some(Requested), Accepted));
    }

    #[test]
    fn test_entry_states() {
        assert!(NegotiationRole::Consumer.can_transition(None, Requested));
        assert!(NegotiationRole::Provider.can_transition(None, Offered));
        assert!(!NegotiationRole::Consumer.can_transition(None, Finalized));
        assert_eq!(NegotiationRole::Consumer.counterpart(), NegotiationRole::Provider);
    }
}

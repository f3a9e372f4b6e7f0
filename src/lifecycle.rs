//! Attendance, payment and settlement state machines.
//!
//! RSVP and payment are tracked as two independent machines; a member's
//! combined [`MemberState`] is only valid when the pair appears in
//! [`MemberState::is_consistent`]'s compatibility table.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    Pending,
    AwaitingPayment,
    Confirmed,
    Declined,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    None,
    Pending,
    Submitted,
    Confirmed,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Venmo,
    Paypal,
    Cash,
    None,
}

impl RsvpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
        }
    }

    pub fn can_transition_to(self, next: RsvpStatus) -> bool {
        use RsvpStatus::*;
        matches!(
            (self, next),
            (Pending, AwaitingPayment)
                | (Pending, Confirmed)
                | (Pending, Declined)
                | (AwaitingPayment, Confirmed)
                | (AwaitingPayment, Declined)
                | (Declined, Pending)
        )
    }
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (None, Pending)
                | (Pending, Submitted)
                | (Submitted, Confirmed)
                | (Submitted, Rejected)
                // declining or rejoining clears an outstanding request
                | (Pending, None)
                | (Rejected, None)
        )
    }
}

impl SettlementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(self, next: SettlementStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed) | (Self::Pending, Self::Rejected)
        )
    }
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Venmo => "venmo",
            Self::Paypal => "paypal",
            Self::Cash => "cash",
            Self::None => "none",
        }
    }

    /// Venmo and PayPal are paid through an external link before the payer marks them as sent.
    pub fn is_external(self) -> bool {
        matches!(self, Self::Venmo | Self::Paypal)
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(RsvpStatus, PaymentStatus, SettlementStatus, PaymentMethod);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemberState {
    pub rsvp: RsvpStatus,
    pub payment: PaymentStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: MemberState,
    pub to: MemberState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot move from {}/{} to {}/{}",
            self.from.rsvp, self.from.payment, self.to.rsvp, self.to.payment
        )
    }
}

impl MemberState {
    pub const INVITED: MemberState = MemberState {
        rsvp: RsvpStatus::Pending,
        payment: PaymentStatus::None,
    };

    pub const ORGANIZER: MemberState = MemberState {
        rsvp: RsvpStatus::Confirmed,
        payment: PaymentStatus::None,
    };

    pub fn new(rsvp: RsvpStatus, payment: PaymentStatus) -> Self {
        Self { rsvp, payment }
    }

    pub fn is_consistent(self) -> bool {
        use PaymentStatus as P;
        use RsvpStatus as R;
        match self.rsvp {
            R::Pending => matches!(self.payment, P::None),
            R::AwaitingPayment => matches!(self.payment, P::Pending | P::Submitted),
            R::Confirmed => matches!(self.payment, P::None | P::Confirmed),
            R::Declined => matches!(self.payment, P::None | P::Rejected),
        }
    }

    /// Validates a move of either or both machines, including the resulting pair.
    pub fn transition(self, to: MemberState) -> Result<MemberState, InvalidTransition> {
        let rsvp_ok = self.rsvp == to.rsvp || self.rsvp.can_transition_to(to.rsvp);
        let payment_ok = self.payment == to.payment || self.payment.can_transition_to(to.payment);
        if self != to && rsvp_ok && payment_ok && to.is_consistent() {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    pub fn accept(self, requires_payment: bool) -> Result<MemberState, InvalidTransition> {
        let to = if requires_payment {
            MemberState::new(RsvpStatus::AwaitingPayment, PaymentStatus::Pending)
        } else {
            MemberState::new(RsvpStatus::Confirmed, PaymentStatus::None)
        };
        self.guard(RsvpStatus::Pending, to)
    }

    pub fn decline(self) -> Result<MemberState, InvalidTransition> {
        let to = MemberState::new(RsvpStatus::Declined, PaymentStatus::None);
        if self.payment == PaymentStatus::Submitted {
            return Err(InvalidTransition { from: self, to });
        }
        self.transition(to)
    }

    pub fn submit_payment(self) -> Result<MemberState, InvalidTransition> {
        let to = MemberState::new(RsvpStatus::AwaitingPayment, PaymentStatus::Submitted);
        self.guard(RsvpStatus::AwaitingPayment, to)
    }

    pub fn confirm_payment(self) -> Result<MemberState, InvalidTransition> {
        let to = MemberState::new(RsvpStatus::Confirmed, PaymentStatus::Confirmed);
        self.guard(RsvpStatus::AwaitingPayment, to)
    }

    pub fn reject_payment(self) -> Result<MemberState, InvalidTransition> {
        let to = MemberState::new(RsvpStatus::Declined, PaymentStatus::Rejected);
        self.guard(RsvpStatus::AwaitingPayment, to)
    }

    pub fn rejoin(self) -> Result<MemberState, InvalidTransition> {
        self.guard(RsvpStatus::Declined, MemberState::INVITED)
    }

    fn guard(self, required: RsvpStatus, to: MemberState) -> Result<MemberState, InvalidTransition> {
        if self.rsvp != required {
            return Err(InvalidTransition { from: self, to });
        }
        self.transition(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use PaymentStatus as P;
    use RsvpStatus as R;

    #[rstest]
    #[case(R::Pending, P::None, true)]
    #[case(R::Pending, P::Submitted, false)]
    #[case(R::AwaitingPayment, P::Pending, true)]
    #[case(R::AwaitingPayment, P::Submitted, true)]
    #[case(R::AwaitingPayment, P::Confirmed, false)]
    #[case(R::Confirmed, P::None, true)]
    #[case(R::Confirmed, P::Confirmed, true)]
    #[case(R::Confirmed, P::Submitted, false)]
    #[case(R::Confirmed, P::Rejected, false)]
    #[case(R::Declined, P::Rejected, true)]
    #[case(R::Declined, P::Submitted, false)]
    fn compatibility_table(#[case] rsvp: R, #[case] payment: P, #[case] expected: bool) {
        assert_eq!(MemberState::new(rsvp, payment).is_consistent(), expected);
    }

    #[test]
    fn down_payment_happy_path() {
        let accepted = MemberState::INVITED.accept(true).unwrap();
        assert_eq!(accepted, MemberState::new(R::AwaitingPayment, P::Pending));

        let submitted = accepted.submit_payment().unwrap();
        assert_eq!(submitted, MemberState::new(R::AwaitingPayment, P::Submitted));

        let confirmed = submitted.confirm_payment().unwrap();
        assert_eq!(confirmed, MemberState::new(R::Confirmed, P::Confirmed));
    }

    #[test]
    fn accept_without_down_payment_confirms_directly() {
        assert_eq!(
            MemberState::INVITED.accept(false).unwrap(),
            MemberState::new(R::Confirmed, P::None)
        );
    }

    #[test]
    fn rejected_payment_declines_and_allows_rejoin() {
        let submitted = MemberState::new(R::AwaitingPayment, P::Submitted);
        let rejected = submitted.reject_payment().unwrap();
        assert_eq!(rejected, MemberState::new(R::Declined, P::Rejected));
        assert_eq!(rejected.rejoin().unwrap(), MemberState::INVITED);
    }

    #[test]
    fn payment_decisions_require_a_submission() {
        let awaiting = MemberState::new(R::AwaitingPayment, P::Pending);
        assert!(awaiting.confirm_payment().is_err());
        assert!(awaiting.reject_payment().is_err());
    }

    #[test]
    fn terminal_payment_decisions_are_not_repeatable() {
        let confirmed = MemberState::new(R::Confirmed, P::Confirmed);
        assert!(confirmed.confirm_payment().is_err());
        assert!(confirmed.reject_payment().is_err());
    }

    #[test]
    fn cannot_decline_with_payment_under_review() {
        let submitted = MemberState::new(R::AwaitingPayment, P::Submitted);
        assert!(submitted.decline().is_err());
        let awaiting = MemberState::new(R::AwaitingPayment, P::Pending);
        assert_eq!(awaiting.decline().unwrap(), MemberState::new(R::Declined, P::None));
    }

    #[test]
    fn confirmed_members_cannot_accept_again() {
        assert!(MemberState::ORGANIZER.accept(false).is_err());
        assert!(MemberState::ORGANIZER.rejoin().is_err());
    }

    #[test]
    fn settlement_terminal_states() {
        use SettlementStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Confirmed.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Confirmed));
        assert!(Confirmed.is_terminal() && Rejected.is_terminal() && !Pending.is_terminal());
    }
}

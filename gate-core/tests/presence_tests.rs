//! Tests for the wake-up answer bookkeeping used by the card reader.

mod common;

use common::uid;
use gate_core::hal::{PresenceSignal, PresenceSource, SelectError};
use gate_core::identity::CardUid;
use gate_core::presence::WakeupAnswers;
use gate_core::session::{SessionController, Transition};
use pretty_assertions::assert_eq;

const ATQA: u16 = 0x0044;

// ============================================================================
// WakeupAnswers
// ============================================================================

#[test]
fn test_fresh_answer_is_used_for_any_select() {
    let mut answers = WakeupAnswers::new();
    answers.woke(Some(ATQA));

    assert!(answers.has_fresh());
    assert_eq!(answers.for_select(false), Some(&ATQA));
    assert_eq!(answers.for_select(true), Some(&ATQA));
}

#[test]
fn test_no_answer_means_no_select_while_idle() {
    let mut answers: WakeupAnswers<u16> = WakeupAnswers::new();
    answers.woke(None);

    assert_eq!(answers.for_select(false), None);
    assert_eq!(answers.for_select(true), None);
}

#[test]
fn test_locked_card_falls_back_to_session_answer() {
    let mut answers = WakeupAnswers::new();
    answers.woke(Some(ATQA));
    answers.selected();

    // Noisy wake-up on a later tick.
    answers.woke(None);

    assert!(!answers.has_fresh());
    assert_eq!(answers.for_select(false), None);
    assert_eq!(answers.for_select(true), Some(&ATQA));
}

#[test]
fn test_newer_answer_replaces_session_answer() {
    let mut answers = WakeupAnswers::new();
    answers.woke(Some(ATQA));
    answers.selected();
    answers.woke(Some(0x0004));
    answers.selected();
    answers.woke(None);

    assert_eq!(answers.for_select(true), Some(&0x0004));
}

#[test]
fn test_failed_select_spends_fresh_answer_only() {
    let mut answers = WakeupAnswers::new();
    answers.woke(Some(ATQA));
    answers.selected();
    answers.woke(Some(0x0004));
    answers.failed();

    assert_eq!(answers.for_select(false), None);
    assert_eq!(answers.for_select(true), Some(&ATQA));
}

#[test]
fn test_clear_forgets_session_answer() {
    let mut answers = WakeupAnswers::new();
    answers.woke(Some(ATQA));
    answers.selected();
    answers.clear();

    assert_eq!(answers.for_select(true), None);
}

// ============================================================================
// Locked session over a noisy reader
// ============================================================================

/// Reader that addresses selects the way the MFRC522 binding does.
struct NoisyReader {
    answers: WakeupAnswers<u16>,
    card: Option<CardUid>,
    noisy_wakeup: bool,
}

impl NoisyReader {
    fn with(card: CardUid) -> Self {
        Self {
            answers: WakeupAnswers::new(),
            card: Some(card),
            noisy_wakeup: false,
        }
    }
}

impl PresenceSource for NoisyReader {
    fn wakeup(&mut self) -> PresenceSignal {
        if self.noisy_wakeup || self.card.is_none() {
            self.answers.woke(None);
            PresenceSignal::None
        } else {
            self.answers.woke(Some(ATQA));
            PresenceSignal::Present
        }
    }

    fn select(&mut self, prior: Option<&CardUid>) -> Result<CardUid, SelectError> {
        if self.answers.for_select(prior.is_some()).is_none() {
            return Err(SelectError::NoCard);
        }
        match (&self.card, prior) {
            (Some(card), Some(prior)) if card != prior => {
                self.answers.failed();
                Err(SelectError::NoCard)
            }
            (Some(card), _) => {
                self.answers.selected();
                Ok(card.clone())
            }
            (None, _) => {
                self.answers.failed();
                Err(SelectError::Timeout)
            }
        }
    }

    fn halt(&mut self) {}

    fn clear_selection(&mut self) {
        self.answers.clear();
    }
}

#[test]
fn test_noisy_wakeup_does_not_end_locked_session() {
    let card = uid(&[0x04, 0x11, 0x22, 0x33]);
    let mut reader = NoisyReader::with(card.clone());
    let mut session = SessionController::new();

    assert_eq!(session.step(&mut reader, 0), Transition::Entered(card));

    reader.noisy_wakeup = true;
    for t in 1..5 {
        assert_eq!(session.step(&mut reader, t * 100), Transition::None);
    }
    assert!(session.is_locked());
}

#[test]
fn test_removed_card_still_exits_after_noisy_wakeup() {
    let card = uid(&[0x04, 0x11, 0x22, 0x33]);
    let mut reader = NoisyReader::with(card.clone());
    let mut session = SessionController::new();
    session.step(&mut reader, 0);

    reader.noisy_wakeup = true;
    reader.card = None;

    assert_eq!(
        session.step(&mut reader, 700),
        Transition::Exited {
            uid: card,
            held_ms: 700
        }
    );
    // Nothing left to fall back on once the session is over.
    assert_eq!(reader.answers.for_select(true), None);
}
